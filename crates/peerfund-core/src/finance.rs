//! Pure financial calculator: no state, no I/O.
//!
//! All amounts are integer minor currency units; intermediate products use
//! 128-bit arithmetic so `amount * repayment` cannot overflow. Percentages
//! truncate toward zero; pro-rata shares round half up.

use crate::error::OrchestratorError;
use crate::types::{Contract, Funding, FundingQuote};

/// Implied percentage return of the contract:
/// `(repayment - target) * 100 / target`. Negative when the borrower repays
/// less than the raised target.
pub fn yield_percent(contract: &Contract) -> Result<i64, OrchestratorError> {
    if contract.target_amount == 0 {
        return Err(OrchestratorError::InvalidAmount(
            "target amount must be positive".to_string(),
        ));
    }

    let diff = contract.repayment_amount as i128 - contract.target_amount as i128;
    Ok((diff * 100 / contract.target_amount as i128) as i64)
}

/// Sum of non-rejected contribution amounts.
pub fn raised_amount(fundings: &[Funding]) -> u64 {
    fundings
        .iter()
        .filter(|funding| funding.status.counts_toward_raised())
        .map(|funding| funding.funding_amount)
        .sum()
}

/// Remaining capacity before the contract reaches its target.
pub fn outstanding_amount(contract: &Contract, fundings: &[Funding]) -> u64 {
    contract.target_amount.saturating_sub(raised_amount(fundings))
}

/// Share of the target a contribution of `amount` represents, in whole percent.
pub fn funding_percentage(contract: &Contract, amount: u64) -> Result<u64, OrchestratorError> {
    if contract.target_amount == 0 {
        return Err(OrchestratorError::InvalidAmount(
            "target amount must be positive".to_string(),
        ));
    }

    Ok((amount as u128 * 100 / contract.target_amount as u128) as u64)
}

/// Investor's pro-rata share of the contract repayment for a contribution of
/// `amount`, rounded half up.
pub fn pro_rata_repayment(contract: &Contract, amount: u64) -> Result<u64, OrchestratorError> {
    if contract.target_amount == 0 {
        return Err(OrchestratorError::InvalidAmount(
            "target amount must be positive".to_string(),
        ));
    }

    let target = contract.target_amount as u128;
    let share = (amount as u128 * contract.repayment_amount as u128 + target / 2) / target;
    share.try_into().map_err(|_| {
        OrchestratorError::InvalidAmount("repayment share exceeds amount range".to_string())
    })
}

/// Projected return for a contribution of `amount`.
///
/// Canonically the pro-rata repayment share, so a quote always matches the
/// `repayment_amount` that would be fixed on the funding at contribution time.
pub fn funding_returns(contract: &Contract, amount: u64) -> Result<u64, OrchestratorError> {
    pro_rata_repayment(contract, amount)
}

/// Full calculator surface for one prospective contribution.
pub fn quote(
    contract: &Contract,
    fundings: &[Funding],
    amount: u64,
) -> Result<FundingQuote, OrchestratorError> {
    Ok(FundingQuote {
        contract_id: contract.id,
        amount,
        yield_percent: yield_percent(contract)?,
        raised_amount: raised_amount(fundings),
        outstanding_amount: outstanding_amount(contract, fundings),
        funding_percentage: funding_percentage(contract, amount)?,
        projected_return: funding_returns(contract, amount)?,
    })
}
