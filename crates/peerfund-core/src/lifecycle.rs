//! Contract and funding state machines.
//!
//! The contract lifecycle is strictly forward:
//!
//! ```text
//! Open --fund--> PartiallyFunded --fund--> FullyFunded
//! FullyFunded --repayment event--> FundsRepaid
//! FundsRepaid --disburse--> FundsDisbursed (terminal)
//! ```
//!
//! The funding-phase statuses are a derivation over ledger state
//! ([`derive_funding_phase`]); `FundsRepaid` and `FundsDisbursed` are explicit
//! transitions guarded here so accidental skips cannot happen silently.

use crate::error::OrchestratorError;
use crate::types::{Contract, ContractStatus, Funding, FundingStatus};

/// Funding-phase status implied by the raised amount.
pub fn derive_funding_phase(target_amount: u64, raised_amount: u64) -> ContractStatus {
    if raised_amount >= target_amount {
        ContractStatus::FullyFunded
    } else if raised_amount > 0 {
        ContractStatus::PartiallyFunded
    } else {
        ContractStatus::Open
    }
}

/// Whether a contract may move from `from` to `to`.
pub fn contract_transition_allowed(from: ContractStatus, to: ContractStatus) -> bool {
    use ContractStatus::*;

    matches!(
        (from, to),
        (Open, PartiallyFunded)
            | (Open, FullyFunded)
            | (PartiallyFunded, PartiallyFunded)
            | (PartiallyFunded, FullyFunded)
            | (FullyFunded, FundsRepaid)
            | (FundsRepaid, FundsDisbursed)
    )
}

/// Guard an explicit contract transition, reporting the current status.
pub fn ensure_contract_transition(
    contract: &Contract,
    to: ContractStatus,
) -> Result<(), OrchestratorError> {
    if contract_transition_allowed(contract.status, to) {
        Ok(())
    } else {
        Err(OrchestratorError::InvalidContractState {
            contract_id: contract.id,
            status: contract.status,
        })
    }
}

/// Whether a funding may move from `from` to `to`.
pub fn funding_transition_allowed(from: FundingStatus, to: FundingStatus) -> bool {
    use FundingStatus::*;

    matches!(
        (from, to),
        (InCommitment, Funded)
            | (InCommitment, Rejected)
            | (InCommitment, TransferSettled)
            | (Funded, TransferSettled)
            | (TransferSettled, FundsDisbursed)
    )
}

/// Guard an explicit funding transition, reporting the current status.
pub fn ensure_funding_transition(
    funding: &Funding,
    to: FundingStatus,
) -> Result<(), OrchestratorError> {
    if funding_transition_allowed(funding.status, to) {
        Ok(())
    } else {
        Err(OrchestratorError::InvalidFundingState {
            funding_id: funding.id,
            status: funding.status,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::WalletId;
    use uuid::Uuid;

    #[test]
    fn funding_phase_derivation() {
        assert_eq!(derive_funding_phase(1_000, 0), ContractStatus::Open);
        assert_eq!(derive_funding_phase(1_000, 1), ContractStatus::PartiallyFunded);
        assert_eq!(derive_funding_phase(1_000, 999), ContractStatus::PartiallyFunded);
        assert_eq!(derive_funding_phase(1_000, 1_000), ContractStatus::FullyFunded);
    }

    #[test]
    fn nothing_leaves_funds_disbursed() {
        use ContractStatus::*;
        for to in [Open, PartiallyFunded, FullyFunded, FundsRepaid, FundsDisbursed] {
            assert!(!contract_transition_allowed(FundsDisbursed, to));
        }
    }

    #[test]
    fn backward_contract_transitions_are_rejected() {
        use ContractStatus::*;
        assert!(!contract_transition_allowed(PartiallyFunded, Open));
        assert!(!contract_transition_allowed(FullyFunded, PartiallyFunded));
        assert!(!contract_transition_allowed(FundsRepaid, FullyFunded));
        assert!(!contract_transition_allowed(Open, FundsRepaid));
        assert!(!contract_transition_allowed(PartiallyFunded, FundsDisbursed));
    }

    #[test]
    fn disbursement_requires_funds_repaid() {
        use ContractStatus::*;
        assert!(contract_transition_allowed(FundsRepaid, FundsDisbursed));
        for from in [Open, PartiallyFunded, FullyFunded] {
            assert!(!contract_transition_allowed(from, FundsDisbursed));
        }
    }

    #[test]
    fn guard_reports_current_status() {
        let mut contract = Contract::open(
            Uuid::new_v4(),
            WalletId::new("wallet-borrower"),
            1_000,
            1_200,
        );
        contract.status = ContractStatus::Open;

        let err = ensure_contract_transition(&contract, ContractStatus::FundsDisbursed)
            .unwrap_err();
        match err {
            OrchestratorError::InvalidContractState { status, .. } => {
                assert_eq!(status, ContractStatus::Open);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn funding_transitions() {
        use FundingStatus::*;
        assert!(funding_transition_allowed(InCommitment, Funded));
        assert!(funding_transition_allowed(InCommitment, Rejected));
        assert!(funding_transition_allowed(Funded, TransferSettled));
        assert!(funding_transition_allowed(TransferSettled, FundsDisbursed));

        assert!(!funding_transition_allowed(Rejected, Funded));
        assert!(!funding_transition_allowed(FundsDisbursed, TransferSettled));
        assert!(!funding_transition_allowed(Funded, InCommitment));
        assert!(!funding_transition_allowed(Funded, Rejected));
    }
}
