//! Collaborator contracts the orchestrator depends on.
//!
//! Profile management, request CRUD, wallet primitives, and the transaction
//! ledger's own persistence live in other services; the orchestrator only
//! reaches them through these traits. Implementations are expected to treat
//! each call as blocking network I/O; the orchestrator applies
//! [`with_timeout`] around every call and surfaces elapsed timeouts as the
//! retryable [`OrchestratorError::Timeout`] kind.

use crate::error::OrchestratorError;
use crate::types::{
    Contract, ContractStatus, Funding, FundingStatus, TransferConfirmation, TransferDetails,
    WalletId,
};
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use uuid::Uuid;

/// Resolves an investor profile to its wallet address.
#[async_trait]
pub trait ProfileLookup: Send + Sync {
    async fn wallet_id(&self, profile_id: Uuid) -> Result<WalletId, OrchestratorError>;
}

/// Pushes the contract's aggregate status back onto the originating
/// request-for-funding.
#[async_trait]
pub trait RequestStatusUpdater: Send + Sync {
    async fn update_status(
        &self,
        request_id: Uuid,
        status: ContractStatus,
    ) -> Result<(), OrchestratorError>;
}

/// Moves value between two wallets, atomically at its own level.
#[async_trait]
pub trait WalletTransferGateway: Send + Sync {
    async fn transfer(
        &self,
        from: &WalletId,
        to: &WalletId,
        amount: u64,
    ) -> Result<TransferConfirmation, OrchestratorError>;
}

/// Records a ledger entry for every value movement.
#[async_trait]
pub trait TransactionRecorder: Send + Sync {
    async fn record(&self, details: &TransferDetails) -> Result<(), OrchestratorError>;
}

/// Stores individual investor contributions and their statuses.
#[async_trait]
pub trait FundingLedger: Send + Sync {
    /// Persist a new funding together with the contract status derived from
    /// it. Backends commit both writes in one transaction where they can, so
    /// the stored status cannot diverge from the funding that implied it.
    async fn create(
        &self,
        funding: Funding,
        derived_status: ContractStatus,
    ) -> Result<Funding, OrchestratorError>;

    async fn get(&self, funding_id: Uuid) -> Result<Funding, OrchestratorError>;

    /// Fundings of one contract, ordered by creation time.
    async fn list_by_contract(&self, contract_id: Uuid)
        -> Result<Vec<Funding>, OrchestratorError>;

    async fn update_status_batch(
        &self,
        ids: &[Uuid],
        status: FundingStatus,
    ) -> Result<(), OrchestratorError>;

    /// Batch-finalize fundings: status `FundsDisbursed` and
    /// `disbursed_amount = repayment_amount`.
    async fn mark_disbursed(&self, ids: &[Uuid]) -> Result<(), OrchestratorError>;
}

/// Stores contracts.
#[async_trait]
pub trait ContractStore: Send + Sync {
    async fn insert(&self, contract: Contract) -> Result<Contract, OrchestratorError>;

    async fn get(&self, id: Uuid) -> Result<Contract, OrchestratorError>;

    async fn update_status(
        &self,
        id: Uuid,
        status: ContractStatus,
    ) -> Result<(), OrchestratorError>;
}

/// Bound a collaborator call; elapsed limits become the retryable
/// [`OrchestratorError::Timeout`] kind, distinct from a definitive rejection.
pub async fn with_timeout<T, F>(
    operation: &'static str,
    limit: Duration,
    fut: F,
) -> Result<T, OrchestratorError>
where
    F: Future<Output = Result<T, OrchestratorError>> + Send,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(OrchestratorError::Timeout { operation }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn timeout_maps_to_the_retryable_kind() {
        let err = with_timeout("wallet transfer", Duration::from_millis(5), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<(), OrchestratorError>(())
        })
        .await
        .unwrap_err();

        assert!(matches!(
            err,
            OrchestratorError::Timeout {
                operation: "wallet transfer"
            }
        ));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn inner_errors_pass_through_untouched() {
        let err = with_timeout("profile wallet lookup", Duration::from_secs(1), async {
            Err::<(), _>(OrchestratorError::not_found("profile", "p-1"))
        })
        .await
        .unwrap_err();

        assert!(matches!(err, OrchestratorError::NotFound { .. }));
    }
}
