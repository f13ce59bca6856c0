use crate::types::{ContractStatus, FundingStatus};
use thiserror::Error;
use uuid::Uuid;

/// Orchestrator errors.
///
/// Grouped by how callers are expected to react: validation errors and
/// not-found lookups are terminal caller errors; collaborator failures carry
/// enough context (which funding, which step) to drive manual or automated
/// resumption; timeouts are the one kind that is always safe to retry.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("funding amount {requested} exceeds outstanding capacity {outstanding}")]
    FundingExceedsOutstanding { requested: u64, outstanding: u64 },

    #[error("contract {contract_id} in state '{status}' does not permit this operation")]
    InvalidContractState {
        contract_id: Uuid,
        status: ContractStatus,
    },

    #[error("funding {funding_id} in state '{status}' does not permit this operation")]
    InvalidFundingState {
        funding_id: Uuid,
        status: FundingStatus,
    },

    #[error("{entity} '{id}' not found")]
    NotFound { entity: &'static str, id: String },

    #[error("status update for request {request_id} failed: {reason}")]
    UpdateRequest { request_id: Uuid, reason: String },

    #[error("wallet transfer rejected: {0}")]
    TransferRejected(String),

    #[error(
        "repayment transfer for funding {funding_id} on contract {contract_id} failed: {reason} \
         (settled: {settled:?}, pending: {pending:?})"
    )]
    TransferFunds {
        contract_id: Uuid,
        funding_id: Uuid,
        reason: String,
        /// Fundings whose transfer already moved value; a retry must skip them.
        settled: Vec<Uuid>,
        /// Fundings still owed a transfer; a retry attempts exactly these.
        pending: Vec<Uuid>,
    },

    #[error("marking fundings disbursed for contract {contract_id} failed: {reason}")]
    DisburseContract { contract_id: Uuid, reason: String },

    #[error("status update for contract {contract_id} failed: {reason}")]
    UpdateContract { contract_id: Uuid, reason: String },

    #[error("transaction record for funding {funding_id} failed: {reason}")]
    Transaction { funding_id: Uuid, reason: String },

    #[error("collaborator call '{operation}' timed out")]
    Timeout { operation: &'static str },

    #[error("storage error: {0}")]
    Storage(String),
}

impl OrchestratorError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn storage(err: impl std::fmt::Display) -> Self {
        Self::Storage(err.to_string())
    }

    /// Whether re-issuing the same call is safe without operator inspection.
    ///
    /// `DisburseContract` and `UpdateContract` occur strictly after every
    /// transfer has settled and carries its persisted marker, so re-running
    /// the disbursement cannot double-transfer.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. } | Self::DisburseContract { .. } | Self::UpdateContract { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transfer_funds_error_reports_settled_and_pending_sets() {
        let settled = Uuid::new_v4();
        let pending = Uuid::new_v4();
        let err = OrchestratorError::TransferFunds {
            contract_id: Uuid::new_v4(),
            funding_id: pending,
            reason: "wallet transfer rejected: insufficient balance".to_string(),
            settled: vec![settled],
            pending: vec![pending],
        };

        let rendered = err.to_string();
        assert!(rendered.contains(&settled.to_string()));
        assert!(rendered.contains(&pending.to_string()));
        assert!(!err.is_retryable());
    }

    #[test]
    fn only_post_transfer_steps_and_timeouts_are_retryable() {
        assert!(OrchestratorError::Timeout {
            operation: "wallet transfer"
        }
        .is_retryable());
        assert!(OrchestratorError::DisburseContract {
            contract_id: Uuid::new_v4(),
            reason: "ledger offline".to_string(),
        }
        .is_retryable());
        assert!(!OrchestratorError::InvalidAmount("zero".to_string()).is_retryable());
        assert!(!OrchestratorError::not_found("contract", Uuid::new_v4()).is_retryable());
    }
}
