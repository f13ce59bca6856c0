//! Contract funding and disbursement orchestration core.
//!
//! This crate owns the financing contract lifecycle: it validates investor
//! contributions against remaining capacity, derives contract status from
//! ledger state, computes yield and return figures, and drives the
//! multi-investor disbursement saga against external collaborators (profile
//! lookup, wallet transfer gateway, transaction recorder, funding ledger).

#![deny(unsafe_code)]

pub mod collaborators;
pub mod disbursement;
pub mod error;
pub mod finance;
pub mod lifecycle;
pub mod orchestrator;
pub mod storage;
pub mod types;

pub use collaborators::{
    ContractStore, FundingLedger, ProfileLookup, RequestStatusUpdater, TransactionRecorder,
    WalletTransferGateway,
};
pub use disbursement::DisbursementExecutor;
pub use error::OrchestratorError;
pub use orchestrator::{ContractOrchestrator, OrchestratorConfig};
pub use storage::{bootstrap, MemoryStore, PostgresStore, StoreConfig, StoreHandles};
pub use types::{
    Contract, ContractSnapshot, ContractStatus, Funding, FundingQuote, FundingStatus,
    TransferConfirmation, TransferDetails, TransferRecord, WalletId,
};
