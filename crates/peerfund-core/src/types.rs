use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Wallet address on the value-transfer rail.
///
/// Opaque to the orchestrator; only the WalletTransferGateway interprets it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WalletId(String);

impl WalletId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WalletId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle status of a financing contract.
///
/// Persisted and serialized as the short symbolic code. The funding-phase
/// statuses (`O`/`PF`/`FF`) are a derivation over ledger state; `FR` and `FD`
/// are explicit transitions (see [`crate::lifecycle`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContractStatus {
    #[serde(rename = "O")]
    Open,
    #[serde(rename = "PF")]
    PartiallyFunded,
    #[serde(rename = "FF")]
    FullyFunded,
    #[serde(rename = "FR")]
    FundsRepaid,
    #[serde(rename = "FD")]
    FundsDisbursed,
}

impl ContractStatus {
    pub fn code(self) -> &'static str {
        match self {
            Self::Open => "O",
            Self::PartiallyFunded => "PF",
            Self::FullyFunded => "FF",
            Self::FundsRepaid => "FR",
            Self::FundsDisbursed => "FD",
        }
    }

    pub fn parse(code: &str) -> Option<Self> {
        match code {
            "O" => Some(Self::Open),
            "PF" => Some(Self::PartiallyFunded),
            "FF" => Some(Self::FullyFunded),
            "FR" => Some(Self::FundsRepaid),
            "FD" => Some(Self::FundsDisbursed),
            _ => None,
        }
    }

    /// Contributions are accepted only before the target is reached.
    pub fn permits_funding(self) -> bool {
        matches!(self, Self::Open | Self::PartiallyFunded)
    }

    /// Statuses that are a pure derivation of ledger state.
    pub fn is_funding_phase(self) -> bool {
        matches!(self, Self::Open | Self::PartiallyFunded | Self::FullyFunded)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::FundsDisbursed)
    }
}

impl fmt::Display for ContractStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Lifecycle status of one investor contribution.
///
/// `TransferSettled` is the persisted marker that the repayment transfer for
/// this funding has moved value; a disbursement retry must skip it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FundingStatus {
    #[serde(rename = "C")]
    InCommitment,
    #[serde(rename = "F")]
    Funded,
    #[serde(rename = "TS")]
    TransferSettled,
    #[serde(rename = "FD")]
    FundsDisbursed,
    #[serde(rename = "R")]
    Rejected,
}

impl FundingStatus {
    pub fn code(self) -> &'static str {
        match self {
            Self::InCommitment => "C",
            Self::Funded => "F",
            Self::TransferSettled => "TS",
            Self::FundsDisbursed => "FD",
            Self::Rejected => "R",
        }
    }

    pub fn parse(code: &str) -> Option<Self> {
        match code {
            "C" => Some(Self::InCommitment),
            "F" => Some(Self::Funded),
            "TS" => Some(Self::TransferSettled),
            "FD" => Some(Self::FundsDisbursed),
            "R" => Some(Self::Rejected),
            _ => None,
        }
    }

    /// Rejected contributions release their capacity; everything else counts.
    pub fn counts_toward_raised(self) -> bool {
        !matches!(self, Self::Rejected)
    }

    /// Fundings whose repayment transfer has not been issued yet.
    pub fn awaiting_transfer(self) -> bool {
        matches!(self, Self::InCommitment | Self::Funded)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::FundsDisbursed | Self::Rejected)
    }
}

impl fmt::Display for FundingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// A financing agreement raising `target_amount` from investors against
/// `repayment_amount` owed by the borrower. Amounts are integer minor units.
///
/// Fundings are not embedded: they belong to the FundingLedger and are
/// fetched on demand (see [`ContractSnapshot`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contract {
    pub id: Uuid,
    /// Originating request-for-funding; 1:1, immutable after creation.
    pub request_id: Uuid,
    /// Destination for raised funds; source wallet when repaying investors.
    pub wallet_id: WalletId,
    pub target_amount: u64,
    pub repayment_amount: u64,
    pub status: ContractStatus,
    pub created_at: DateTime<Utc>,
}

impl Contract {
    /// New open contract, created when a request-for-funding is approved.
    pub fn open(
        request_id: Uuid,
        wallet_id: WalletId,
        target_amount: u64,
        repayment_amount: u64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            request_id,
            wallet_id,
            target_amount,
            repayment_amount,
            status: ContractStatus::Open,
            created_at: Utc::now(),
        }
    }
}

/// One investor's contribution to a contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Funding {
    pub id: Uuid,
    /// Owning contract; a funding never moves between contracts.
    pub contract_id: Uuid,
    pub profile_id: Uuid,
    pub status: FundingStatus,
    pub funding_amount: u64,
    /// Pro-rata share of the contract repayment, fixed at contribution time.
    pub repayment_amount: u64,
    /// Zero until the owning contract reaches `FundsDisbursed`, then equal to
    /// `repayment_amount`.
    pub disbursed_amount: u64,
    pub created_at: DateTime<Utc>,
}

impl Funding {
    /// New contribution in the initial `InCommitment` state.
    pub fn commitment(
        contract_id: Uuid,
        profile_id: Uuid,
        funding_amount: u64,
        repayment_amount: u64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            contract_id,
            profile_id,
            status: FundingStatus::InCommitment,
            funding_amount,
            repayment_amount,
            disbursed_amount: 0,
            created_at: Utc::now(),
        }
    }
}

/// Read model: a contract together with its fundings as currently recorded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractSnapshot {
    pub contract: Contract,
    pub fundings: Vec<Funding>,
}

/// Confirmation returned by the wallet gateway for a settled transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferConfirmation {
    pub reference: String,
    pub settled_at: DateTime<Utc>,
}

/// Ledger entry handed to the TransactionRecorder for every value movement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferDetails {
    pub contract_id: Uuid,
    pub funding_id: Uuid,
    pub from_wallet: WalletId,
    pub to_wallet: WalletId,
    pub amount: u64,
    pub reference: String,
    pub occurred_at: DateTime<Utc>,
}

/// Outcome of one settled repayment transfer within a disbursement run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRecord {
    pub funding_id: Uuid,
    pub reference: String,
    pub settled_at: DateTime<Utc>,
}

/// Calculator figures quoted to a prospective investor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundingQuote {
    pub contract_id: Uuid,
    pub amount: u64,
    pub yield_percent: i64,
    pub raised_amount: u64,
    pub outstanding_amount: u64,
    pub funding_percentage: u64,
    pub projected_return: u64,
}
