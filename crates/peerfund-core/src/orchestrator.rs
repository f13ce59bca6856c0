use crate::collaborators::{
    with_timeout, ContractStore, FundingLedger, ProfileLookup, RequestStatusUpdater,
    TransactionRecorder, WalletTransferGateway,
};
use crate::disbursement::DisbursementExecutor;
use crate::error::OrchestratorError;
use crate::finance;
use crate::lifecycle;
use crate::types::{
    Contract, ContractSnapshot, ContractStatus, Funding, FundingQuote, FundingStatus, WalletId,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

/// Orchestrator tuning knobs.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Upper bound applied to every collaborator call.
    pub collaborator_timeout: Duration,
    /// Worker-pool width for the disbursement fan-out.
    pub transfer_concurrency: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            collaborator_timeout: Duration::from_secs(10),
            transfer_concurrency: 4,
        }
    }
}

/// Owns contract state transitions, validates contributions against remaining
/// capacity, and drives the multi-investor disbursement saga.
///
/// Operations touching one contract serialize on a per-contract async lock:
/// the read-validate-write window in [`ContractOrchestrator::fund`] is the
/// race that would otherwise let two investors both take the last remaining
/// capacity.
pub struct ContractOrchestrator {
    contracts: Arc<dyn ContractStore>,
    fundings: Arc<dyn FundingLedger>,
    requests: Arc<dyn RequestStatusUpdater>,
    executor: DisbursementExecutor,
    locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
    config: OrchestratorConfig,
}

impl ContractOrchestrator {
    pub fn new(
        contracts: Arc<dyn ContractStore>,
        fundings: Arc<dyn FundingLedger>,
        profiles: Arc<dyn ProfileLookup>,
        requests: Arc<dyn RequestStatusUpdater>,
        wallets: Arc<dyn WalletTransferGateway>,
        transactions: Arc<dyn TransactionRecorder>,
        config: OrchestratorConfig,
    ) -> Self {
        let executor = DisbursementExecutor::new(
            profiles,
            wallets,
            transactions,
            fundings.clone(),
            config.transfer_concurrency,
            config.collaborator_timeout,
        );

        Self {
            contracts,
            fundings,
            requests,
            executor,
            locks: Mutex::new(HashMap::new()),
            config,
        }
    }

    /// Create a contract for an approved request-for-funding.
    pub async fn open_contract(
        &self,
        request_id: Uuid,
        wallet_id: WalletId,
        target_amount: u64,
        repayment_amount: u64,
    ) -> Result<Contract, OrchestratorError> {
        if target_amount == 0 {
            return Err(OrchestratorError::InvalidAmount(
                "target amount must be positive".to_string(),
            ));
        }
        if repayment_amount == 0 {
            return Err(OrchestratorError::InvalidAmount(
                "repayment amount must be positive".to_string(),
            ));
        }

        let contract = Contract::open(request_id, wallet_id, target_amount, repayment_amount);
        let contract = self.contracts.insert(contract).await?;
        info!(contract_id = %contract.id, target_amount = contract.target_amount, "contract opened");
        Ok(contract)
    }

    /// Record an investor contribution against a contract's remaining
    /// capacity.
    ///
    /// The funding and the contract status it implies persist together; the
    /// request-status side effect runs after and its failure is surfaced,
    /// never swallowed.
    pub async fn fund(
        &self,
        contract_id: Uuid,
        profile_id: Uuid,
        amount: u64,
    ) -> Result<Funding, OrchestratorError> {
        let lock = self.contract_lock(contract_id).await;
        let _guard = lock.lock().await;

        let contract = self.contracts.get(contract_id).await?;
        if !contract.status.permits_funding() {
            return Err(OrchestratorError::InvalidContractState {
                contract_id,
                status: contract.status,
            });
        }
        if amount == 0 {
            return Err(OrchestratorError::InvalidAmount(
                "funding amount must be positive".to_string(),
            ));
        }

        let fundings = self.fundings.list_by_contract(contract_id).await?;
        let outstanding = finance::outstanding_amount(&contract, &fundings);
        if amount > outstanding {
            return Err(OrchestratorError::FundingExceedsOutstanding {
                requested: amount,
                outstanding,
            });
        }

        let share = finance::pro_rata_repayment(&contract, amount)?;
        let derived = lifecycle::derive_funding_phase(
            contract.target_amount,
            finance::raised_amount(&fundings) + amount,
        );

        let funding = Funding::commitment(contract_id, profile_id, amount, share);
        let funding = self.fundings.create(funding, derived).await?;
        info!(
            contract_id = %contract_id,
            funding_id = %funding.id,
            amount,
            status = %derived,
            "funding recorded"
        );

        with_timeout(
            "request status update",
            self.config.collaborator_timeout,
            self.requests.update_status(contract.request_id, derived),
        )
        .await
        .map_err(|err| match err {
            timeout @ OrchestratorError::Timeout { .. } => timeout,
            other => OrchestratorError::UpdateRequest {
                request_id: contract.request_id,
                reason: other.to_string(),
            },
        })?;

        Ok(funding)
    }

    /// Confirm a committed contribution once the investor's value clears.
    pub async fn confirm_funding(&self, funding_id: Uuid) -> Result<Funding, OrchestratorError> {
        let funding = self.fundings.get(funding_id).await?;
        let lock = self.contract_lock(funding.contract_id).await;
        let _guard = lock.lock().await;

        let funding = self.fundings.get(funding_id).await?;
        lifecycle::ensure_funding_transition(&funding, FundingStatus::Funded)?;
        self.fundings
            .update_status_batch(&[funding_id], FundingStatus::Funded)
            .await?;
        self.fundings.get(funding_id).await
    }

    /// Reject a committed contribution, releasing its capacity.
    pub async fn reject_funding(&self, funding_id: Uuid) -> Result<Funding, OrchestratorError> {
        let funding = self.fundings.get(funding_id).await?;
        let lock = self.contract_lock(funding.contract_id).await;
        let _guard = lock.lock().await;

        let funding = self.fundings.get(funding_id).await?;
        let contract = self.contracts.get(funding.contract_id).await?;
        if !contract.status.is_funding_phase() {
            return Err(OrchestratorError::InvalidContractState {
                contract_id: contract.id,
                status: contract.status,
            });
        }
        lifecycle::ensure_funding_transition(&funding, FundingStatus::Rejected)?;

        self.fundings
            .update_status_batch(&[funding_id], FundingStatus::Rejected)
            .await?;

        // Rejection releases capacity; re-derive the funding-phase status
        // from what remains.
        let fundings = self.fundings.list_by_contract(contract.id).await?;
        let derived = lifecycle::derive_funding_phase(
            contract.target_amount,
            finance::raised_amount(&fundings),
        );
        if derived != contract.status {
            self.contracts.update_status(contract.id, derived).await?;
        }

        self.fundings.get(funding_id).await
    }

    /// Record the external repayment event: `FullyFunded -> FundsRepaid`.
    pub async fn mark_repaid(&self, contract_id: Uuid) -> Result<Contract, OrchestratorError> {
        let lock = self.contract_lock(contract_id).await;
        let _guard = lock.lock().await;

        let contract = self.contracts.get(contract_id).await?;
        lifecycle::ensure_contract_transition(&contract, ContractStatus::FundsRepaid)?;
        self.contracts
            .update_status(contract_id, ContractStatus::FundsRepaid)
            .await?;
        info!(contract_id = %contract_id, "repayment recorded");
        self.contracts.get(contract_id).await
    }

    /// Pay out each investor's repayment share and finalize the contract.
    ///
    /// Saga steps: fan-out transfers (resumable via the per-funding
    /// `TransferSettled` marker), batch-mark fundings disbursed, transition
    /// the contract. A contract already in `FundsDisbursed` returns its
    /// current snapshot without issuing any transfer.
    pub async fn disburse(
        &self,
        contract_id: Uuid,
    ) -> Result<ContractSnapshot, OrchestratorError> {
        let lock = self.contract_lock(contract_id).await;
        let _guard = lock.lock().await;

        let contract = self.contracts.get(contract_id).await?;
        match contract.status {
            ContractStatus::FundsDisbursed => return self.snapshot_of(contract).await,
            ContractStatus::FundsRepaid => {}
            _ => {
                return Err(OrchestratorError::InvalidContractState {
                    contract_id,
                    status: contract.status,
                });
            }
        }

        let fundings = self.fundings.list_by_contract(contract_id).await?;
        let mut eligible = Vec::new();
        let mut already_settled = Vec::new();
        let mut involved = Vec::new();
        for funding in &fundings {
            match funding.status {
                FundingStatus::Rejected => {}
                FundingStatus::TransferSettled | FundingStatus::FundsDisbursed => {
                    already_settled.push(funding.id);
                    involved.push(funding.id);
                }
                FundingStatus::InCommitment | FundingStatus::Funded => {
                    eligible.push(funding.clone());
                    involved.push(funding.id);
                }
            }
        }

        info!(
            contract_id = %contract_id,
            transfers = eligible.len(),
            resumed = already_settled.len(),
            "disbursement started"
        );
        let settled = self
            .executor
            .execute(&contract, eligible, already_settled)
            .await?;
        info!(contract_id = %contract_id, settled = settled.len(), "transfers settled");

        self.fundings
            .mark_disbursed(&involved)
            .await
            .map_err(|err| OrchestratorError::DisburseContract {
                contract_id,
                reason: err.to_string(),
            })?;

        self.contracts
            .update_status(contract_id, ContractStatus::FundsDisbursed)
            .await
            .map_err(|err| OrchestratorError::UpdateContract {
                contract_id,
                reason: err.to_string(),
            })?;
        info!(contract_id = %contract_id, "contract disbursed");

        let contract = self.contracts.get(contract_id).await?;
        self.snapshot_of(contract).await
    }

    /// Contract plus fundings, with funding-phase status re-derived from the
    /// ledger (the stored status is a cache of that derivation).
    pub async fn snapshot(&self, contract_id: Uuid) -> Result<ContractSnapshot, OrchestratorError> {
        let contract = self.contracts.get(contract_id).await?;
        self.snapshot_of(contract).await
    }

    /// Calculator figures for a prospective contribution.
    pub async fn quote(
        &self,
        contract_id: Uuid,
        amount: u64,
    ) -> Result<FundingQuote, OrchestratorError> {
        let contract = self.contracts.get(contract_id).await?;
        let fundings = self.fundings.list_by_contract(contract_id).await?;
        finance::quote(&contract, &fundings, amount)
    }

    async fn snapshot_of(
        &self,
        mut contract: Contract,
    ) -> Result<ContractSnapshot, OrchestratorError> {
        let fundings = self.fundings.list_by_contract(contract.id).await?;
        if contract.status.is_funding_phase() {
            contract.status = lifecycle::derive_funding_phase(
                contract.target_amount,
                finance::raised_amount(&fundings),
            );
        }
        Ok(ContractSnapshot { contract, fundings })
    }

    async fn contract_lock(&self, contract_id: Uuid) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(contract_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}
