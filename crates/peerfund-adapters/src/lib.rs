//! Collaborator adapters for the peerfund orchestrator.
//!
//! Deterministic local implementations of the external collaborators:
//! the service's local mode and the integration tests run against these
//! instead of live profile, request, wallet, and ledger services.

#![deny(unsafe_code)]

use async_trait::async_trait;
use chrono::Utc;
use peerfund_core::{
    ContractStatus, OrchestratorError, ProfileLookup, RequestStatusUpdater, TransactionRecorder,
    TransferConfirmation, TransferDetails, WalletId, WalletTransferGateway,
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use uuid::Uuid;

/// Profile directory that derives a wallet address from the profile id.
///
/// Every profile resolves, which makes it the right default for local
/// simulation where investors are created ad hoc.
#[derive(Debug, Clone, Default)]
pub struct DerivedProfileDirectory;

#[async_trait]
impl ProfileLookup for DerivedProfileDirectory {
    async fn wallet_id(&self, profile_id: Uuid) -> Result<WalletId, OrchestratorError> {
        let short: String = profile_id.simple().to_string().chars().take(8).collect();
        Ok(WalletId::new(format!("wallet-{short}")))
    }
}

/// Profile directory with explicit registrations; unknown profiles are
/// reported as not found.
#[derive(Debug, Default)]
pub struct StaticProfileDirectory {
    wallets: Mutex<HashMap<Uuid, WalletId>>,
}

impl StaticProfileDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, profile_id: Uuid, wallet: WalletId) {
        self.wallets.lock().unwrap().insert(profile_id, wallet);
    }
}

#[async_trait]
impl ProfileLookup for StaticProfileDirectory {
    async fn wallet_id(&self, profile_id: Uuid) -> Result<WalletId, OrchestratorError> {
        self.wallets
            .lock()
            .map_err(|_| OrchestratorError::Storage("profile directory lock poisoned".to_string()))?
            .get(&profile_id)
            .cloned()
            .ok_or_else(|| OrchestratorError::not_found("profile", profile_id))
    }
}

/// Mock wallet gateway for deterministic local settlement simulation.
///
/// Records every transfer and can be told to refuse specific destination
/// wallets for failure-path testing.
#[derive(Debug, Default)]
pub struct MockWalletGateway {
    calls: AtomicUsize,
    transfers: Mutex<Vec<(WalletId, WalletId, u64)>>,
    refused: Mutex<HashSet<String>>,
}

impl MockWalletGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse transfers to `wallet` until [`Self::clear_refusals`].
    pub fn refuse_destination(&self, wallet: &WalletId) {
        self.refused
            .lock()
            .unwrap()
            .insert(wallet.as_str().to_string());
    }

    pub fn clear_refusals(&self) {
        self.refused.lock().unwrap().clear();
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn transfers(&self) -> Vec<(WalletId, WalletId, u64)> {
        self.transfers.lock().unwrap().clone()
    }
}

#[async_trait]
impl WalletTransferGateway for MockWalletGateway {
    async fn transfer(
        &self,
        from: &WalletId,
        to: &WalletId,
        amount: u64,
    ) -> Result<TransferConfirmation, OrchestratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let refused = self
            .refused
            .lock()
            .map_err(|_| OrchestratorError::Storage("gateway lock poisoned".to_string()))?
            .contains(to.as_str());
        if refused {
            return Err(OrchestratorError::TransferRejected(format!(
                "destination '{to}' refused the transfer"
            )));
        }

        self.transfers
            .lock()
            .map_err(|_| OrchestratorError::Storage("gateway lock poisoned".to_string()))?
            .push((from.clone(), to.clone(), amount));

        let short: String = Uuid::new_v4().simple().to_string().chars().take(8).collect();
        Ok(TransferConfirmation {
            reference: format!("xfer-{short}"),
            settled_at: Utc::now(),
        })
    }
}

/// Deterministic failing gateway useful for chaos testing.
#[derive(Debug, Clone)]
pub struct AlwaysFailWalletGateway {
    reason: String,
}

impl AlwaysFailWalletGateway {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl WalletTransferGateway for AlwaysFailWalletGateway {
    async fn transfer(
        &self,
        _from: &WalletId,
        _to: &WalletId,
        _amount: u64,
    ) -> Result<TransferConfirmation, OrchestratorError> {
        Err(OrchestratorError::TransferRejected(self.reason.clone()))
    }
}

/// Transaction recorder that keeps every ledger entry in memory.
#[derive(Debug, Default)]
pub struct RecordingTransactionRecorder {
    entries: Mutex<Vec<TransferDetails>>,
}

impl RecordingTransactionRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<TransferDetails> {
        self.entries.lock().unwrap().clone()
    }
}

#[async_trait]
impl TransactionRecorder for RecordingTransactionRecorder {
    async fn record(&self, details: &TransferDetails) -> Result<(), OrchestratorError> {
        self.entries
            .lock()
            .map_err(|_| OrchestratorError::Storage("recorder lock poisoned".to_string()))?
            .push(details.clone());
        Ok(())
    }
}

/// Request-status updater that records every pushed status.
#[derive(Debug, Default)]
pub struct RecordingRequestUpdater {
    updates: Mutex<Vec<(Uuid, ContractStatus)>>,
}

impl RecordingRequestUpdater {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn updates(&self) -> Vec<(Uuid, ContractStatus)> {
        self.updates.lock().unwrap().clone()
    }
}

#[async_trait]
impl RequestStatusUpdater for RecordingRequestUpdater {
    async fn update_status(
        &self,
        request_id: Uuid,
        status: ContractStatus,
    ) -> Result<(), OrchestratorError> {
        self.updates
            .lock()
            .map_err(|_| OrchestratorError::Storage("updater lock poisoned".to_string()))?
            .push((request_id, status));
        Ok(())
    }
}

/// Request-status updater that always fails, for failure-surfacing tests.
#[derive(Debug, Clone)]
pub struct FailingRequestUpdater {
    reason: String,
}

impl FailingRequestUpdater {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl RequestStatusUpdater for FailingRequestUpdater {
    async fn update_status(
        &self,
        request_id: Uuid,
        _status: ContractStatus,
    ) -> Result<(), OrchestratorError> {
        Err(OrchestratorError::UpdateRequest {
            request_id,
            reason: self.reason.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn derived_directory_resolves_every_profile_deterministically() {
        let directory = DerivedProfileDirectory;
        let profile = Uuid::new_v4();

        let first = directory.wallet_id(profile).await.unwrap();
        let second = directory.wallet_id(profile).await.unwrap();
        assert_eq!(first, second);
        assert!(first.as_str().starts_with("wallet-"));
    }

    #[tokio::test]
    async fn static_directory_reports_unknown_profiles() {
        let directory = StaticProfileDirectory::new();
        let known = Uuid::new_v4();
        directory.register(known, WalletId::new("wallet-a"));

        assert_eq!(
            directory.wallet_id(known).await.unwrap(),
            WalletId::new("wallet-a")
        );
        let err = directory.wallet_id(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::NotFound { .. }));
    }

    #[tokio::test]
    async fn mock_gateway_settles_and_records_transfers() {
        let gateway = MockWalletGateway::new();
        let from = WalletId::new("wallet-borrower");
        let to = WalletId::new("wallet-investor");

        let confirmation = gateway.transfer(&from, &to, 460_000).await.unwrap();
        assert!(confirmation.reference.starts_with("xfer-"));
        assert_eq!(gateway.call_count(), 1);
        assert_eq!(gateway.transfers(), vec![(from, to, 460_000)]);
    }

    #[tokio::test]
    async fn mock_gateway_refuses_configured_destinations() {
        let gateway = MockWalletGateway::new();
        let to = WalletId::new("wallet-investor");
        gateway.refuse_destination(&to);

        let err = gateway
            .transfer(&WalletId::new("wallet-borrower"), &to, 1)
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::TransferRejected(_)));

        gateway.clear_refusals();
        assert!(gateway
            .transfer(&WalletId::new("wallet-borrower"), &to, 1)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn failing_gateway_returns_its_reason() {
        let gateway = AlwaysFailWalletGateway::new("forced");
        let err = gateway
            .transfer(&WalletId::new("a"), &WalletId::new("b"), 1)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("forced"));
    }

    #[tokio::test]
    async fn recording_updater_keeps_status_pushes_in_order() {
        let updater = RecordingRequestUpdater::new();
        let request = Uuid::new_v4();

        updater
            .update_status(request, ContractStatus::PartiallyFunded)
            .await
            .unwrap();
        updater
            .update_status(request, ContractStatus::FullyFunded)
            .await
            .unwrap();

        let updates = updater.updates();
        assert_eq!(updates.len(), 2);
        assert_eq!(updates[1], (request, ContractStatus::FullyFunded));
    }
}
