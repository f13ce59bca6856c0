//! Repayment fan-out for the disbursement saga.
//!
//! One transfer per funding, issued through a bounded worker pool. The saga
//! is not atomic across fundings: each settled transfer has moved real value,
//! so the executor persists a per-funding `TransferSettled` marker the moment
//! the gateway confirms, and a later run skips marked fundings. On the first
//! failure an abort flag stops fundings that have not issued their transfer
//! yet; transfers already in flight are never cancelled.

use crate::collaborators::{
    with_timeout, FundingLedger, ProfileLookup, TransactionRecorder, WalletTransferGateway,
};
use crate::error::OrchestratorError;
use crate::types::{Contract, Funding, FundingStatus, TransferDetails, TransferRecord};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::warn;
use uuid::Uuid;

enum TransferOutcome {
    Settled(TransferRecord),
    Skipped,
    Failed {
        err: OrchestratorError,
        /// True when the `TransferSettled` marker was persisted before the
        /// failure; such fundings must not be re-transferred.
        marker_persisted: bool,
    },
}

/// Executes the transfer fan-out (Step 1 of the disbursement saga).
pub struct DisbursementExecutor {
    profiles: Arc<dyn ProfileLookup>,
    wallets: Arc<dyn WalletTransferGateway>,
    transactions: Arc<dyn TransactionRecorder>,
    ledger: Arc<dyn FundingLedger>,
    concurrency: usize,
    call_timeout: Duration,
}

impl DisbursementExecutor {
    pub fn new(
        profiles: Arc<dyn ProfileLookup>,
        wallets: Arc<dyn WalletTransferGateway>,
        transactions: Arc<dyn TransactionRecorder>,
        ledger: Arc<dyn FundingLedger>,
        concurrency: usize,
        call_timeout: Duration,
    ) -> Self {
        Self {
            profiles,
            wallets,
            transactions,
            ledger,
            concurrency,
            call_timeout,
        }
    }

    /// Transfer each eligible funding's repayment share from the contract
    /// wallet to its investor wallet.
    ///
    /// `already_settled` carries fundings marked in an earlier run; they are
    /// reported as settled in any failure so a resumption attempt knows the
    /// complete picture. Returns the records settled in this run, or a
    /// [`OrchestratorError::TransferFunds`] naming the first failed funding
    /// and the settled/pending split.
    pub async fn execute(
        &self,
        contract: &Contract,
        eligible: Vec<Funding>,
        already_settled: Vec<Uuid>,
    ) -> Result<Vec<TransferRecord>, OrchestratorError> {
        if eligible.is_empty() {
            return Ok(Vec::new());
        }

        let order: HashMap<Uuid, usize> = eligible
            .iter()
            .enumerate()
            .map(|(idx, funding)| (funding.id, idx))
            .collect();

        let semaphore = Arc::new(Semaphore::new(self.concurrency.max(1)));
        let abort = Arc::new(AtomicBool::new(false));
        let mut tasks = JoinSet::new();

        for funding in eligible {
            let semaphore = semaphore.clone();
            let abort = abort.clone();
            let profiles = Arc::clone(&self.profiles);
            let wallets = Arc::clone(&self.wallets);
            let transactions = Arc::clone(&self.transactions);
            let ledger = Arc::clone(&self.ledger);
            let from_wallet = contract.wallet_id.clone();
            let contract_id = contract.id;
            let limit = self.call_timeout;

            tasks.spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        return (
                            funding.id,
                            TransferOutcome::Failed {
                                err: OrchestratorError::Storage(
                                    "transfer pool closed".to_string(),
                                ),
                                marker_persisted: false,
                            },
                        );
                    }
                };

                if abort.load(Ordering::Acquire) {
                    return (funding.id, TransferOutcome::Skipped);
                }

                let to_wallet = match with_timeout(
                    "profile wallet lookup",
                    limit,
                    profiles.wallet_id(funding.profile_id),
                )
                .await
                {
                    Ok(wallet) => wallet,
                    Err(err) => {
                        abort.store(true, Ordering::Release);
                        return (
                            funding.id,
                            TransferOutcome::Failed {
                                err,
                                marker_persisted: false,
                            },
                        );
                    }
                };

                // Last cancellation gate: once the transfer is issued it runs
                // to completion, success or failure.
                if abort.load(Ordering::Acquire) {
                    return (funding.id, TransferOutcome::Skipped);
                }

                let confirmation = match with_timeout(
                    "wallet transfer",
                    limit,
                    wallets.transfer(&from_wallet, &to_wallet, funding.repayment_amount),
                )
                .await
                {
                    Ok(confirmation) => confirmation,
                    Err(err) => {
                        abort.store(true, Ordering::Release);
                        return (
                            funding.id,
                            TransferOutcome::Failed {
                                err,
                                marker_persisted: false,
                            },
                        );
                    }
                };

                // Value has moved. Persist the marker before anything else so
                // a retry skips this funding.
                if let Err(err) = ledger
                    .update_status_batch(&[funding.id], FundingStatus::TransferSettled)
                    .await
                {
                    abort.store(true, Ordering::Release);
                    warn!(
                        funding_id = %funding.id,
                        "transfer settled but marker write failed; reconcile before retrying"
                    );
                    return (
                        funding.id,
                        TransferOutcome::Failed {
                            err,
                            marker_persisted: false,
                        },
                    );
                }

                let details = TransferDetails {
                    contract_id,
                    funding_id: funding.id,
                    from_wallet,
                    to_wallet,
                    amount: funding.repayment_amount,
                    reference: confirmation.reference.clone(),
                    occurred_at: confirmation.settled_at,
                };
                if let Err(err) =
                    with_timeout("transaction record", limit, transactions.record(&details)).await
                {
                    abort.store(true, Ordering::Release);
                    return (
                        funding.id,
                        TransferOutcome::Failed {
                            err: OrchestratorError::Transaction {
                                funding_id: funding.id,
                                reason: err.to_string(),
                            },
                            marker_persisted: true,
                        },
                    );
                }

                (
                    funding.id,
                    TransferOutcome::Settled(TransferRecord {
                        funding_id: funding.id,
                        reference: confirmation.reference,
                        settled_at: confirmation.settled_at,
                    }),
                )
            });
        }

        let mut outcomes: Vec<(Uuid, TransferOutcome)> = Vec::with_capacity(order.len());
        while let Some(joined) = tasks.join_next().await {
            if let Ok(outcome) = joined {
                outcomes.push(outcome);
            }
        }
        // A task that panicked never reported; account for it as a failure.
        for (id, _) in order.iter() {
            if !outcomes.iter().any(|(seen, _)| seen == id) {
                outcomes.push((
                    *id,
                    TransferOutcome::Failed {
                        err: OrchestratorError::Storage("transfer task failed".to_string()),
                        marker_persisted: false,
                    },
                ));
            }
        }

        let mut settled = Vec::new();
        let mut settled_ids = already_settled;
        let mut pending: Vec<(usize, Uuid)> = Vec::new();
        let mut failures: Vec<(usize, Uuid, OrchestratorError)> = Vec::new();

        for (id, outcome) in outcomes {
            let idx = order.get(&id).copied().unwrap_or(usize::MAX);
            match outcome {
                TransferOutcome::Settled(record) => {
                    settled_ids.push(id);
                    settled.push((idx, record));
                }
                TransferOutcome::Skipped => pending.push((idx, id)),
                TransferOutcome::Failed {
                    err,
                    marker_persisted,
                } => {
                    if marker_persisted {
                        settled_ids.push(id);
                    } else {
                        pending.push((idx, id));
                    }
                    failures.push((idx, id, err));
                }
            }
        }

        settled.sort_by_key(|(idx, _)| *idx);
        let settled: Vec<TransferRecord> =
            settled.into_iter().map(|(_, record)| record).collect();

        if failures.is_empty() {
            return Ok(settled);
        }

        failures.sort_by_key(|(idx, _, _)| *idx);
        pending.sort_by_key(|(idx, _)| *idx);
        let (_, failed_funding, first_err) = failures.remove(0);

        Err(OrchestratorError::TransferFunds {
            contract_id: contract.id,
            funding_id: failed_funding,
            reason: first_err.to_string(),
            settled: settled_ids,
            pending: pending.into_iter().map(|(_, id)| id).collect(),
        })
    }
}
