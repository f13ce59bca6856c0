use crate::collaborators::{ContractStore, FundingLedger};
use crate::error::OrchestratorError;
use crate::types::{Contract, ContractStatus, Funding, FundingStatus, WalletId};
use async_trait::async_trait;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Contract/funding persistence backend configuration.
#[derive(Debug, Clone)]
pub enum StoreConfig {
    /// Keep contracts and fundings in process memory only.
    Memory,
    /// Persist both tables in PostgreSQL.
    Postgres {
        database_url: String,
        max_connections: u32,
    },
}

impl StoreConfig {
    pub fn memory() -> Self {
        Self::Memory
    }

    pub fn postgres(database_url: impl Into<String>, max_connections: u32) -> Self {
        Self::Postgres {
            database_url: database_url.into(),
            max_connections,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Postgres { .. } => "postgres",
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::Memory
    }
}

/// Trait handles over one bootstrapped backend.
#[derive(Clone)]
pub struct StoreHandles {
    pub contracts: Arc<dyn ContractStore>,
    pub fundings: Arc<dyn FundingLedger>,
    pub backend: &'static str,
}

/// Bootstrap the configured backend and hand out both store facets.
pub async fn bootstrap(config: StoreConfig) -> Result<StoreHandles, OrchestratorError> {
    match config {
        StoreConfig::Memory => {
            let store = Arc::new(MemoryStore::new());
            Ok(StoreHandles {
                contracts: store.clone(),
                fundings: store,
                backend: "memory",
            })
        }
        StoreConfig::Postgres {
            database_url,
            max_connections,
        } => {
            let store = PostgresStore::connect(&database_url, max_connections).await?;
            store.ensure_schema().await?;
            let store = Arc::new(store);
            Ok(StoreHandles {
                contracts: store.clone(),
                fundings: store,
                backend: "postgres",
            })
        }
    }
}

/// In-memory store backing tests and the service's local mode.
#[derive(Debug, Default)]
pub struct MemoryStore {
    contracts: RwLock<HashMap<Uuid, Contract>>,
    fundings: RwLock<HashMap<Uuid, Funding>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ContractStore for MemoryStore {
    async fn insert(&self, contract: Contract) -> Result<Contract, OrchestratorError> {
        let mut contracts = self.contracts.write().await;
        contracts.insert(contract.id, contract.clone());
        Ok(contract)
    }

    async fn get(&self, id: Uuid) -> Result<Contract, OrchestratorError> {
        self.contracts
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| OrchestratorError::not_found("contract", id))
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: ContractStatus,
    ) -> Result<(), OrchestratorError> {
        let mut contracts = self.contracts.write().await;
        let contract = contracts
            .get_mut(&id)
            .ok_or_else(|| OrchestratorError::not_found("contract", id))?;
        contract.status = status;
        Ok(())
    }
}

#[async_trait]
impl FundingLedger for MemoryStore {
    async fn create(
        &self,
        funding: Funding,
        derived_status: ContractStatus,
    ) -> Result<Funding, OrchestratorError> {
        // Both write guards are held until the end of the call, so readers
        // never observe the funding without the status it implies.
        let mut contracts = self.contracts.write().await;
        let contract = contracts
            .get_mut(&funding.contract_id)
            .ok_or_else(|| OrchestratorError::not_found("contract", funding.contract_id))?;
        let mut fundings = self.fundings.write().await;
        fundings.insert(funding.id, funding.clone());
        contract.status = derived_status;
        Ok(funding)
    }

    async fn get(&self, funding_id: Uuid) -> Result<Funding, OrchestratorError> {
        self.fundings
            .read()
            .await
            .get(&funding_id)
            .cloned()
            .ok_or_else(|| OrchestratorError::not_found("funding", funding_id))
    }

    async fn list_by_contract(
        &self,
        contract_id: Uuid,
    ) -> Result<Vec<Funding>, OrchestratorError> {
        let fundings = self.fundings.read().await;
        let mut list: Vec<Funding> = fundings
            .values()
            .filter(|funding| funding.contract_id == contract_id)
            .cloned()
            .collect();
        list.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(list)
    }

    async fn update_status_batch(
        &self,
        ids: &[Uuid],
        status: FundingStatus,
    ) -> Result<(), OrchestratorError> {
        let mut fundings = self.fundings.write().await;
        for id in ids {
            if !fundings.contains_key(id) {
                return Err(OrchestratorError::not_found("funding", *id));
            }
        }
        for id in ids {
            if let Some(funding) = fundings.get_mut(id) {
                funding.status = status;
            }
        }
        Ok(())
    }

    async fn mark_disbursed(&self, ids: &[Uuid]) -> Result<(), OrchestratorError> {
        let mut fundings = self.fundings.write().await;
        for id in ids {
            if !fundings.contains_key(id) {
                return Err(OrchestratorError::not_found("funding", *id));
            }
        }
        for id in ids {
            if let Some(funding) = fundings.get_mut(id) {
                funding.status = FundingStatus::FundsDisbursed;
                funding.disbursed_amount = funding.repayment_amount;
            }
        }
        Ok(())
    }
}

/// PostgreSQL-backed store for contracts and fundings.
///
/// The funding insert and the contract status it implies commit in a single
/// transaction (see [`FundingLedger::create`]).
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
    ) -> Result<Self, OrchestratorError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect(database_url)
            .await
            .map_err(|e| OrchestratorError::Storage(format!("postgres connect failed: {e}")))?;

        Ok(Self { pool })
    }

    pub async fn ensure_schema(&self) -> Result<(), OrchestratorError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS contracts (
                id UUID PRIMARY KEY,
                request_id UUID NOT NULL UNIQUE,
                wallet_id TEXT NOT NULL,
                target_amount BIGINT NOT NULL,
                repayment_amount BIGINT NOT NULL,
                status TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| OrchestratorError::Storage(format!("postgres schema create failed: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS fundings (
                id UUID PRIMARY KEY,
                contract_id UUID NOT NULL REFERENCES contracts (id),
                profile_id UUID NOT NULL,
                status TEXT NOT NULL,
                funding_amount BIGINT NOT NULL,
                repayment_amount BIGINT NOT NULL,
                disbursed_amount BIGINT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| OrchestratorError::Storage(format!("postgres schema create failed: {e}")))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_fundings_contract_id ON fundings (contract_id)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| OrchestratorError::Storage(format!("postgres index create failed: {e}")))?;

        Ok(())
    }
}

fn amount_to_db(amount: u64) -> Result<i64, OrchestratorError> {
    amount
        .try_into()
        .map_err(|_| OrchestratorError::Storage("amount exceeds BIGINT range".to_string()))
}

fn amount_from_db(value: i64, column: &str) -> Result<u64, OrchestratorError> {
    value
        .try_into()
        .map_err(|_| OrchestratorError::Storage(format!("negative {column} in storage")))
}

fn contract_from_row(row: &PgRow) -> Result<Contract, OrchestratorError> {
    let status_code: String = row
        .try_get("status")
        .map_err(|e| OrchestratorError::Storage(format!("decode status failed: {e}")))?;
    let status = ContractStatus::parse(&status_code).ok_or_else(|| {
        OrchestratorError::Storage(format!("unknown contract status '{status_code}' in storage"))
    })?;
    let wallet: String = row
        .try_get("wallet_id")
        .map_err(|e| OrchestratorError::Storage(format!("decode wallet_id failed: {e}")))?;

    Ok(Contract {
        id: row
            .try_get("id")
            .map_err(|e| OrchestratorError::Storage(format!("decode id failed: {e}")))?,
        request_id: row
            .try_get("request_id")
            .map_err(|e| OrchestratorError::Storage(format!("decode request_id failed: {e}")))?,
        wallet_id: WalletId::new(wallet),
        target_amount: amount_from_db(
            row.try_get("target_amount").map_err(|e| {
                OrchestratorError::Storage(format!("decode target_amount failed: {e}"))
            })?,
            "target_amount",
        )?,
        repayment_amount: amount_from_db(
            row.try_get("repayment_amount").map_err(|e| {
                OrchestratorError::Storage(format!("decode repayment_amount failed: {e}"))
            })?,
            "repayment_amount",
        )?,
        status,
        created_at: row
            .try_get("created_at")
            .map_err(|e| OrchestratorError::Storage(format!("decode created_at failed: {e}")))?,
    })
}

fn funding_from_row(row: &PgRow) -> Result<Funding, OrchestratorError> {
    let status_code: String = row
        .try_get("status")
        .map_err(|e| OrchestratorError::Storage(format!("decode status failed: {e}")))?;
    let status = FundingStatus::parse(&status_code).ok_or_else(|| {
        OrchestratorError::Storage(format!("unknown funding status '{status_code}' in storage"))
    })?;

    Ok(Funding {
        id: row
            .try_get("id")
            .map_err(|e| OrchestratorError::Storage(format!("decode id failed: {e}")))?,
        contract_id: row
            .try_get("contract_id")
            .map_err(|e| OrchestratorError::Storage(format!("decode contract_id failed: {e}")))?,
        profile_id: row
            .try_get("profile_id")
            .map_err(|e| OrchestratorError::Storage(format!("decode profile_id failed: {e}")))?,
        status,
        funding_amount: amount_from_db(
            row.try_get("funding_amount").map_err(|e| {
                OrchestratorError::Storage(format!("decode funding_amount failed: {e}"))
            })?,
            "funding_amount",
        )?,
        repayment_amount: amount_from_db(
            row.try_get("repayment_amount").map_err(|e| {
                OrchestratorError::Storage(format!("decode repayment_amount failed: {e}"))
            })?,
            "repayment_amount",
        )?,
        disbursed_amount: amount_from_db(
            row.try_get("disbursed_amount").map_err(|e| {
                OrchestratorError::Storage(format!("decode disbursed_amount failed: {e}"))
            })?,
            "disbursed_amount",
        )?,
        created_at: row
            .try_get("created_at")
            .map_err(|e| OrchestratorError::Storage(format!("decode created_at failed: {e}")))?,
    })
}

#[async_trait]
impl ContractStore for PostgresStore {
    async fn insert(&self, contract: Contract) -> Result<Contract, OrchestratorError> {
        sqlx::query(
            r#"
            INSERT INTO contracts (
                id, request_id, wallet_id, target_amount, repayment_amount, status, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(contract.id)
        .bind(contract.request_id)
        .bind(contract.wallet_id.as_str())
        .bind(amount_to_db(contract.target_amount)?)
        .bind(amount_to_db(contract.repayment_amount)?)
        .bind(contract.status.code())
        .bind(contract.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| OrchestratorError::Storage(format!("postgres insert failed: {e}")))?;

        Ok(contract)
    }

    async fn get(&self, id: Uuid) -> Result<Contract, OrchestratorError> {
        let row = sqlx::query("SELECT * FROM contracts WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| OrchestratorError::Storage(format!("postgres load failed: {e}")))?
            .ok_or_else(|| OrchestratorError::not_found("contract", id))?;

        contract_from_row(&row)
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: ContractStatus,
    ) -> Result<(), OrchestratorError> {
        let result = sqlx::query("UPDATE contracts SET status = $1 WHERE id = $2")
            .bind(status.code())
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| OrchestratorError::Storage(format!("postgres update failed: {e}")))?;

        if result.rows_affected() == 0 {
            return Err(OrchestratorError::not_found("contract", id));
        }
        Ok(())
    }
}

#[async_trait]
impl FundingLedger for PostgresStore {
    async fn create(
        &self,
        funding: Funding,
        derived_status: ContractStatus,
    ) -> Result<Funding, OrchestratorError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| OrchestratorError::Storage(format!("postgres begin failed: {e}")))?;

        sqlx::query(
            r#"
            INSERT INTO fundings (
                id, contract_id, profile_id, status,
                funding_amount, repayment_amount, disbursed_amount, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(funding.id)
        .bind(funding.contract_id)
        .bind(funding.profile_id)
        .bind(funding.status.code())
        .bind(amount_to_db(funding.funding_amount)?)
        .bind(amount_to_db(funding.repayment_amount)?)
        .bind(amount_to_db(funding.disbursed_amount)?)
        .bind(funding.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| OrchestratorError::Storage(format!("postgres insert failed: {e}")))?;

        let updated = sqlx::query("UPDATE contracts SET status = $1 WHERE id = $2")
            .bind(derived_status.code())
            .bind(funding.contract_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| OrchestratorError::Storage(format!("postgres update failed: {e}")))?;

        if updated.rows_affected() == 0 {
            return Err(OrchestratorError::not_found("contract", funding.contract_id));
        }

        tx.commit()
            .await
            .map_err(|e| OrchestratorError::Storage(format!("postgres commit failed: {e}")))?;

        Ok(funding)
    }

    async fn get(&self, funding_id: Uuid) -> Result<Funding, OrchestratorError> {
        let row = sqlx::query("SELECT * FROM fundings WHERE id = $1")
            .bind(funding_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| OrchestratorError::Storage(format!("postgres load failed: {e}")))?
            .ok_or_else(|| OrchestratorError::not_found("funding", funding_id))?;

        funding_from_row(&row)
    }

    async fn list_by_contract(
        &self,
        contract_id: Uuid,
    ) -> Result<Vec<Funding>, OrchestratorError> {
        let rows = sqlx::query(
            "SELECT * FROM fundings WHERE contract_id = $1 ORDER BY created_at ASC, id ASC",
        )
        .bind(contract_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| OrchestratorError::Storage(format!("postgres load failed: {e}")))?;

        rows.iter().map(funding_from_row).collect()
    }

    async fn update_status_batch(
        &self,
        ids: &[Uuid],
        status: FundingStatus,
    ) -> Result<(), OrchestratorError> {
        if ids.is_empty() {
            return Ok(());
        }

        let result = sqlx::query("UPDATE fundings SET status = $1 WHERE id = ANY($2)")
            .bind(status.code())
            .bind(ids.to_vec())
            .execute(&self.pool)
            .await
            .map_err(|e| OrchestratorError::Storage(format!("postgres update failed: {e}")))?;

        if result.rows_affected() != ids.len() as u64 {
            return Err(OrchestratorError::Storage(format!(
                "funding batch update touched {} of {} rows",
                result.rows_affected(),
                ids.len()
            )));
        }
        Ok(())
    }

    async fn mark_disbursed(&self, ids: &[Uuid]) -> Result<(), OrchestratorError> {
        if ids.is_empty() {
            return Ok(());
        }

        let result = sqlx::query(
            "UPDATE fundings SET status = $1, disbursed_amount = repayment_amount \
             WHERE id = ANY($2)",
        )
        .bind(FundingStatus::FundsDisbursed.code())
        .bind(ids.to_vec())
        .execute(&self.pool)
        .await
        .map_err(|e| OrchestratorError::Storage(format!("postgres update failed: {e}")))?;

        if result.rows_affected() != ids.len() as u64 {
            return Err(OrchestratorError::Storage(format!(
                "disburse batch update touched {} of {} rows",
                result.rows_affected(),
                ids.len()
            )));
        }
        Ok(())
    }
}
