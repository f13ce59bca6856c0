#![deny(unsafe_code)]

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use peerfund_adapters::{
    DerivedProfileDirectory, MockWalletGateway, RecordingRequestUpdater,
    RecordingTransactionRecorder,
};
use peerfund_core::{
    storage, Contract, ContractOrchestrator, ContractSnapshot, Funding, FundingQuote,
    OrchestratorConfig, OrchestratorError, StoreConfig, WalletId,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub store: StoreConfig,
    pub orchestrator: OrchestratorConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig::Memory,
            orchestrator: OrchestratorConfig::default(),
        }
    }
}

#[derive(Clone)]
pub struct ServiceState {
    pub orchestrator: Arc<ContractOrchestrator>,
    pub store_backend: &'static str,
}

impl ServiceState {
    /// Bootstrap the orchestrator over the configured store, wired to the
    /// deterministic local collaborator adapters.
    pub async fn bootstrap(config: ServiceConfig) -> Result<Self, ServiceError> {
        let handles = storage::bootstrap(config.store).await?;

        let orchestrator = Arc::new(ContractOrchestrator::new(
            handles.contracts,
            handles.fundings,
            Arc::new(DerivedProfileDirectory),
            Arc::new(RecordingRequestUpdater::new()),
            Arc::new(MockWalletGateway::new()),
            Arc::new(RecordingTransactionRecorder::new()),
            config.orchestrator,
        ));

        Ok(Self {
            orchestrator,
            store_backend: handles.backend,
        })
    }
}

pub fn build_router(state: ServiceState) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/contracts", post(open_contract))
        .route("/v1/contracts/:contract_id", get(get_contract))
        .route("/v1/contracts/:contract_id/quote", get(quote))
        .route("/v1/contracts/:contract_id/fundings", post(fund))
        .route("/v1/contracts/:contract_id/repaid", post(mark_repaid))
        .route("/v1/contracts/:contract_id/disburse", post(disburse))
        .route("/v1/fundings/:funding_id/confirm", post(confirm_funding))
        .route("/v1/fundings/:funding_id/reject", post(reject_funding))
        .with_state(state)
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("core orchestrator error: {0}")]
    Core(#[from] OrchestratorError),
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{message}")]
    Http { status: StatusCode, message: String },
    #[error(transparent)]
    Core(#[from] OrchestratorError),
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self::Http {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn status_for(err: &OrchestratorError) -> StatusCode {
        match err {
            OrchestratorError::InvalidAmount(_)
            | OrchestratorError::FundingExceedsOutstanding { .. } => StatusCode::BAD_REQUEST,
            OrchestratorError::InvalidContractState { .. }
            | OrchestratorError::InvalidFundingState { .. } => StatusCode::CONFLICT,
            OrchestratorError::NotFound { .. } => StatusCode::NOT_FOUND,
            OrchestratorError::UpdateRequest { .. }
            | OrchestratorError::TransferRejected(_)
            | OrchestratorError::TransferFunds { .. }
            | OrchestratorError::DisburseContract { .. }
            | OrchestratorError::UpdateContract { .. }
            | OrchestratorError::Transaction { .. } => StatusCode::BAD_GATEWAY,
            OrchestratorError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            OrchestratorError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Http { status, message } => {
                (status, Json(serde_json::json!({ "error": message }))).into_response()
            }
            // A partial disbursement failure carries the settled/pending
            // split so the caller can resume.
            ApiError::Core(OrchestratorError::TransferFunds {
                contract_id,
                funding_id,
                reason,
                settled,
                pending,
            }) => (
                StatusCode::BAD_GATEWAY,
                Json(serde_json::json!({
                    "error": format!(
                        "repayment transfer for funding {funding_id} on contract {contract_id} failed: {reason}"
                    ),
                    "failed_funding_id": funding_id,
                    "settled": settled,
                    "pending": pending,
                })),
            )
                .into_response(),
            ApiError::Core(err) => (
                Self::status_for(&err),
                Json(serde_json::json!({ "error": err.to_string() })),
            )
                .into_response(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
    store_backend: &'static str,
}

async fn health(State(state): State<ServiceState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        service: "peerfund-service",
        store_backend: state.store_backend,
    })
}

#[derive(Debug, Clone, Deserialize)]
struct OpenContractRequest {
    request_id: Uuid,
    wallet_id: String,
    target_amount: u64,
    repayment_amount: u64,
}

async fn open_contract(
    State(state): State<ServiceState>,
    Json(request): Json<OpenContractRequest>,
) -> Result<Json<Contract>, ApiError> {
    if request.wallet_id.trim().is_empty() {
        return Err(ApiError::bad_request("wallet_id is required"));
    }

    let contract = state
        .orchestrator
        .open_contract(
            request.request_id,
            WalletId::new(request.wallet_id),
            request.target_amount,
            request.repayment_amount,
        )
        .await?;
    Ok(Json(contract))
}

async fn get_contract(
    Path(contract_id): Path<Uuid>,
    State(state): State<ServiceState>,
) -> Result<Json<ContractSnapshot>, ApiError> {
    Ok(Json(state.orchestrator.snapshot(contract_id).await?))
}

#[derive(Debug, Clone, Deserialize)]
struct QuoteQuery {
    amount: u64,
}

async fn quote(
    Path(contract_id): Path<Uuid>,
    State(state): State<ServiceState>,
    Query(query): Query<QuoteQuery>,
) -> Result<Json<FundingQuote>, ApiError> {
    Ok(Json(
        state.orchestrator.quote(contract_id, query.amount).await?,
    ))
}

#[derive(Debug, Clone, Deserialize)]
struct FundRequest {
    profile_id: Uuid,
    amount: u64,
}

async fn fund(
    Path(contract_id): Path<Uuid>,
    State(state): State<ServiceState>,
    Json(request): Json<FundRequest>,
) -> Result<Json<Funding>, ApiError> {
    let funding = state
        .orchestrator
        .fund(contract_id, request.profile_id, request.amount)
        .await?;
    Ok(Json(funding))
}

async fn mark_repaid(
    Path(contract_id): Path<Uuid>,
    State(state): State<ServiceState>,
) -> Result<Json<Contract>, ApiError> {
    Ok(Json(state.orchestrator.mark_repaid(contract_id).await?))
}

async fn disburse(
    Path(contract_id): Path<Uuid>,
    State(state): State<ServiceState>,
) -> Result<Json<ContractSnapshot>, ApiError> {
    Ok(Json(state.orchestrator.disburse(contract_id).await?))
}

async fn confirm_funding(
    Path(funding_id): Path<Uuid>,
    State(state): State<ServiceState>,
) -> Result<Json<Funding>, ApiError> {
    Ok(Json(state.orchestrator.confirm_funding(funding_id).await?))
}

async fn reject_funding(
    Path(funding_id): Path<Uuid>,
    State(state): State<ServiceState>,
) -> Result<Json<Funding>, ApiError> {
    Ok(Json(state.orchestrator.reject_funding(funding_id).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use peerfund_core::{ContractStatus, FundingStatus};
    use tower::ServiceExt;

    async fn app() -> Router {
        let state = ServiceState::bootstrap(ServiceConfig::default())
            .await
            .unwrap();
        build_router(state)
    }

    async fn post_json(app: &Router, uri: &str, payload: serde_json::Value) -> (StatusCode, serde_json::Value) {
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(uri)
                    .header("content-type", "application/json")
                    .body(Body::from(payload.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();

        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    async fn post_empty(app: &Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(uri)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    async fn get_json(app: &Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = app
            .clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();

        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn open_payload(target: u64, repayment: u64) -> serde_json::Value {
        serde_json::json!({
            "request_id": Uuid::new_v4(),
            "wallet_id": "wallet-borrower",
            "target_amount": target,
            "repayment_amount": repayment,
        })
    }

    #[tokio::test]
    async fn health_reports_store_backend() {
        let app = app().await;
        let (status, body) = get_json(&app, "/v1/health").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.get("status").and_then(|v| v.as_str()), Some("ok"));
        assert_eq!(
            body.get("store_backend").and_then(|v| v.as_str()),
            Some("memory")
        );
    }

    #[tokio::test]
    async fn contract_can_be_funded_through_the_rest_surface() {
        let app = app().await;

        let (status, contract) =
            post_json(&app, "/v1/contracts", open_payload(1_000_000, 1_200_000)).await;
        assert_eq!(status, StatusCode::OK);
        let contract_id = contract.get("id").and_then(|v| v.as_str()).unwrap().to_string();
        assert_eq!(contract.get("status").and_then(|v| v.as_str()), Some("O"));

        let (status, funding) = post_json(
            &app,
            &format!("/v1/contracts/{contract_id}/fundings"),
            serde_json::json!({ "profile_id": Uuid::new_v4(), "amount": 400_000 }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(funding.get("status").and_then(|v| v.as_str()), Some("C"));
        assert_eq!(
            funding.get("repayment_amount").and_then(|v| v.as_u64()),
            Some(480_000)
        );

        let (status, snapshot) = get_json(&app, &format!("/v1/contracts/{contract_id}")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            snapshot
                .get("contract")
                .and_then(|c| c.get("status"))
                .and_then(|v| v.as_str()),
            Some("PF")
        );

        let (status, quote) = get_json(
            &app,
            &format!("/v1/contracts/{contract_id}/quote?amount=500000"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(quote.get("yield_percent").and_then(|v| v.as_i64()), Some(20));
        assert_eq!(
            quote.get("funding_percentage").and_then(|v| v.as_u64()),
            Some(50)
        );
        assert_eq!(
            quote.get("outstanding_amount").and_then(|v| v.as_u64()),
            Some(600_000)
        );
    }

    #[tokio::test]
    async fn full_lifecycle_ends_disbursed() {
        let app = app().await;

        let (_, contract) =
            post_json(&app, "/v1/contracts", open_payload(850_000, 850_000)).await;
        let contract_id = contract.get("id").and_then(|v| v.as_str()).unwrap().to_string();

        for amount in [460_000u64, 390_000] {
            let (status, funding) = post_json(
                &app,
                &format!("/v1/contracts/{contract_id}/fundings"),
                serde_json::json!({ "profile_id": Uuid::new_v4(), "amount": amount }),
            )
            .await;
            assert_eq!(status, StatusCode::OK);

            let funding_id = funding.get("id").and_then(|v| v.as_str()).unwrap();
            let (status, _) =
                post_empty(&app, &format!("/v1/fundings/{funding_id}/confirm")).await;
            assert_eq!(status, StatusCode::OK);
        }

        let (status, repaid) =
            post_empty(&app, &format!("/v1/contracts/{contract_id}/repaid")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            repaid.get("status").and_then(|v| v.as_str()),
            Some(ContractStatus::FundsRepaid.code())
        );

        let (status, snapshot) =
            post_empty(&app, &format!("/v1/contracts/{contract_id}/disburse")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            snapshot
                .get("contract")
                .and_then(|c| c.get("status"))
                .and_then(|v| v.as_str()),
            Some(ContractStatus::FundsDisbursed.code())
        );
        let fundings = snapshot.get("fundings").and_then(|v| v.as_array()).unwrap();
        assert_eq!(fundings.len(), 2);
        for funding in fundings {
            assert_eq!(
                funding.get("status").and_then(|v| v.as_str()),
                Some(FundingStatus::FundsDisbursed.code())
            );
        }
    }

    #[tokio::test]
    async fn overfunding_is_a_bad_request() {
        let app = app().await;

        let (_, contract) =
            post_json(&app, "/v1/contracts", open_payload(1_000_000, 1_200_000)).await;
        let contract_id = contract.get("id").and_then(|v| v.as_str()).unwrap().to_string();

        let (status, body) = post_json(
            &app,
            &format!("/v1/contracts/{contract_id}/fundings"),
            serde_json::json!({ "profile_id": Uuid::new_v4(), "amount": 1_000_001 }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body
            .get("error")
            .and_then(|v| v.as_str())
            .unwrap()
            .contains("exceeds outstanding"));
    }

    #[tokio::test]
    async fn unknown_contract_is_not_found() {
        let app = app().await;
        let (status, _) = get_json(&app, &format!("/v1/contracts/{}", Uuid::new_v4())).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn disbursing_an_open_contract_is_a_conflict() {
        let app = app().await;

        let (_, contract) =
            post_json(&app, "/v1/contracts", open_payload(1_000_000, 1_200_000)).await;
        let contract_id = contract.get("id").and_then(|v| v.as_str()).unwrap().to_string();

        let (status, _) =
            post_empty(&app, &format!("/v1/contracts/{contract_id}/disburse")).await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn blank_wallet_id_is_rejected() {
        let app = app().await;
        let (status, _) = post_json(
            &app,
            "/v1/contracts",
            serde_json::json!({
                "request_id": Uuid::new_v4(),
                "wallet_id": "  ",
                "target_amount": 1_000,
                "repayment_amount": 1_200,
            }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
