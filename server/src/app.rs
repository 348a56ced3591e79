use std::sync::Arc;

use anyhow::anyhow;
use axum::{
    extract::{Json, Path, Query, State},
    http::{HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};

use crate::registry::{create_account, Registry, RegistryError};

/// Header carrying the hex private key of the calling account.
pub const PRIVATE_KEY_HEADER: &str = "x-private-key";

#[derive(Clone)]
pub struct RouterCtx {
    pub registry: Arc<Registry>,
    pub contract_name: String,
}

pub fn router(ctx: RouterCtx) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(vec![Method::GET, Method::POST])
        .allow_headers(Any);

    Router::new()
        .route("/_health", get(health))
        .route("/api/config", get(get_config))
        .route("/api/accounts", post(new_account))
        .route("/api/houses", get(get_nb_houses).post(add_house))
        .route("/api/houses/index/{index}", get(get_house))
        .route("/api/houses/{house_id}", get(get_house_with_id))
        .route("/api/houses/{house_id}/transfer", post(transfer_ownership))
        .route(
            "/api/houses/{house_id}/documents",
            get(get_nb_doc).post(add_document),
        )
        .route(
            "/api/houses/{house_id}/documents/index/{index}",
            get(get_document),
        )
        .route(
            "/api/houses/{house_id}/documents/{document_id}",
            get(get_document_with_id),
        )
        .route(
            "/api/houses/{house_id}/documents/{document_id}/verified",
            get(is_verified),
        )
        .route(
            "/api/houses/{house_id}/documents/{document_id}/verify",
            post(set_verification),
        )
        .with_state(ctx)
        .layer(cors)
}

pub struct AppError(pub StatusCode, pub anyhow::Error);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.0, Json(json!({ "error": self.1.to_string() }))).into_response()
    }
}

impl From<RegistryError> for AppError {
    fn from(err: RegistryError) -> Self {
        let status = match err {
            RegistryError::NotFound => StatusCode::NOT_FOUND,
            RegistryError::InvalidKey(_) | RegistryError::InvalidArgument(_) => {
                StatusCode::BAD_REQUEST
            }
            RegistryError::Artifact(_) | RegistryError::Operation { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        AppError(status, err.into())
    }
}

fn private_key(headers: &HeaderMap) -> Result<&str, AppError> {
    headers
        .get(PRIVATE_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            AppError(
                StatusCode::BAD_REQUEST,
                anyhow!("Missing {PRIVATE_KEY_HEADER} header"),
            )
        })
}

// --------------------------------------------------------
//     Routes
// --------------------------------------------------------

async fn health() -> impl IntoResponse {
    Json("OK")
}

#[derive(Serialize)]
struct ConfigResponse {
    contract_name: String,
    contract_address: Option<String>,
}

async fn get_config(State(ctx): State<RouterCtx>) -> impl IntoResponse {
    Json(ConfigResponse {
        contract_name: ctx.contract_name,
        contract_address: ctx.registry.address().map(|a| a.to_checksum(None)),
    })
}

async fn new_account() -> impl IntoResponse {
    Json(create_account())
}

async fn get_nb_houses(
    State(ctx): State<RouterCtx>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let key = private_key(&headers)?;
    Ok(Json(ctx.registry.get_nb_houses(key).await?))
}

async fn get_house(
    State(ctx): State<RouterCtx>,
    Path(index): Path<u64>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let key = private_key(&headers)?;
    Ok(Json(ctx.registry.get_house(index, key).await?))
}

async fn get_house_with_id(
    State(ctx): State<RouterCtx>,
    Path(house_id): Path<String>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let key = private_key(&headers)?;
    Ok(Json(ctx.registry.get_house_with_id(&house_id, key).await?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddHouseRequest {
    street: String,
    zip_code: String,
    city: String,
    country: String,
    house_id: String,
}

async fn add_house(
    State(ctx): State<RouterCtx>,
    headers: HeaderMap,
    Json(req): Json<AddHouseRequest>,
) -> Result<impl IntoResponse, AppError> {
    let key = private_key(&headers)?;
    let ack = ctx
        .registry
        .add_house(
            &req.street,
            &req.zip_code,
            &req.city,
            &req.country,
            &req.house_id,
            key,
        )
        .await?;
    Ok(Json(ack))
}

#[derive(Debug, Deserialize)]
struct TransferRequest {
    from: String,
    to: String,
}

async fn transfer_ownership(
    State(ctx): State<RouterCtx>,
    Path(house_id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<TransferRequest>,
) -> Result<impl IntoResponse, AppError> {
    let key = private_key(&headers)?;
    let receipt = ctx
        .registry
        .transfer_ownership(&req.from, &req.to, &house_id, key)
        .await?;
    Ok(Json(receipt))
}

async fn get_nb_doc(
    State(ctx): State<RouterCtx>,
    Path(house_id): Path<String>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let key = private_key(&headers)?;
    Ok(Json(ctx.registry.get_nb_doc(key, &house_id).await?))
}

async fn get_document(
    State(ctx): State<RouterCtx>,
    Path((house_id, index)): Path<(String, u64)>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let key = private_key(&headers)?;
    Ok(Json(ctx.registry.get_document(index, key, &house_id).await?))
}

#[derive(Debug, Deserialize)]
struct OwnerQuery {
    owner: String,
}

async fn get_document_with_id(
    State(ctx): State<RouterCtx>,
    Path((house_id, document_id)): Path<(String, String)>,
    Query(query): Query<OwnerQuery>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let key = private_key(&headers)?;
    let document = ctx
        .registry
        .get_document_with_id(&query.owner, &house_id, &document_id, key)
        .await?;
    Ok(Json(document))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddDocumentRequest {
    file_id: String,
    hash: String,
    time: u64,
}

async fn add_document(
    State(ctx): State<RouterCtx>,
    Path(house_id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<AddDocumentRequest>,
) -> Result<impl IntoResponse, AppError> {
    let key = private_key(&headers)?;
    let added = ctx
        .registry
        .add_document(&req.hash, key, &req.file_id, &house_id, req.time)
        .await?;
    Ok(Json(added))
}

async fn is_verified(
    State(ctx): State<RouterCtx>,
    Path((house_id, document_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let key = private_key(&headers)?;
    Ok(Json(
        ctx.registry.is_verified(&document_id, &house_id, key).await?,
    ))
}

#[derive(Debug, Deserialize)]
struct VerifyRequest {
    owner: String,
}

async fn set_verification(
    State(ctx): State<RouterCtx>,
    Path((house_id, document_id)): Path<(String, String)>,
    headers: HeaderMap,
    Json(req): Json<VerifyRequest>,
) -> Result<impl IntoResponse, AppError> {
    let key = private_key(&headers)?;
    let verification = ctx
        .registry
        .set_verification(&req.owner, &document_id, &house_id, key)
        .await?;
    Ok(Json(verification))
}
