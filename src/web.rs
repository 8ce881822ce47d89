//! HTTP retrieval service.
//!
//! Read-only query layer over the search backend. Requests are handled on
//! the tokio event loop; the only compute-bound step (encoding query text)
//! is dispatched to the blocking pool and bounded by a timeout so a slow
//! encode never stalls unrelated requests.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::signal;

use crate::backend::{query, BackendError, EsBackend, SearchBackend, SearchHit};
use crate::catalog::Product;
use crate::config::Config;
use crate::encoder::{Encoder, EncoderError, TextEncoder};

/// Neighbors returned by semantic suggestions.
pub const SUGGESTION_K: u32 = 5;
/// Neighbors returned by recommendation.
pub const RECOMMEND_K: u32 = 5;

const DEFAULT_PAGE_SIZE: u32 = 20;
const MAX_PAGE_SIZE: u32 = 100;

#[derive(Clone)]
pub struct SharedState {
    pub backend: Arc<dyn SearchBackend>,
    /// Absent when the model failed to load at startup; semantic paths
    /// then fail fast with 503 while lexical paths keep serving.
    pub encoder: Option<Arc<dyn TextEncoder>>,
    pub encode_timeout: Duration,
}

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/search-keyword", get(search_keyword))
        .route("/search-semantic-suggestions", get(semantic_suggestions))
        .route("/products", get(list_products))
        .route("/recommend/:id", get(recommend))
        .route("/categories", get(categories))
        .layer(
            tower_http::trace::TraceLayer::new_for_http()
                .make_span_with(
                    tower_http::trace::DefaultMakeSpan::new().level(tracing::Level::INFO),
                )
                .on_response(
                    tower_http::trace::DefaultOnResponse::new().level(tracing::Level::INFO),
                ),
        )
        .with_state(Arc::new(state))
}

/// Build the runtime and serve until SIGINT/SIGTERM.
pub fn start_daemon(config: Config) -> anyhow::Result<()> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(serve(config))
}

async fn serve(config: Config) -> anyhow::Result<()> {
    let backend = EsBackend::new(&config.backend)?;
    backend.ping().await.map_err(|err| {
        anyhow::anyhow!("search backend unreachable at {}: {err}", config.backend.url)
    })?;
    log::info!("connected to search backend at {}", config.backend.url);

    // an encoder failure only disables the semantic paths
    let encoder: Option<Arc<dyn TextEncoder>> = match Encoder::new(&config.encoder) {
        Ok(encoder) => {
            log::info!(
                "loaded embedding model '{}' ({} dims)",
                encoder.name(),
                encoder.dimensions()
            );
            Some(Arc::new(encoder))
        }
        Err(err) => {
            log::error!(
                "embedding model failed to load, semantic endpoints will return 503: {err}"
            );
            None
        }
    };

    let state = SharedState {
        backend: Arc::new(backend),
        encoder,
        encode_timeout: Duration::from_secs(config.encoder.encode_timeout_secs),
    };

    let listener = tokio::net::TcpListener::bind(&config.server.listen).await?;
    log::info!("listening on {}", config.server.listen);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

// --- error mapping ---

#[derive(Debug)]
pub enum HttpError {
    BadRequest(String),
    NotFound(String),
    EncoderUnavailable,
    MissingEmbedding(String),
    EncodeTimeout,
    Backend(BackendError),
    Encoder(EncoderError),
    Internal(String),
}

impl IntoResponse for HttpError {
    fn into_response(self) -> axum::response::Response {
        use axum::http::StatusCode;

        let (status, message) = match &self {
            HttpError::BadRequest(message) => (StatusCode::BAD_REQUEST, message.clone()),
            HttpError::NotFound(id) => {
                (StatusCode::NOT_FOUND, format!("no product with id '{id}'"))
            }
            HttpError::EncoderUnavailable => (
                StatusCode::SERVICE_UNAVAILABLE,
                "embedding model is not available".to_string(),
            ),
            HttpError::MissingEmbedding(id) => {
                log::error!("product {id} has no stored embedding");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("product '{id}' has no stored embedding"),
                )
            }
            HttpError::EncodeTimeout => {
                log::error!("encode call timed out");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "embedding generation timed out".to_string(),
                )
            }
            HttpError::Backend(err) => {
                log::error!("backend error: {err}");
                (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
            }
            HttpError::Encoder(err) => {
                log::error!("encoder error: {err}");
                (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
            }
            HttpError::Internal(message) => {
                log::error!("internal error: {message}");
                (StatusCode::INTERNAL_SERVER_ERROR, message.clone())
            }
        };

        (status, Json(json!({"error": message}))).into_response()
    }
}

impl From<BackendError> for HttpError {
    fn from(err: BackendError) -> Self {
        Self::Backend(err)
    }
}

impl From<EncoderError> for HttpError {
    fn from(err: EncoderError) -> Self {
        Self::Encoder(err)
    }
}

// --- request/response types ---

#[derive(Debug, Deserialize)]
pub struct KeywordParams {
    pub query: String,
    pub category: Option<String>,
    pub size: Option<u32>,
}

/// Keyword hit: identity and score with the record flattened alongside,
/// mirroring the backend's `_source` shape.
#[derive(Debug, Serialize)]
pub struct KeywordHit {
    #[serde(rename = "_id")]
    pub id: String,
    pub score: f32,
    #[serde(flatten)]
    pub product: Product,
}

#[derive(Debug, Deserialize)]
pub struct SuggestParams {
    pub query: String,
    pub category: Option<String>,
}

/// Semantic/recommendation hit: record nested under `product`.
#[derive(Debug, Serialize)]
pub struct ScoredHit {
    #[serde(rename = "_id")]
    pub id: String,
    pub product: Product,
    pub score: f32,
}

impl From<SearchHit> for ScoredHit {
    fn from(hit: SearchHit) -> Self {
        Self {
            id: hit.id,
            product: hit.product,
            score: hit.score,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ListingParams {
    pub category: Option<String>,
    pub page: Option<u32>,
    pub size: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct ListingResponse {
    pub page: u32,
    pub size: u32,
    pub total: u64,
    pub data: Vec<Product>,
}

#[derive(Debug, Serialize)]
pub struct RecommendResponse {
    pub original_product: Product,
    pub recommendations: Vec<ScoredHit>,
}

// --- validation ---

fn validate_size(size: Option<u32>) -> Result<u32, HttpError> {
    let size = size.unwrap_or(DEFAULT_PAGE_SIZE);
    if size == 0 || size > MAX_PAGE_SIZE {
        return Err(HttpError::BadRequest(format!(
            "size must be between 1 and {MAX_PAGE_SIZE}"
        )));
    }
    Ok(size)
}

fn validate_page(page: Option<u32>) -> Result<u32, HttpError> {
    let page = page.unwrap_or(1);
    if page == 0 {
        return Err(HttpError::BadRequest("page must be at least 1".to_string()));
    }
    Ok(page)
}

fn validate_query_text(text: &str) -> Result<(), HttpError> {
    if text.is_empty() {
        return Err(HttpError::BadRequest("query must not be empty".to_string()));
    }
    Ok(())
}

/// Run one encode call off the event loop, bounded by the configured
/// timeout. On timeout the blocking task is abandoned, not joined.
async fn encode_off_loop(
    encoder: Arc<dyn TextEncoder>,
    timeout: Duration,
    text: String,
) -> Result<Vec<f32>, HttpError> {
    let task = tokio::task::spawn_blocking(move || encoder.encode(&text));

    match tokio::time::timeout(timeout, task).await {
        Err(_) => Err(HttpError::EncodeTimeout),
        Ok(Err(join_err)) => Err(HttpError::Internal(format!(
            "encoder task failed: {join_err}"
        ))),
        Ok(Ok(result)) => result.map_err(Into::into),
    }
}

// --- handlers ---

async fn root() -> Json<serde_json::Value> {
    Json(json!({"message": "rekko product search API"}))
}

async fn search_keyword(
    State(state): State<Arc<SharedState>>,
    Query(params): Query<KeywordParams>,
) -> Result<Json<Vec<KeywordHit>>, HttpError> {
    let size = validate_size(params.size)?;
    validate_query_text(&params.query)?;

    let tokens = query::tokenize(&params.query);
    if tokens.is_empty() {
        // nothing to match on, skip the backend round-trip entirely
        return Ok(Json(vec![]));
    }

    let hits = state
        .backend
        .keyword_search(&tokens, params.category.as_deref(), size)
        .await?;

    Ok(Json(
        hits.into_iter()
            .map(|hit| KeywordHit {
                id: hit.id,
                score: hit.score,
                product: hit.product,
            })
            .collect(),
    ))
}

async fn semantic_suggestions(
    State(state): State<Arc<SharedState>>,
    Query(params): Query<SuggestParams>,
) -> Result<Json<Vec<ScoredHit>>, HttpError> {
    validate_query_text(&params.query)?;

    let encoder = state.encoder.clone().ok_or(HttpError::EncoderUnavailable)?;

    let text = query::semantic_query_text(&params.query, params.category.as_deref());
    log::debug!("embedding suggestion query: {text:?}");

    let vector = encode_off_loop(encoder, state.encode_timeout, text).await?;

    // no category hard-filter: the fused query text alone steers the
    // search toward the category's neighborhood
    let hits = state.backend.knn_search(&vector, SUGGESTION_K, None).await?;

    Ok(Json(hits.into_iter().map(ScoredHit::from).collect()))
}

async fn list_products(
    State(state): State<Arc<SharedState>>,
    Query(params): Query<ListingParams>,
) -> Result<Json<ListingResponse>, HttpError> {
    let page = validate_page(params.page)?;
    let size = validate_size(params.size)?;
    let from = (page - 1).saturating_mul(size);

    let result = state
        .backend
        .list_products(params.category.as_deref(), from, size)
        .await?;

    Ok(Json(ListingResponse {
        page,
        size,
        total: result.total,
        data: result.data,
    }))
}

async fn recommend(
    State(state): State<Arc<SharedState>>,
    Path(id): Path<String>,
) -> Result<Json<RecommendResponse>, HttpError> {
    // the stored vector is used as-is, but recommendation is still a
    // semantic feature: without a loaded model it fails fast like
    // suggestions do
    if state.encoder.is_none() {
        return Err(HttpError::EncoderUnavailable);
    }

    let product = state
        .backend
        .get_product(&id)
        .await?
        .ok_or_else(|| HttpError::NotFound(id.clone()))?;

    let vector = product
        .embedding
        .clone()
        .ok_or_else(|| HttpError::MissingEmbedding(id.clone()))?;

    let hits = state
        .backend
        .knn_search(&vector, RECOMMEND_K, Some(&id))
        .await?;

    Ok(Json(RecommendResponse {
        original_product: product,
        recommendations: hits.into_iter().map(ScoredHit::from).collect(),
    }))
}

async fn categories(State(state): State<Arc<SharedState>>) -> Json<Vec<String>> {
    // non-critical path: degrade to an empty list instead of failing the
    // request, but never silently
    match state.backend.categories().await {
        Ok(categories) => Json(categories),
        Err(err) => {
            log::warn!("category aggregation failed, returning empty list: {err}");
            Json(vec![])
        }
    }
}
