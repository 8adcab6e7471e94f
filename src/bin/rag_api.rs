use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::extract::{ConnectInfo, Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use chrono::Utc;
use clap::{Parser, ValueEnum};
use ragline::{
    CachingEmbedder, ChromaStore, Chunker, ChunkerConfig, ChunkingReport, Embedder, GeminiEmbedder,
    GeminiGenerator, IngestionPipeline, MemoryStore, RagAnswer, RagEngine, RagError, RateLimiter,
    ResearchAssistant, VectorStore, DEFAULT_MAX_REQUESTS_PER_MINUTE,
};
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    name = "rag-api",
    about = "HTTP API for document ingestion and retrieval-augmented question answering"
)]
struct ApiCli {
    /// Address to bind the HTTP server to (host:port).
    #[arg(long, env = "RAGLINE_BIND", default_value = "127.0.0.1:8080")]
    bind: String,

    /// Gemini API key used for embeddings and generation.
    #[arg(long, env = "GEMINI_API_KEY")]
    gemini_api_key: String,

    /// Gemini embedding endpoint.
    #[arg(
        long,
        env = "RAGLINE_EMBED_ENDPOINT",
        default_value = "https://generativelanguage.googleapis.com/v1beta/models/text-embedding-004:embedContent"
    )]
    embed_endpoint: String,

    /// Gemini text generation endpoint.
    #[arg(
        long,
        env = "RAGLINE_GENERATE_ENDPOINT",
        default_value = "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash:generateContent"
    )]
    generate_endpoint: String,

    /// Seconds before Gemini requests time out.
    #[arg(long, env = "RAGLINE_GEMINI_TIMEOUT_SECS", default_value_t = 60)]
    gemini_timeout_secs: u64,

    /// Vector store backend.
    #[arg(long, env = "RAGLINE_STORE", value_enum, default_value_t = StoreBackend::Memory)]
    store: StoreBackend,

    /// ChromaDB base URL (chroma backend only).
    #[arg(long, env = "CHROMA_URL", default_value = "http://localhost:8000")]
    chroma_url: String,

    /// Collection holding the embedded chunks.
    #[arg(long, env = "RAGLINE_COLLECTION", default_value = "documents")]
    collection: String,

    /// Maximum chunk size in characters.
    #[arg(long, env = "RAGLINE_MAX_CHUNK_SIZE", default_value_t = 500)]
    max_chunk_size: usize,

    /// Overlap carried between consecutive chunks, in characters.
    #[arg(long, env = "RAGLINE_OVERLAP_SIZE", default_value_t = 50)]
    overlap_size: usize,

    /// Maximum search results allowed per request.
    #[arg(long, default_value_t = 20)]
    max_top_k: usize,

    /// Requests per minute allowed per client (0 disables rate limiting).
    #[arg(long, default_value_t = DEFAULT_MAX_REQUESTS_PER_MINUTE)]
    max_requests_per_minute: u32,

    /// Max cached query embeddings kept in-memory (0 disables caching).
    #[arg(long, default_value_t = 256)]
    embedding_cache_size: usize,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum StoreBackend {
    /// Brute-force in-memory store, lost on restart.
    Memory,
    /// Remote ChromaDB collection.
    Chroma,
}

#[derive(Clone)]
struct AppState {
    pipeline: Arc<IngestionPipeline>,
    engine: Arc<RagEngine>,
    research: Arc<ResearchAssistant>,
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    chunker: Chunker,
    rate_limiter: Option<Arc<RateLimiter>>,
    collection: String,
    backend: &'static str,
    max_top_k: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().init();
    let cli = ApiCli::parse();

    let gemini_timeout = Duration::from_secs(cli.gemini_timeout_secs.max(1));
    let base_embedder: Arc<dyn Embedder> = Arc::new(GeminiEmbedder::new(
        cli.gemini_api_key.clone(),
        cli.embed_endpoint,
        gemini_timeout,
    )?);
    let embedder: Arc<dyn Embedder> =
        match CachingEmbedder::new(base_embedder.clone(), cli.embedding_cache_size) {
            Some(cached) => Arc::new(cached),
            None => base_embedder,
        };
    let generator = Arc::new(GeminiGenerator::new(
        cli.gemini_api_key,
        cli.generate_endpoint,
        gemini_timeout,
    )?);

    let (store, backend): (Arc<dyn VectorStore>, &'static str) = match cli.store {
        StoreBackend::Memory => (Arc::new(MemoryStore::new()), "memory"),
        StoreBackend::Chroma => (
            Arc::new(ChromaStore::new(&cli.chroma_url, &cli.collection)?),
            "chroma",
        ),
    };

    let chunker = Chunker::new(ChunkerConfig {
        max_chunk_size: cli.max_chunk_size.max(1),
        overlap_size: cli.overlap_size,
    });
    let state = AppState {
        pipeline: Arc::new(IngestionPipeline::new(
            chunker,
            embedder.clone(),
            store.clone(),
        )),
        engine: Arc::new(RagEngine::new(
            embedder.clone(),
            store.clone(),
            generator.clone(),
        )),
        research: Arc::new(ResearchAssistant::new(generator)),
        store,
        embedder,
        chunker,
        rate_limiter: (cli.max_requests_per_minute > 0)
            .then(|| Arc::new(RateLimiter::new(cli.max_requests_per_minute))),
        collection: cli.collection,
        backend,
        max_top_k: cli.max_top_k.max(1),
    };

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/v1/documents", post(add_document))
        .route("/v1/documents/:id", delete(delete_document))
        .route("/v1/documents/chunking-preview", post(chunking_preview))
        .route("/v1/ask", post(ask))
        .route("/v1/search", get(search))
        .route("/v1/stats", get(stats))
        .route("/v1/research/:topic", get(research))
        .route("/v1/summarize", post(summarize))
        .with_state(state);

    let addr: SocketAddr = cli
        .bind
        .parse()
        .with_context(|| format!("invalid bind address {}", cli.bind))?;
    info!(%addr, "rag-api listening");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("server shutdown")?;
    Ok(())
}

type ApiError = (StatusCode, Json<ErrorBody>);

#[derive(Debug, Serialize)]
struct ErrorBody {
    message: String,
}

fn error_response(err: RagError) -> ApiError {
    let status = match &err {
        RagError::Validation(_) => StatusCode::BAD_REQUEST,
        RagError::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
        RagError::Embedding(_) | RagError::Generation(_) | RagError::Storage(_) => {
            StatusCode::BAD_GATEWAY
        }
        RagError::DimensionMismatch { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(ErrorBody {
            message: err.to_string(),
        }),
    )
}

fn check_rate_limit(state: &AppState, addr: &SocketAddr) -> Result<(), ApiError> {
    if let Some(limiter) = &state.rate_limiter {
        limiter
            .check_and_consume(&addr.ip().to_string())
            .map_err(error_response)?;
    }
    Ok(())
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

#[derive(Debug, Deserialize)]
struct AddDocumentRequest {
    title: String,
    content: String,
    #[serde(default)]
    source: Option<String>,
}

#[derive(Debug, Serialize)]
struct AddDocumentResponse {
    chunk_ids: Vec<String>,
    chunks_created: usize,
}

async fn add_document(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(request): Json<AddDocumentRequest>,
) -> Result<Json<AddDocumentResponse>, ApiError> {
    check_rate_limit(&state, &addr)?;
    let source = request.source.as_deref().unwrap_or("manual");
    let chunk_ids = state
        .pipeline
        .ingest(&request.title, &request.content, source)
        .await
        .map_err(error_response)?;
    let chunks_created = chunk_ids.len();
    Ok(Json(AddDocumentResponse {
        chunk_ids,
        chunks_created,
    }))
}

async fn delete_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if state.store.delete(&id).await.map_err(error_response)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err((
            StatusCode::NOT_FOUND,
            Json(ErrorBody {
                message: format!("no chunk with id {id}"),
            }),
        ))
    }
}

#[derive(Debug, Deserialize)]
struct ChunkingPreviewRequest {
    content: String,
}

async fn chunking_preview(
    State(state): State<AppState>,
    Json(request): Json<ChunkingPreviewRequest>,
) -> Json<ChunkingReport> {
    Json(state.chunker.report(&request.content))
}

#[derive(Debug, Deserialize)]
struct AskRequest {
    question: String,
}

async fn ask(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(request): Json<AskRequest>,
) -> Result<Json<RagAnswer>, ApiError> {
    check_rate_limit(&state, &addr)?;
    let answer = state
        .engine
        .answer(&request.question)
        .await
        .map_err(error_response)?;
    Ok(Json(answer))
}

#[derive(Debug, Deserialize)]
struct SearchParams {
    query: String,
    #[serde(default)]
    limit: Option<usize>,
}

#[derive(Debug, Serialize)]
struct SearchHit {
    id: String,
    title: String,
    source: String,
    text: String,
    score: f64,
}

#[derive(Debug, Serialize)]
struct SearchResponse {
    hits: Vec<SearchHit>,
}

async fn search(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>, ApiError> {
    check_rate_limit(&state, &addr)?;
    if params.query.trim().is_empty() {
        return Err(error_response(RagError::Validation(
            "query must not be empty".into(),
        )));
    }
    let top_k = params.limit.unwrap_or(5).clamp(1, state.max_top_k);
    let embedding = state
        .embedder
        .embed(params.query.trim())
        .await
        .map_err(error_response)?;
    let results = state
        .store
        .search(&embedding, top_k)
        .await
        .map_err(error_response)?;
    let hits = results
        .into_iter()
        .map(|hit| SearchHit {
            id: hit.chunk.id,
            title: hit.chunk.source_title,
            source: hit.chunk.source_tag,
            text: hit.chunk.text,
            score: hit.score,
        })
        .collect();
    Ok(Json(SearchResponse { hits }))
}

#[derive(Debug, Serialize)]
struct StatsResponse {
    status: &'static str,
    backend: &'static str,
    collection: String,
    total_chunks: usize,
    timestamp: String,
}

async fn stats(State(state): State<AppState>) -> Result<Json<StatsResponse>, ApiError> {
    let total_chunks = state.store.count().await.map_err(error_response)?;
    Ok(Json(StatsResponse {
        status: "UP",
        backend: state.backend,
        collection: state.collection.clone(),
        total_chunks,
        timestamp: Utc::now().to_rfc3339(),
    }))
}

#[derive(Debug, Serialize)]
struct ResearchResponse {
    topic: String,
    research: String,
    generated_at: String,
}

async fn research(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Path(topic): Path<String>,
) -> Result<Json<ResearchResponse>, ApiError> {
    check_rate_limit(&state, &addr)?;
    let result = state
        .research
        .research_topic(&topic)
        .await
        .map_err(error_response)?;
    Ok(Json(ResearchResponse {
        topic,
        research: result,
        generated_at: Utc::now().to_rfc3339(),
    }))
}

#[derive(Debug, Deserialize)]
struct SummarizeRequest {
    content: String,
}

#[derive(Debug, Serialize)]
struct SummarizeResponse {
    summary: String,
    original_length: usize,
    generated_at: String,
}

async fn summarize(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(request): Json<SummarizeRequest>,
) -> Result<Json<SummarizeResponse>, ApiError> {
    check_rate_limit(&state, &addr)?;
    let summary = state
        .research
        .summarize(&request.content)
        .await
        .map_err(error_response)?;
    Ok(Json(SummarizeResponse {
        summary,
        original_length: request.content.len(),
        generated_at: Utc::now().to_rfc3339(),
    }))
}
