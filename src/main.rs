//! Depot file storage REST API.
//!
//! HTTP surface over [`depot_store`]: upload, update, delete, copy, list
//! and download files kept under a local storage root, look names up by
//! content hash, and count words across the whole store.
//!
//! Storage paths and the listen address come from the environment,
//! resolved once at startup. A corrupt metadata record file aborts startup
//! rather than serving from an index that would overwrite records it could
//! not read.

use std::sync::Arc;

use axum::{
    Router,
    body::Bytes,
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Json, Response},
    routing::{delete, get, post, put},
};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::{OpenApi, ToSchema};
use utoipa_swagger_ui::SwaggerUi;

use depot_store::{FileStore, StoreConfig, StoreError};

/// Listen address used when `DEPOT_ADDR` is not set.
const DEFAULT_ADDR: &str = "0.0.0.0:8080";

/// Upper bound on request bodies, uploads included.
const MAX_BODY_BYTES: usize = 64 * 1024 * 1024;

/// Sentinel returned by `/findMatchingFile` when no stored file matches.
const UNMATCHED: &str = "unmatched";

/// Application state shared across REST API handlers
///
/// Holds the file store every endpoint operates on.
#[derive(Clone)]
struct AppState {
    store: Arc<FileStore>,
}

/// Health check response.
#[derive(Serialize, ToSchema)]
struct HealthRes {
    ok: bool,
    message: String,
}

/// Hash lookup response.
#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
struct MatchRes {
    /// Name of the first matching file, or `"unmatched"`.
    matching_file_name: String,
}

/// Word count response.
#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
struct WordCountRes {
    total_words: u64,
}

#[derive(Deserialize)]
struct FindMatchingFileParams {
    hash: Option<String>,
}

#[derive(Deserialize)]
struct CopyFileParams {
    src: String,
    dest: String,
    hashstring: Option<String>,
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health,
        upload,
        update,
        delete_file,
        list_files,
        find_matching_file,
        copy_file,
        word_count,
        download
    ),
    components(schemas(HealthRes, MatchRes, WordCountRes))
)]
struct ApiDoc;

/// Main entry point for the Depot file storage server
///
/// Opens the store, then serves the REST API until the process is stopped.
///
/// # Environment Variables
/// - `DEPOT_ADDR`: listen address (default: "0.0.0.0:8080")
/// - `DEPOT_DATA_DIR`: storage root for uploaded files (default: "./uploads")
/// - `DEPOT_METADATA_DIR`: directory for the hash record file (default: "./metadata")
///
/// # Returns
/// * `Ok(())` - If the server runs to completion
/// * `Err(anyhow::Error)` - If startup or serving fails, including a
///   metadata record file that exists but cannot be parsed
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("depot_run=info".parse()?)
                .add_directive("depot_store=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let addr = std::env::var("DEPOT_ADDR").unwrap_or_else(|_| DEFAULT_ADDR.into());
    let data_dir =
        std::env::var("DEPOT_DATA_DIR").unwrap_or_else(|_| depot_store::DEFAULT_DATA_DIR.into());
    let metadata_dir = std::env::var("DEPOT_METADATA_DIR")
        .unwrap_or_else(|_| depot_store::DEFAULT_METADATA_DIR.into());

    let store = FileStore::open(StoreConfig::new(&data_dir, &metadata_dir)?)?;
    tracing::info!(
        "++ Depot store opened with {} indexed file(s) under {}",
        store.snapshot().len(),
        data_dir
    );
    tracing::info!("++ Starting Depot REST on {}", addr);

    let app = Router::new()
        .route("/health", get(health))
        .route("/upload", post(upload))
        .route("/update/*name", put(update))
        .route("/delete/*name", delete(delete_file))
        .route("/list", get(list_files))
        .route("/findMatchingFile", get(find_matching_file))
        .route("/copyFile", get(copy_file).post(copy_file))
        .route("/wordCount", get(word_count))
        .route("/files/*name", get(download))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(CorsLayer::permissive())
        .with_state(AppState {
            store: Arc::new(store),
        });

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Health check response", body = HealthRes)
    )
)]
/// Health check endpoint for the REST API
///
/// Used for monitoring and load balancer health checks.
#[axum::debug_handler]
async fn health(State(_state): State<AppState>) -> Json<HealthRes> {
    Json(HealthRes {
        ok: true,
        message: "Depot file store is running".to_owned(),
    })
}

#[utoipa::path(
    post,
    path = "/upload",
    responses(
        (status = 200, description = "File stored and indexed", body = String),
        (status = 400, description = "Malformed upload form or invalid file name"),
        (status = 409, description = "A file with that name already exists"),
        (status = 500, description = "Failed to store or index the file")
    )
)]
/// Store a new file from a multipart form
///
/// The `file` part carries the content and its filename becomes the storage
/// name. An optional `hash` part is recorded as the content hash; when it is
/// absent the server computes a sha-256 digest of the uploaded bytes.
///
/// # Returns
/// * `Ok(String)` - Confirmation message naming the stored file
/// * `Err((StatusCode, &str))` - Bad request, name conflict or server error
#[axum::debug_handler]
async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<String, (StatusCode, &'static str)> {
    let mut file: Option<(String, Bytes)> = None;
    let mut supplied_hash: Option<String> = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        tracing::error!("Error reading multipart form: {:?}", e);
        (StatusCode::BAD_REQUEST, "Error retrieving file from form")
    })? {
        let field_name = field.name().map(str::to_owned);
        match field_name.as_deref() {
            Some("file") => {
                let file_name = field.file_name().unwrap_or_default().to_owned();
                let bytes = field.bytes().await.map_err(|e| {
                    tracing::error!("Error reading upload content: {:?}", e);
                    (StatusCode::BAD_REQUEST, "Error retrieving file from form")
                })?;
                file = Some((file_name, bytes));
            }
            Some("hash") => {
                let text = field.text().await.map_err(|e| {
                    tracing::error!("Error reading hash field: {:?}", e);
                    (StatusCode::BAD_REQUEST, "Error retrieving hash from form")
                })?;
                supplied_hash = Some(text);
            }
            _ => {}
        }
    }

    let Some((name, bytes)) = file else {
        return Err((StatusCode::BAD_REQUEST, "Error retrieving file from form"));
    };

    match state
        .store
        .upload(&name, bytes.as_ref(), supplied_hash.as_deref())
    {
        Ok(hash) => {
            tracing::info!("Stored '{}' ({} bytes, hash {})", name, bytes.len(), hash);
            Ok(format!("File '{}' uploaded successfully.", name))
        }
        Err(StoreError::Conflict(_)) => Err((StatusCode::CONFLICT, "Error adding file to server")),
        Err(StoreError::InvalidName(_)) => Err((StatusCode::BAD_REQUEST, "Invalid file name")),
        Err(e) => {
            tracing::error!("Error storing '{}': {:?}", name, e);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                "Error adding file to server",
            ))
        }
    }
}

#[utoipa::path(
    put,
    path = "/update/{name}",
    request_body(content = String, description = "Replacement file content"),
    responses(
        (status = 200, description = "File content replaced and re-indexed", body = String),
        (status = 400, description = "Invalid file name"),
        (status = 404, description = "No file could be opened at that name"),
        (status = 500, description = "Failed to write or re-index the file")
    )
)]
/// Overwrite the content of a stored file, creating it if absent
///
/// The recorded hash is recomputed server-side from the new content, so the
/// index always describes the bytes on disk.
#[axum::debug_handler]
async fn update(
    State(state): State<AppState>,
    Path(name): Path<String>,
    body: Bytes,
) -> Result<String, (StatusCode, &'static str)> {
    match state.store.update(&name, body.as_ref()) {
        Ok(_) => Ok(format!("File '{}' updated successfully.", name)),
        Err(StoreError::NotFound(_)) => Err((StatusCode::NOT_FOUND, "File not found")),
        Err(StoreError::InvalidName(_)) => Err((StatusCode::BAD_REQUEST, "Invalid file name")),
        Err(e) => {
            tracing::error!("Error updating '{}': {:?}", name, e);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                "Error updating file on server",
            ))
        }
    }
}

#[utoipa::path(
    delete,
    path = "/delete/{name}",
    responses(
        (status = 200, description = "File and index record removed", body = String),
        (status = 400, description = "Invalid file name"),
        (status = 500, description = "File missing or removal failed")
    )
)]
/// Remove a stored file and its index record
#[axum::debug_handler]
async fn delete_file(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<String, (StatusCode, &'static str)> {
    match state.store.delete(&name) {
        Ok(()) => Ok(format!("File '{}' deleted successfully.", name)),
        Err(StoreError::InvalidName(_)) => Err((StatusCode::BAD_REQUEST, "Invalid file name")),
        Err(e) => {
            tracing::error!("Error deleting '{}': {:?}", name, e);
            Err((StatusCode::INTERNAL_SERVER_ERROR, "Error deleting file"))
        }
    }
}

#[utoipa::path(
    get,
    path = "/list",
    responses(
        (status = 200, description = "Newline-separated file paths", body = String),
        (status = 500, description = "Failed to walk the storage root")
    )
)]
/// List every stored file, one storage-relative path per line
#[axum::debug_handler]
async fn list_files(State(state): State<AppState>) -> Result<String, (StatusCode, &'static str)> {
    match state.store.list() {
        Ok(files) => {
            let mut body = files.join("\n");
            if !body.is_empty() {
                body.push('\n');
            }
            Ok(body)
        }
        Err(e) => {
            tracing::error!("Error listing files: {:?}", e);
            Err((StatusCode::INTERNAL_SERVER_ERROR, "Error listing files"))
        }
    }
}

#[utoipa::path(
    get,
    path = "/findMatchingFile",
    responses(
        (status = 200, description = "Matching file name or 'unmatched'", body = MatchRes)
    )
)]
/// Look a content hash up in the index
///
/// Ties between files with identical content resolve to the earliest
/// surviving record.
#[axum::debug_handler]
async fn find_matching_file(
    State(state): State<AppState>,
    Query(params): Query<FindMatchingFileParams>,
) -> Json<MatchRes> {
    let hash = params.hash.unwrap_or_default();
    let matching_file_name = match state.store.find_match(&hash) {
        Some(name) => {
            tracing::debug!("File with matching content identified: {}", name);
            name
        }
        None => UNMATCHED.to_owned(),
    };
    Json(MatchRes { matching_file_name })
}

#[utoipa::path(
    get,
    path = "/copyFile",
    responses(
        (status = 200, description = "File duplicated and destination indexed", body = String),
        (status = 400, description = "Invalid or identical file names"),
        (status = 500, description = "Source missing or copy failed")
    )
)]
/// Duplicate a stored file on the server
///
/// `src` and `dest` are storage-relative names. An optional `hashstring`
/// query parameter is recorded for the destination instead of the digest
/// computed from the copied bytes.
#[axum::debug_handler]
async fn copy_file(
    State(state): State<AppState>,
    Query(params): Query<CopyFileParams>,
) -> Result<String, (StatusCode, &'static str)> {
    match state
        .store
        .copy_file(&params.src, &params.dest, params.hashstring.as_deref())
    {
        Ok(_) => Ok("File saved by duplication at server successfully".to_owned()),
        Err(StoreError::InvalidName(_)) => Err((StatusCode::BAD_REQUEST, "Invalid file name")),
        Err(e) => {
            tracing::error!(
                "Error copying '{}' to '{}': {:?}",
                params.src,
                params.dest,
                e
            );
            Err((StatusCode::INTERNAL_SERVER_ERROR, "Error copying file"))
        }
    }
}

#[utoipa::path(
    get,
    path = "/wordCount",
    responses(
        (status = 200, description = "Total words across all stored files", body = WordCountRes),
        (status = 500, description = "Failed to read stored files")
    )
)]
/// Count words across everything in the store
#[axum::debug_handler]
async fn word_count(
    State(state): State<AppState>,
) -> Result<Json<WordCountRes>, (StatusCode, &'static str)> {
    match state.store.word_count() {
        Ok(total_words) => Ok(Json(WordCountRes { total_words })),
        Err(e) => {
            tracing::error!("Error counting words: {:?}", e);
            Err((StatusCode::INTERNAL_SERVER_ERROR, "Error counting words"))
        }
    }
}

#[utoipa::path(
    get,
    path = "/files/{name}",
    responses(
        (status = 200, description = "Raw file content"),
        (status = 400, description = "Invalid file name"),
        (status = 404, description = "File not found"),
        (status = 500, description = "Failed to read the file")
    )
)]
/// Serve the stored content of a file
#[axum::debug_handler]
async fn download(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Response, (StatusCode, &'static str)> {
    match state.store.read(&name) {
        Ok(bytes) => {
            Ok(([(header::CONTENT_TYPE, "application/octet-stream")], bytes).into_response())
        }
        Err(StoreError::NotFound(_)) => Err((StatusCode::NOT_FOUND, "File not found")),
        Err(StoreError::InvalidName(_)) => Err((StatusCode::BAD_REQUEST, "Invalid file name")),
        Err(e) => {
            tracing::error!("Error reading '{}': {:?}", name, e);
            Err((StatusCode::INTERNAL_SERVER_ERROR, "Error reading file"))
        }
    }
}
