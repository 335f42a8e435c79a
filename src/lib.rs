pub mod api;
pub mod config;
pub mod error;
pub mod handlers;
pub mod infrastructure;
pub mod models;
pub mod services;
pub mod utils;

pub use crate::config::{AdapterConfig, ClientOptions, RequestOverrides, UploadOptions};
pub use crate::error::{AdapterError, Result};
pub use crate::models::{ProgressEvent, SignedOperation, UploadRequest, UploadResult};
pub use crate::services::adapter::Adapter;
pub use crate::services::uploader::Uploader;

use axum::{
    Router,
    routing::{get, post},
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::files::upload_files,
        handlers::files::list_files,
        handlers::files::download_file,
        handlers::files::delete_file,
        handlers::files::signed_url,
    ),
    components(
        schemas(
            handlers::files::UploadedFile,
            handlers::files::UploadResponse,
            handlers::files::ListResponse,
            handlers::files::SignedUrlResponse,
        )
    ),
    tags(
        (name = "files", description = "Object storage endpoints")
    )
)]
pub struct ApiDoc;

#[derive(Clone)]
pub struct AppState {
    pub adapter: Adapter,
}

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/upload", post(handlers::files::upload_files))
        .route("/files", get(handlers::files::list_files))
        .route(
            "/files/*key",
            get(handlers::files::download_file).delete(handlers::files::delete_file),
        )
        .route("/signed-url", get(handlers::files::signed_url))
        .with_state(state)
}
