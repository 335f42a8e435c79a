use crate::AppState;
use crate::api::error::AppError;
use crate::config::UploadOptions;
use crate::models::{SignedOperation, UploadRequest, UploadResult};
use crate::utils::key::content_type_for;
use axum::{
    Json,
    body::Body,
    extract::{Multipart, Path, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use futures::TryStreamExt;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use utoipa::ToSchema;

#[derive(Serialize, ToSchema)]
pub struct UploadedFile {
    pub key: String,
    pub content_type: String,
    pub digest: String,
    pub digest_algorithm: String,
    pub etag: String,
    pub size: u64,
}

impl From<UploadResult> for UploadedFile {
    fn from(result: UploadResult) -> Self {
        Self {
            key: result.key,
            content_type: result.content_type,
            digest: result.digest,
            digest_algorithm: result.digest_algorithm.as_str().to_string(),
            etag: result.etag,
            size: result.raw.size,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct UploadResponse {
    pub files: Vec<UploadedFile>,
}

#[derive(Serialize, ToSchema)]
pub struct ListResponse {
    pub keys: Vec<String>,
}

#[derive(Serialize, ToSchema)]
pub struct SignedUrlResponse {
    pub url: String,
    pub expires_in: u64,
}

#[derive(Deserialize)]
pub struct ListQuery {
    pub prefix: Option<String>,
}

#[derive(Deserialize)]
pub struct SignedUrlQuery {
    pub key: String,
    pub operation: Option<String>,
    pub expires_in: Option<u64>,
}

#[utoipa::path(
    post,
    path = "/upload",
    request_body(content = Multipart, description = "One or more files", content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Files uploaded successfully", body = UploadResponse),
        (status = 400, description = "No file provided or upload stream failed"),
        (status = 413, description = "File exceeds the configured size limit"),
        (status = 502, description = "Storage backend error")
    )
)]
pub async fn upload_files(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    let uploader = state.adapter.receive(UploadOptions::default());
    let mut files = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.to_string()))?
    {
        // Plain form fields carry no file.
        let Some(file_name) = field.file_name().map(str::to_string) else {
            continue;
        };

        let mut headers = HeaderMap::new();
        if let Some(value) = field
            .content_type()
            .and_then(|ct| HeaderValue::from_str(ct).ok())
        {
            headers.insert(header::CONTENT_TYPE, value);
        }

        let body = field.map_err(std::io::Error::other);
        let mut request = UploadRequest::new(body)
            .with_descriptor(file_name)
            .with_headers(headers);

        let result = uploader.upload(&mut request).await?;
        files.push(UploadedFile::from(result));
    }

    if files.is_empty() {
        return Err(AppError::BadRequest("No file provided".to_string()));
    }

    Ok(Json(UploadResponse { files }))
}

#[utoipa::path(
    get,
    path = "/files",
    params(
        ("prefix" = Option<String>, Query, description = "Directory to list, relative keys are returned")
    ),
    responses(
        (status = 200, description = "Keys under the prefix", body = ListResponse),
        (status = 502, description = "Storage backend error")
    )
)]
pub async fn list_files(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<ListResponse>, AppError> {
    let keys = state.adapter.ls(query.prefix.as_deref()).await?;
    Ok(Json(ListResponse { keys }))
}

#[utoipa::path(
    get,
    path = "/files/{key}",
    params(
        ("key" = String, Path, description = "Object key")
    ),
    responses(
        (status = 200, description = "File download stream"),
        (status = 404, description = "File not found")
    )
)]
pub async fn download_file(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Response, AppError> {
    let stream = state.adapter.read_stream(&key).await?;
    let body = Body::from_stream(stream);

    let headers = [
        (header::CONTENT_TYPE, content_type_for(&key)),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", attachment_name(&key)),
        ),
    ];

    Ok((headers, body).into_response())
}

/// ASCII-safe file name for `Content-Disposition`, taken from the last key
/// segment.
fn attachment_name(key: &str) -> String {
    let name = key
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .chars()
        .filter(|c| c.is_ascii() && !c.is_control() && *c != '"' && *c != '\\' && *c != ';')
        .take(64)
        .collect::<String>();

    if name.is_empty() {
        "file".to_string()
    } else {
        name
    }
}

#[utoipa::path(
    delete,
    path = "/files/{key}",
    params(
        ("key" = String, Path, description = "Object key")
    ),
    responses(
        (status = 204, description = "File removed"),
        (status = 502, description = "Storage backend error")
    )
)]
pub async fn delete_file(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<StatusCode, AppError> {
    state.adapter.rm(&key).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/signed-url",
    params(
        ("key" = String, Query, description = "Object key"),
        ("operation" = Option<String>, Query, description = "getObject (default), putObject or deleteObject"),
        ("expires_in" = Option<u64>, Query, description = "Lifetime in seconds")
    ),
    responses(
        (status = 200, description = "Presigned URL", body = SignedUrlResponse),
        (status = 400, description = "Unsupported operation or lifetime")
    )
)]
pub async fn signed_url(
    State(state): State<AppState>,
    Query(query): Query<SignedUrlQuery>,
) -> Result<Json<SignedUrlResponse>, AppError> {
    let operation = match query.operation.as_deref() {
        Some(op) => op.parse::<SignedOperation>()?,
        None => SignedOperation::GetObject,
    };
    let expires_in = query
        .expires_in
        .unwrap_or(state.adapter.config().signed_url_ttl.as_secs());

    let url = state
        .adapter
        .url(operation, &query.key, Some(Duration::from_secs(expires_in)))
        .await?;

    Ok(Json(SignedUrlResponse { url, expires_in }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attachment_name_strips_unsafe_characters() {
        assert_eq!(attachment_name("docs/report.csv"), "report.csv");
        assert_eq!(attachment_name("a/evil\";x=\"\r\n.txt"), "evilx=.txt");
        assert_eq!(attachment_name("dir/résumé.pdf"), "rsum.pdf");
        assert_eq!(attachment_name("dir/\"\"\""), "file");
        assert_eq!(attachment_name(&"x".repeat(100)).len(), 64);
    }
}
