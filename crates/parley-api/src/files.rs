use axum::{
    Extension, Json,
    body::Bytes,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::IntoResponse,
};
use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use tracing::error;
use uuid::Uuid;

use parley_types::api::{Claims, UploadResponse};

use crate::auth::AppState;
use crate::blocking;
use crate::error::ApiError;

/// 50 MB upload limit for attachment files
const MAX_FILE_SIZE: usize = 50 * 1024 * 1024;

#[derive(Debug, Deserialize)]
pub struct UploadQuery {
    pub name: String,
    #[serde(default = "default_mime")]
    pub mime_type: String,
}

fn default_mime() -> String {
    "application/octet-stream".into()
}

/// POST /files — accepts raw bytes, saves them under the upload dir,
/// inserts a metadata row, and returns the URL to reference from a
/// message attachment.
pub async fn upload_file(
    State(state): State<AppState>,
    Query(query): Query<UploadQuery>,
    Extension(claims): Extension<Claims>,
    bytes: Bytes,
) -> Result<(StatusCode, Json<UploadResponse>), ApiError> {
    if bytes.is_empty() {
        return Err(ApiError::Validation("file is empty".into()));
    }
    if bytes.len() > MAX_FILE_SIZE {
        return Err(ApiError::Validation("file exceeds the 50 MB limit".into()));
    }
    if query.name.is_empty() {
        return Err(ApiError::Validation("file name is required".into()));
    }

    let file_id = Uuid::new_v4().to_string();
    let size = bytes.len() as i64;

    tokio::fs::create_dir_all(&state.upload_dir).await.map_err(|e| {
        error!("Failed to create upload dir: {}", e);
        ApiError::Internal
    })?;

    let file_path = state.upload_dir.join(&file_id);
    let mut file = tokio::fs::File::create(&file_path).await.map_err(|e| {
        error!("Failed to create file {}: {}", file_path.display(), e);
        ApiError::Internal
    })?;
    file.write_all(&bytes).await.map_err(|e| {
        error!("Failed to write file {}: {}", file_path.display(), e);
        ApiError::Internal
    })?;

    let db = state.clone();
    let fid = file_id.clone();
    let owner = claims.sub.to_string();
    let name = query.name.clone();
    let mime = query.mime_type.clone();
    blocking(move || db.db.insert_file(&fid, &owner, &name, &mime, size)).await?;

    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            url: format!("/files/{file_id}"),
            file_id,
            name: query.name,
            mime_type: query.mime_type,
            size: size as u64,
        }),
    ))
}

/// GET /files/{file_id} — streams the stored blob back with its mime type.
pub async fn download_file(
    State(state): State<AppState>,
    Path(file_id): Path<String>,
    Extension(_claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    // Valid UUID ids only; also rules out path traversal.
    file_id
        .parse::<Uuid>()
        .map_err(|_| ApiError::Validation("invalid file id".into()))?;

    let db = state.clone();
    let fid = file_id.clone();
    let row = blocking(move || db.db.get_file(&fid))
        .await?
        .ok_or(ApiError::NotFound)?;

    let file_path = state.upload_dir.join(&file_id);
    let bytes = tokio::fs::read(&file_path).await.map_err(|e| {
        error!("Failed to read file {}: {}", file_path.display(), e);
        ApiError::NotFound
    })?;

    Ok(([(header::CONTENT_TYPE, row.mime_type)], bytes))
}
