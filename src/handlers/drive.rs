use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, Multipart, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde::Deserialize;
use tokio::time::{timeout, Duration};

use crate::{
    error::{AppError, Result},
    models::session::AuthenticatedSession,
    services::drive::{self as drive_service, ListTarget},
    state::AppState,
    validation::drive::*,
};

const UPLOAD_TIMEOUT: u64 = 300;

/// The query parameters for listing a folder.
#[derive(Deserialize, Debug)]
pub struct ListFilesQuery {
    pub id: Option<String>,
    pub path: Option<String>,
}

/// The request payload for creating a folder.
#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CreateFolderRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub parent_id: Option<String>,
}

/// The request payload for renaming an item.
#[derive(Deserialize, Debug)]
pub struct RenameRequest {
    #[serde(default)]
    pub name: Option<String>,
}

/// The request payload for sharing an item.
#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ShareRequest {
    #[serde(default)]
    pub item_id: Option<String>,
    #[serde(default)]
    pub emails: Vec<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Relays a Graph JSON body with the given status.
fn relay(status: StatusCode, body: Bytes) -> Response {
    (status, [(header::CONTENT_TYPE, "application/json")], body).into_response()
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Lists the children of the root, a folder item or a folder path.
#[axum::debug_handler]
pub async fn list_files(
    State(state): State<AppState>,
    Extension(session): Extension<AuthenticatedSession>,
    Query(query): Query<ListFilesQuery>,
) -> Result<Response> {
    let target = ListTarget::from_query(query.id, query.path);
    match &target {
        ListTarget::Item(id) => validate_item_id(id)?,
        ListTarget::Path(path) => validate_drive_path(path)?,
        ListTarget::Root => {}
    }

    let listing = drive_service::list_children(&state, session.id, &target).await?;

    Ok(relay(StatusCode::OK, listing.body))
}

/// Lists items shared with the user.
#[axum::debug_handler]
pub async fn list_shared(
    State(state): State<AppState>,
    Extension(session): Extension<AuthenticatedSession>,
) -> Result<Response> {
    let shared = drive_service::list_shared(&state, session.id).await?;
    Ok(relay(StatusCode::OK, shared.body))
}

/// Creates a new folder.
#[axum::debug_handler]
pub async fn create_folder(
    State(state): State<AppState>,
    Extension(session): Extension<AuthenticatedSession>,
    payload: std::result::Result<Json<CreateFolderRequest>, JsonRejection>,
) -> Result<Response> {
    let Json(req) = payload?;
    let name = req.name.map(|n| n.trim().to_string()).unwrap_or_default();
    validate_name(&name, "Folder name is required")?;

    let parent_id = non_empty(req.parent_id);
    if let Some(parent_id) = &parent_id {
        validate_item_id(parent_id)?;
    }

    let folder =
        drive_service::create_folder(&state, session.id, &name, parent_id.as_deref()).await?;

    Ok(relay(StatusCode::CREATED, folder.body))
}

/// Uploads a file sent as multipart form data.
///
/// Fields: `file` (required), `parentId` and `path` (optional target folder).
#[axum::debug_handler]
pub async fn upload_file(
    State(state): State<AppState>,
    Extension(session): Extension<AuthenticatedSession>,
    mut multipart: Multipart,
) -> Result<Response> {
    let mut file: Option<(String, Option<String>, Bytes)> = None;
    let mut parent_id: Option<String> = None;
    let mut path: Option<String> = None;

    let timeout_duration = Duration::from_secs(UPLOAD_TIMEOUT);

    loop {
        match timeout(timeout_duration, multipart.next_field()).await {
            Ok(Ok(Some(field))) => {
                let field_name = field.name().unwrap_or("").to_string();
                match field_name.as_str() {
                    "file" => {
                        let file_name = field.file_name().unwrap_or("").trim().to_string();
                        let content_type = field.content_type().map(str::to_string);
                        let data = field
                            .bytes()
                            .await
                            .map_err(|e| AppError::Multipart(format!("file: {}", e)))?;
                        file = Some((file_name, content_type, data));
                    }
                    "parentId" => {
                        parent_id = non_empty(Some(
                            field
                                .text()
                                .await
                                .map_err(|e| AppError::Multipart(format!("parentId: {}", e)))?,
                        ));
                    }
                    "path" => {
                        path = non_empty(Some(
                            field
                                .text()
                                .await
                                .map_err(|e| AppError::Multipart(format!("path: {}", e)))?,
                        ));
                    }
                    _ => {}
                }
            }
            Ok(Ok(None)) => break,
            Ok(Err(e)) => {
                return Err(AppError::Multipart(format!("Parse error: {}", e)));
            }
            Err(_) => return Err(AppError::Multipart("Upload timeout exceeded".into())),
        }
    }

    let (file_name, declared_type, data) =
        file.ok_or_else(|| AppError::Validation("No file uploaded".to_string()))?;
    validate_name(&file_name, "No file uploaded")?;
    if let Some(parent_id) = &parent_id {
        validate_item_id(parent_id)?;
    }
    if let Some(path) = &path {
        validate_drive_path(path)?;
    }

    let content_type = declared_type
        .filter(|t| !t.is_empty() && t != "application/octet-stream")
        .or_else(|| infer::get(&data).map(|kind| kind.mime_type().to_string()))
        .unwrap_or_else(|| "application/octet-stream".to_string());

    tracing::debug!(
        "📋 Parsed upload - name length: {}, size: {} bytes, type: {}",
        file_name.len(),
        data.len(),
        content_type
    );

    let stored = drive_service::upload(
        &state,
        session.id,
        &file_name,
        data,
        content_type,
        parent_id.as_deref(),
        path.as_deref(),
    )
    .await?;

    Ok(relay(StatusCode::CREATED, stored.body))
}

/// Renames an item.
#[axum::debug_handler]
pub async fn rename_item(
    State(state): State<AppState>,
    Extension(session): Extension<AuthenticatedSession>,
    Path(item_id): Path<String>,
    payload: std::result::Result<Json<RenameRequest>, JsonRejection>,
) -> Result<Response> {
    let Json(req) = payload?;
    validate_item_id(&item_id)?;
    let name = req.name.map(|n| n.trim().to_string()).unwrap_or_default();
    validate_name(&name, "New name is required")?;

    let renamed = drive_service::rename(&state, session.id, &item_id, &name).await?;

    Ok(relay(StatusCode::OK, renamed.body))
}

/// Deletes an item.
#[axum::debug_handler]
pub async fn delete_item(
    State(state): State<AppState>,
    Extension(session): Extension<AuthenticatedSession>,
    Path(item_id): Path<String>,
) -> Result<Response> {
    validate_item_id(&item_id)?;
    drive_service::delete(&state, session.id, &item_id).await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

/// Invites people to an item.
#[axum::debug_handler]
pub async fn share_item(
    State(state): State<AppState>,
    Extension(session): Extension<AuthenticatedSession>,
    payload: std::result::Result<Json<ShareRequest>, JsonRejection>,
) -> Result<Response> {
    let Json(req) = payload?;
    let item_id = non_empty(req.item_id);
    validate_share(item_id.as_deref(), &req.emails)?;
    let item_id = item_id.unwrap_or_default();

    let role = drive_service::permission_role(req.role.as_deref());
    let message = req.message.unwrap_or_default();

    let invited = drive_service::share(
        &state,
        session.id,
        &item_id,
        &req.emails,
        role,
        &message,
    )
    .await?;

    Ok(relay(StatusCode::OK, invited.body))
}
