//! Drive operations, each expressed as one forwarded Graph call.

use axum::body::Bytes;
use http::{Method, StatusCode};
use serde::Serialize;
use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    services::graph::{GraphRequest, GraphResponse},
    state::AppState,
    validation::drive::{validate_drive_path, validate_item_id},
};

/// Which folder's children to list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListTarget {
    Item(String),
    Path(String),
    Root,
}

impl ListTarget {
    /// Picks the target from the optional query parameters; `id` wins over `path`.
    pub fn from_query(id: Option<String>, path: Option<String>) -> Self {
        match (
            id.filter(|s| !s.is_empty()),
            path.filter(|s| !s.trim_matches('/').is_empty()),
        ) {
            (Some(id), _) => ListTarget::Item(id),
            (None, Some(path)) => ListTarget::Path(path),
            (None, None) => ListTarget::Root,
        }
    }
}

#[derive(Serialize)]
struct FolderFacet {}

#[derive(Serialize)]
struct NewFolder<'a> {
    name: &'a str,
    folder: FolderFacet,
    #[serde(rename = "@microsoft.graph.conflictBehavior")]
    conflict_behavior: &'a str,
}

#[derive(Serialize)]
struct Rename<'a> {
    name: &'a str,
}

#[derive(Serialize)]
struct Recipient<'a> {
    email: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Invite<'a> {
    recipients: Vec<Recipient<'a>>,
    require_sign_in: bool,
    send_invitation: bool,
    roles: [&'a str; 1],
    message: &'a str,
}

/// Percent-encodes one path component (spaces become `%20`, `/` is escaped).
pub fn encode_component(component: &str) -> String {
    url::form_urlencoded::byte_serialize(component.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}

/// Percent-encodes a slash-separated drive path, keeping the separators.
///
/// Fails on `.`/`..` segments, which URL parsing would resolve against the
/// Graph path this is embedded in.
pub fn encode_path(path: &str) -> Result<String> {
    validate_drive_path(path)?;
    Ok(path
        .split('/')
        .filter(|segment| !segment.is_empty())
        .map(encode_component)
        .collect::<Vec<_>>()
        .join("/"))
}

/// The Graph path listing the children of `target`.
pub fn children_path(target: &ListTarget) -> Result<String> {
    match target {
        ListTarget::Item(id) => {
            validate_item_id(id)?;
            Ok(format!("/me/drive/items/{}/children", id))
        }
        ListTarget::Path(path) => Ok(format!("/me/drive/root:/{}:/children", encode_path(path)?)),
        ListTarget::Root => Ok("/me/drive/root/children".to_string()),
    }
}

/// The Graph path receiving the content of an uploaded file.
///
/// A parent item wins over a path. A path gets the file name appended unless
/// it already ends with it.
pub fn upload_path(file_name: &str, parent_id: Option<&str>, path: Option<&str>) -> Result<String> {
    validate_drive_path(file_name)?;
    if file_name.contains('/') {
        return Err(AppError::Validation("Invalid file name".to_string()));
    }

    if let Some(parent_id) = parent_id {
        validate_item_id(parent_id)?;
        return Ok(format!(
            "/me/drive/items/{}:/{}:/content",
            parent_id,
            encode_component(file_name)
        ));
    }

    match path.map(|p| p.trim_matches('/')).filter(|p| !p.is_empty()) {
        Some(path) => {
            let already_named = path.rsplit('/').next() == Some(file_name);
            let full = if already_named {
                path.to_string()
            } else {
                format!("{}/{}", path, file_name)
            };
            Ok(format!("/me/drive/root:/{}:/content", encode_path(&full)?))
        }
        None => Ok(format!(
            "/me/drive/root:/{}:/content",
            encode_component(file_name)
        )),
    }
}

/// Maps a requested role onto a Graph invitation role.
pub fn permission_role(role: Option<&str>) -> &'static str {
    match role.map(|r| r.trim().to_ascii_lowercase()).as_deref() {
        Some("edit") | Some("write") => "write",
        _ => "read",
    }
}

/// Lists the children of a folder.
pub async fn list_children(
    state: &AppState,
    session_id: Uuid,
    target: &ListTarget,
) -> Result<GraphResponse> {
    let request = GraphRequest::get(state.graph.url(&children_path(target)?));
    state
        .graph
        .send(&session_id, &request)
        .await
        .map_err(|e| e.or_fallback("Failed to list files"))
}

/// Lists the items other people shared with the user.
pub async fn list_shared(state: &AppState, session_id: Uuid) -> Result<GraphResponse> {
    let request = GraphRequest::get(
        state
            .graph
            .url("/me/drive/sharedWithMe?allowexternal=true"),
    );
    state
        .graph
        .send(&session_id, &request)
        .await
        .map_err(|e| e.or_fallback("Failed to list shared items"))
}

/// Creates a folder, failing if the name is already taken.
///
/// # Arguments
///
/// * `state` - The application state.
/// * `session_id` - The session the call is made for.
/// * `name` - The folder name.
/// * `parent_id` - The parent item, or `None` for the drive root.
///
/// # Returns
///
/// The Graph response describing the new folder.
pub async fn create_folder(
    state: &AppState,
    session_id: Uuid,
    name: &str,
    parent_id: Option<&str>,
) -> Result<GraphResponse> {
    let path = match parent_id {
        Some(parent_id) => format!("/me/drive/items/{}/children", parent_id),
        None => "/me/drive/root/children".to_string(),
    };
    let body = NewFolder {
        name,
        folder: FolderFacet {},
        conflict_behavior: "fail",
    };
    let request = GraphRequest::json(Method::POST, state.graph.url(&path), &body)?;

    tracing::info!("📁 Creating folder for session {}", session_id);

    state
        .graph
        .send(&session_id, &request)
        .await
        .map_err(|e| e.or_fallback("Folder creation failed"))
}

/// Uploads a file in one request.
///
/// # Arguments
///
/// * `state` - The application state.
/// * `session_id` - The session the call is made for.
/// * `file_name` - The name the file gets in the drive.
/// * `content` - The file bytes.
/// * `content_type` - The MIME type sent along with the bytes.
/// * `parent_id` - Target folder item, takes precedence over `path`.
/// * `path` - Target folder path under the drive root.
///
/// # Returns
///
/// The Graph response describing the stored file.
pub async fn upload(
    state: &AppState,
    session_id: Uuid,
    file_name: &str,
    content: Bytes,
    content_type: String,
    parent_id: Option<&str>,
    path: Option<&str>,
) -> Result<GraphResponse> {
    let target = upload_path(file_name, parent_id, path)?;
    let size = content.len();
    let request = GraphRequest::put_content(state.graph.url(&target), content, content_type);

    tracing::info!(
        "📤 Uploading {} bytes for session {}",
        size,
        session_id
    );

    match state.graph.send(&session_id, &request).await {
        Err(AppError::Upstream { status, .. }) if status == StatusCode::CONFLICT => {
            Err(AppError::Conflict("File already exists".to_string()))
        }
        other => other.map_err(|e| e.or_fallback("Upload failed")),
    }
}

/// Renames an item.
pub async fn rename(
    state: &AppState,
    session_id: Uuid,
    item_id: &str,
    name: &str,
) -> Result<GraphResponse> {
    let url = state.graph.url(&format!("/me/drive/items/{}", item_id));
    let request = GraphRequest::json(Method::PATCH, url, &Rename { name })?;
    state
        .graph
        .send(&session_id, &request)
        .await
        .map_err(|e| e.or_fallback("Rename failed"))
}

/// Deletes an item.
pub async fn delete(state: &AppState, session_id: Uuid, item_id: &str) -> Result<()> {
    let url = state.graph.url(&format!("/me/drive/items/{}", item_id));
    state
        .graph
        .send(&session_id, &GraphRequest::delete(url))
        .await
        .map_err(|e| e.or_fallback("Delete failed"))?;

    tracing::info!("🗑️ Deleted item for session {}", session_id);
    Ok(())
}

/// Invites recipients to an item with the given role.
pub async fn share(
    state: &AppState,
    session_id: Uuid,
    item_id: &str,
    emails: &[String],
    role: &str,
    message: &str,
) -> Result<GraphResponse> {
    let body = Invite {
        recipients: emails
            .iter()
            .map(|e| e.trim())
            .filter(|e| !e.is_empty())
            .map(|email| Recipient { email })
            .collect(),
        require_sign_in: true,
        send_invitation: true,
        roles: [role],
        message,
    };
    let url = state
        .graph
        .url(&format!("/me/drive/items/{}/invite", item_id));
    let request = GraphRequest::json(Method::POST, url, &body)?;

    tracing::info!(
        "🤝 Sharing item with {} recipient(s) for session {}",
        body.recipients.len(),
        session_id
    );

    state
        .graph
        .send(&session_id, &request)
        .await
        .map_err(|e| e.or_fallback("Share failed"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::session::Session;
    use crate::test_support::{FakeProvider, GraphReply};
    use chrono::{Duration, Utc};

    async fn signed_in() -> (FakeProvider, AppState, Uuid) {
        let provider = FakeProvider::start().await;
        let state = AppState::new(&provider.config()).unwrap();
        let id = Uuid::new_v4();
        state
            .sessions
            .put(
                id,
                Session {
                    access_token: "A1".to_string(),
                    refresh_token: Some("R1".to_string()),
                    expires_at: Utc::now() + Duration::hours(1),
                },
            )
            .await;
        (provider, state, id)
    }

    fn body_json(body: &Bytes) -> serde_json::Value {
        serde_json::from_slice(body).unwrap()
    }

    #[test]
    fn list_target_prefers_id_over_path() {
        assert_eq!(
            ListTarget::from_query(Some("X1".into()), Some("Docs".into())),
            ListTarget::Item("X1".into())
        );
        assert_eq!(
            ListTarget::from_query(None, Some("Docs".into())),
            ListTarget::Path("Docs".into())
        );
        assert_eq!(
            ListTarget::from_query(Some(String::new()), Some("/".into())),
            ListTarget::Root
        );
    }

    #[test]
    fn children_paths() {
        assert_eq!(
            children_path(&ListTarget::Item("X1".into())).unwrap(),
            "/me/drive/items/X1/children"
        );
        assert_eq!(
            children_path(&ListTarget::Path("Work Docs/2024 #1".into())).unwrap(),
            "/me/drive/root:/Work%20Docs/2024%20%231:/children"
        );
        assert_eq!(
            children_path(&ListTarget::Root).unwrap(),
            "/me/drive/root/children"
        );
    }

    #[test]
    fn children_path_stays_under_the_drive_root() {
        for path in ["../../../users/victim/drive/root", "Docs/..", "./Docs"] {
            assert!(
                matches!(
                    children_path(&ListTarget::Path(path.into())),
                    Err(AppError::Validation(_))
                ),
                "{} should be rejected",
                path
            );
        }
        assert!(children_path(&ListTarget::Item("..".into())).is_err());
    }

    #[test]
    fn upload_paths() {
        assert_eq!(
            upload_path("a b.txt", Some("P1"), Some("ignored")).unwrap(),
            "/me/drive/items/P1:/a%20b.txt:/content"
        );
        assert_eq!(
            upload_path("a.txt", None, Some("Docs")).unwrap(),
            "/me/drive/root:/Docs/a.txt:/content"
        );
        assert_eq!(
            upload_path("a.txt", None, Some("/Docs/a.txt")).unwrap(),
            "/me/drive/root:/Docs/a.txt:/content"
        );
        assert_eq!(
            upload_path("a+b.txt", None, None).unwrap(),
            "/me/drive/root:/a%2Bb.txt:/content"
        );
    }

    #[test]
    fn upload_path_stays_under_the_drive_root() {
        assert!(upload_path("a.txt", None, Some("../../../../users/x/drive/root")).is_err());
        assert!(upload_path("a.txt", None, Some("Docs/../..")).is_err());
        assert!(upload_path("..", None, None).is_err());
        assert!(upload_path("..", Some("P1"), None).is_err());
        assert!(upload_path("a.txt", Some(".."), None).is_err());
    }

    #[tokio::test]
    async fn climbing_paths_never_reach_graph() {
        let (provider, state, id) = signed_in().await;
        let target = ListTarget::from_query(None, Some("../../../users/victim/drive/root".into()));

        let result = list_children(&state, id, &target).await;

        assert!(matches!(result, Err(AppError::Validation(_))));
        assert_eq!(provider.graph_calls(), 0);
    }

    #[test]
    fn roles_map_to_read_or_write() {
        assert_eq!(permission_role(Some("edit")), "write");
        assert_eq!(permission_role(Some("Write")), "write");
        assert_eq!(permission_role(Some("view")), "read");
        assert_eq!(permission_role(Some("owner")), "read");
        assert_eq!(permission_role(None), "read");
    }

    #[tokio::test]
    async fn create_folder_posts_a_failing_conflict_behavior() {
        let (provider, state, id) = signed_in().await;

        create_folder(&state, id, "Reports", Some("P1")).await.unwrap();

        let recorded = provider.last_graph_request().unwrap();
        assert_eq!(recorded.method, Method::POST);
        assert_eq!(recorded.path_and_query, "/v1.0/me/drive/items/P1/children");
        let body = body_json(&recorded.body);
        assert_eq!(body["name"], "Reports");
        assert_eq!(body["folder"], serde_json::json!({}));
        assert_eq!(body["@microsoft.graph.conflictBehavior"], "fail");
    }

    #[tokio::test]
    async fn upload_conflict_becomes_file_already_exists() {
        let (provider, state, id) = signed_in().await;
        provider.set_graph_reply(GraphReply::Status(
            StatusCode::CONFLICT,
            r#"{"error":{"code":"nameAlreadyExists"}}"#.to_string(),
        ));

        let result = upload(
            &state,
            id,
            "a.txt",
            Bytes::from_static(b"hi"),
            "text/plain".to_string(),
            None,
            None,
        )
        .await;

        match result {
            Err(AppError::Conflict(msg)) => assert_eq!(msg, "File already exists"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn empty_failure_bodies_get_route_messages() {
        let (provider, state, id) = signed_in().await;
        provider.set_graph_reply(GraphReply::Status(StatusCode::NOT_FOUND, String::new()));

        match delete(&state, id, "X1").await {
            Err(AppError::Upstream { status, body }) => {
                assert_eq!(status, StatusCode::NOT_FOUND);
                assert_eq!(body_json(&body)["error"], "Delete failed");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn share_sends_an_invitation() {
        let (provider, state, id) = signed_in().await;
        let emails = vec!["ana@example.com".to_string(), " ".to_string()];

        share(&state, id, "X1", &emails, "write", "").await.unwrap();

        let recorded = provider.last_graph_request().unwrap();
        assert_eq!(recorded.path_and_query, "/v1.0/me/drive/items/X1/invite");
        let body = body_json(&recorded.body);
        assert_eq!(
            body["recipients"],
            serde_json::json!([{ "email": "ana@example.com" }])
        );
        assert_eq!(body["requireSignIn"], true);
        assert_eq!(body["sendInvitation"], true);
        assert_eq!(body["roles"], serde_json::json!(["write"]));
        assert_eq!(body["message"], "");
    }

    #[tokio::test]
    async fn shared_items_include_external_ones() {
        let (provider, state, id) = signed_in().await;
        list_shared(&state, id).await.unwrap();
        assert_eq!(
            provider.last_graph_request().unwrap().path_and_query,
            "/v1.0/me/drive/sharedWithMe?allowexternal=true"
        );
    }
}
