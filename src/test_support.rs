//! An in-process stand-in for the identity platform and the Graph API.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::post,
    Form, Router,
};

use crate::config::Config;

pub(crate) const TENANT: &str = "tenant";

pub(crate) fn test_config(base_url: &str) -> Config {
    let base_url = base_url.to_string();
    Config::from_lookup(move |key| match key {
        "CLIENT_ID" => Some("client-id".to_string()),
        "CLIENT_SECRET" => Some("client-secret".to_string()),
        "AUTH_TENANT" => Some(TENANT.to_string()),
        "AUTHORITY_URL" => Some(base_url.clone()),
        "GRAPH_BASE_URL" => Some(format!("{}/v1.0", base_url)),
        "FRONTEND_URL" => Some("http://localhost:3000".to_string()),
        "HTTP_TIMEOUT_SECS" => Some("2".to_string()),
        _ => None,
    })
    .expect("test config")
}

#[derive(Clone)]
pub(crate) enum TokenReply {
    Grant {
        access_token: String,
        refresh_token: Option<String>,
        expires_in: u64,
    },
    Reject,
}

impl TokenReply {
    pub(crate) fn grant(access: &str, refresh: Option<&str>, expires_in: u64) -> Self {
        TokenReply::Grant {
            access_token: access.to_string(),
            refresh_token: refresh.map(str::to_string),
            expires_in,
        }
    }
}

#[derive(Clone)]
pub(crate) enum GraphReply {
    /// 200 (204 for DELETE) for any bearer token.
    AcceptAny,
    /// 200 (204 for DELETE) only for this bearer token, 401 otherwise.
    AcceptToken(String),
    /// 401 whatever the token.
    AlwaysUnauthorized,
    /// A fixed status and body.
    Status(StatusCode, String),
}

#[derive(Clone, Debug)]
pub(crate) struct RecordedRequest {
    pub method: Method,
    pub path_and_query: String,
    pub authorization: Option<String>,
    pub content_type: Option<String>,
    pub body: Bytes,
}

struct FakeState {
    token_reply: TokenReply,
    token_delay: Duration,
    last_token_form: Option<HashMap<String, String>>,
    graph_reply: GraphReply,
    graph_requests: Vec<RecordedRequest>,
}

#[derive(Clone)]
pub(crate) struct FakeProvider {
    pub base_url: String,
    token_calls: Arc<AtomicUsize>,
    graph_calls: Arc<AtomicUsize>,
    state: Arc<Mutex<FakeState>>,
}

impl FakeProvider {
    pub(crate) async fn start() -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let provider = Self {
            base_url: format!("http://{}", addr),
            token_calls: Arc::new(AtomicUsize::new(0)),
            graph_calls: Arc::new(AtomicUsize::new(0)),
            state: Arc::new(Mutex::new(FakeState {
                token_reply: TokenReply::grant("fresh-access", None, 3600),
                token_delay: Duration::ZERO,
                last_token_form: None,
                graph_reply: GraphReply::AcceptAny,
                graph_requests: Vec::new(),
            })),
        };

        let app = Router::new()
            .route(&format!("/{}/oauth2/v2.0/token", TENANT), post(token))
            .fallback(graph)
            .with_state(provider.clone());

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        provider
    }

    pub(crate) fn config(&self) -> Config {
        test_config(&self.base_url)
    }

    pub(crate) fn set_token_reply(&self, reply: TokenReply) {
        self.state.lock().unwrap().token_reply = reply;
    }

    pub(crate) fn set_token_delay(&self, delay: Duration) {
        self.state.lock().unwrap().token_delay = delay;
    }

    pub(crate) fn set_graph_reply(&self, reply: GraphReply) {
        self.state.lock().unwrap().graph_reply = reply;
    }

    pub(crate) fn token_calls(&self) -> usize {
        self.token_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn graph_calls(&self) -> usize {
        self.graph_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn last_token_form(&self) -> Option<HashMap<String, String>> {
        self.state.lock().unwrap().last_token_form.clone()
    }

    pub(crate) fn graph_requests(&self) -> Vec<RecordedRequest> {
        self.state.lock().unwrap().graph_requests.clone()
    }

    pub(crate) fn last_graph_request(&self) -> Option<RecordedRequest> {
        self.state.lock().unwrap().graph_requests.last().cloned()
    }
}

async fn token(
    State(provider): State<FakeProvider>,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    provider.token_calls.fetch_add(1, Ordering::SeqCst);
    let (reply, delay) = {
        let mut state = provider.state.lock().unwrap();
        state.last_token_form = Some(form);
        (state.token_reply.clone(), state.token_delay)
    };

    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }

    match reply {
        TokenReply::Grant {
            access_token,
            refresh_token,
            expires_in,
        } => {
            let mut body = serde_json::json!({
                "token_type": "Bearer",
                "access_token": access_token,
                "expires_in": expires_in,
            });
            if let Some(refresh_token) = refresh_token {
                body["refresh_token"] = serde_json::Value::String(refresh_token);
            }
            json(StatusCode::OK, body.to_string())
        }
        TokenReply::Reject => json(
            StatusCode::BAD_REQUEST,
            r#"{"error":"invalid_grant","error_description":"AADSTS70000: refresh token expired"}"#
                .to_string(),
        ),
    }
}

async fn graph(
    State(provider): State<FakeProvider>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    provider.graph_calls.fetch_add(1, Ordering::SeqCst);

    let header_value = |name: header::HeaderName| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    let recorded = RecordedRequest {
        method: method.clone(),
        path_and_query: uri
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_default(),
        authorization: header_value(header::AUTHORIZATION),
        content_type: header_value(header::CONTENT_TYPE),
        body,
    };

    let reply = {
        let mut state = provider.state.lock().unwrap();
        state.graph_requests.push(recorded.clone());
        state.graph_reply.clone()
    };

    let accepted = match reply {
        GraphReply::AcceptAny => true,
        GraphReply::AcceptToken(token) => {
            recorded.authorization.as_deref() == Some(format!("Bearer {}", token).as_str())
        }
        GraphReply::AlwaysUnauthorized => false,
        GraphReply::Status(status, body) => return json(status, body),
    };

    if !accepted {
        return json(
            StatusCode::UNAUTHORIZED,
            r#"{"error":{"code":"InvalidAuthenticationToken","message":"Access token has expired."}}"#
                .to_string(),
        );
    }

    if method == Method::DELETE {
        return StatusCode::NO_CONTENT.into_response();
    }

    let body = serde_json::json!({
        "method": method.as_str(),
        "path": recorded.path_and_query,
        "value": [],
    });
    json(StatusCode::OK, body.to_string())
}

fn json(status: StatusCode, body: String) -> Response {
    (status, [(header::CONTENT_TYPE, "application/json")], body).into_response()
}
