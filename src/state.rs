use std::sync::Arc;

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::repositories::{
    login_state::LoginStateStore,
    session::{InMemorySessionStore, SessionStore},
};
use crate::services::{graph::GraphClient, oauth::OAuthClient, tokens::TokenRefresher};

/// The application's state.
#[derive(Clone)]
pub struct AppState {
    /// The application's configuration.
    pub config: Config,
    /// Token records keyed by session id.
    pub sessions: Arc<dyn SessionStore>,
    /// Outstanding OAuth `state` values.
    pub login_states: LoginStateStore,
    /// The identity platform client.
    pub oauth: OAuthClient,
    /// The authenticated forwarder to the Graph API.
    pub graph: GraphClient,
}

impl AppState {
    /// Creates a new `AppState` backed by an in-memory session store.
    ///
    /// # Arguments
    ///
    /// * `config` - The application's configuration.
    ///
    /// # Returns
    ///
    /// A `Result` containing the `AppState`.
    pub fn new(config: &Config) -> Result<Self> {
        Self::with_store(config, Arc::new(InMemorySessionStore::new()))
    }

    /// Creates a new `AppState` around the given session store.
    pub fn with_store(config: &Config, sessions: Arc<dyn SessionStore>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {}", e)))?;
        tracing::info!(
            "✅ HTTP client initialized (timeout {}s)",
            config.http_timeout.as_secs()
        );

        let oauth = OAuthClient::new(config, http.clone())?;
        let refresher = TokenRefresher::new(sessions.clone(), oauth.clone());
        let graph = GraphClient::new(
            http,
            config.graph_base_url.clone(),
            sessions.clone(),
            refresher,
        );

        Ok(AppState {
            config: config.clone(),
            sessions,
            login_states: LoginStateStore::default(),
            oauth,
            graph,
        })
    }
}
