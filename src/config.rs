use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use http::HeaderValue;
use url::Url;
use zeroize::Zeroizing;

/// The application's configuration.
#[derive(Clone)]
pub struct Config {
    /// The OAuth application (client) ID.
    pub client_id: String,
    /// The OAuth application secret.
    pub client_secret: Zeroizing<String>,
    /// The callback URL registered with the identity platform.
    pub redirect_uri: String,
    /// The Azure AD tenant (`common` accepts personal and work accounts).
    pub tenant: String,
    /// The identity platform host, without tenant.
    pub authority_url: String,
    /// The base URL of the Graph API, without trailing slash.
    pub graph_base_url: String,
    /// The space-separated scope requested on every token call.
    pub scopes: String,
    /// Where the browser is sent after a successful login.
    pub frontend_url: Url,
    /// The origin allowed by CORS, derived from `frontend_url`.
    pub frontend_origin: HeaderValue,
    /// The address to listen on.
    pub host: IpAddr,
    /// The port to listen on.
    pub port: u16,
    /// The timeout applied to every outbound call.
    pub http_timeout: Duration,
    /// The largest file accepted by the simple upload route.
    pub max_upload_bytes: usize,
    /// The directory holding the bundled UI.
    pub static_dir: PathBuf,
    /// Sustained requests per second allowed per client IP.
    pub rate_limit_per_second: u64,
    /// Burst size allowed per client IP.
    pub rate_limit_burst: u32,
}

impl Config {
    /// Creates a new `Config` from environment variables.
    ///
    /// # Returns
    ///
    /// A `Result` containing the `Config`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Creates a new `Config` from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let client_id = lookup("CLIENT_ID").context("CLIENT_ID must be set")?;
        let client_secret = Zeroizing::new(
            lookup("CLIENT_SECRET").context("CLIENT_SECRET must be set")?,
        );

        let frontend_url = Url::parse(&var("FRONTEND_URL", "http://localhost:3000"))
            .context("FRONTEND_URL must be an absolute URL")?;
        let frontend_origin = HeaderValue::from_str(&frontend_url.origin().ascii_serialization())
            .context("FRONTEND_URL has no usable origin")?;

        let authority_url = var("AUTHORITY_URL", "https://login.microsoftonline.com");
        Url::parse(&authority_url).context("AUTHORITY_URL must be an absolute URL")?;
        let graph_base_url = var("GRAPH_BASE_URL", "https://graph.microsoft.com/v1.0");
        Url::parse(&graph_base_url).context("GRAPH_BASE_URL must be an absolute URL")?;

        Ok(Self {
            client_id,
            client_secret,
            redirect_uri: var("REDIRECT_URI", "http://localhost:5000/auth/callback"),
            tenant: var("AUTH_TENANT", "common"),
            authority_url: authority_url.trim_end_matches('/').to_string(),
            graph_base_url: graph_base_url.trim_end_matches('/').to_string(),
            scopes: var("OAUTH_SCOPES", "Files.ReadWrite.All offline_access"),
            frontend_url,
            frontend_origin,
            host: var("HOST", "127.0.0.1").parse().context("Invalid HOST")?,
            port: var("PORT", "5000").parse().context("Invalid PORT")?,
            http_timeout: Duration::from_secs(
                var("HTTP_TIMEOUT_SECS", "30")
                    .parse()
                    .context("Invalid HTTP_TIMEOUT_SECS")?,
            ),
            max_upload_bytes: var("MAX_UPLOAD_BYTES", "4194304")
                .parse()
                .context("Invalid MAX_UPLOAD_BYTES")?,
            static_dir: PathBuf::from(var("STATIC_DIR", "files/public")),
            rate_limit_per_second: var("RATE_LIMIT_PER_SECOND", "50")
                .parse()
                .context("Invalid RATE_LIMIT_PER_SECOND")?,
            rate_limit_burst: var("RATE_LIMIT_BURST", "200")
                .parse()
                .context("Invalid RATE_LIMIT_BURST")?,
        })
    }

    /// The provider's authorization endpoint for the configured tenant.
    pub fn authorize_url(&self) -> String {
        format!("{}/{}/oauth2/v2.0/authorize", self.authority_url, self.tenant)
    }

    /// The provider's token endpoint for the configured tenant.
    pub fn token_url(&self) -> String {
        format!("{}/{}/oauth2/v2.0/token", self.authority_url, self.tenant)
    }

    /// The socket address the server binds to.
    pub fn bind_address(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}
