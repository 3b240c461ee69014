use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use uuid::Uuid;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Seconds subtracted from the provider-declared lifetime of an access token.
pub const EXPIRY_BUFFER_SECS: i64 = 5 * 60;

/// Upper bound on a declared lifetime, so absurd values cannot overflow the clock math.
const MAX_LIFETIME_SECS: i64 = 365 * 24 * 60 * 60;

/// Computes the point after which an access token is treated as expired.
pub fn expiry_from(now: DateTime<Utc>, expires_in: u64) -> DateTime<Utc> {
    let lifetime = i64::try_from(expires_in)
        .unwrap_or(MAX_LIFETIME_SECS)
        .min(MAX_LIFETIME_SECS);
    now + Duration::seconds(lifetime) - Duration::seconds(EXPIRY_BUFFER_SECS)
}

/// A token set returned by the identity platform's token endpoint.
#[derive(Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub expires_in: u64,
}

impl fmt::Debug for TokenGrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenGrant")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

/// The token record bound to a browser session.
///
/// Token values are wiped from memory when the record is dropped and are
/// never printed by `Debug`.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Session {
    /// Bearer credential for the Graph API.
    pub access_token: String,
    /// Credential exchanged for a new access token; may rotate on use.
    pub refresh_token: Option<String>,
    /// The access token is considered expired after this instant.
    #[zeroize(skip)]
    pub expires_at: DateTime<Utc>,
}

impl Session {
    /// Builds the initial record from an authorization-code grant.
    pub fn from_grant(grant: TokenGrant, now: DateTime<Utc>) -> Self {
        Self {
            expires_at: expiry_from(now, grant.expires_in),
            access_token: grant.access_token,
            refresh_token: grant.refresh_token.filter(|t| !t.is_empty()),
        }
    }

    /// Whether the access token is past its buffered expiry.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// The refresh token, if one is held and non-empty.
    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref().filter(|t| !t.is_empty())
    }

    /// Applies a refresh grant in place.
    ///
    /// The refresh token is only replaced when the provider rotated it.
    pub fn apply_refresh(&mut self, grant: TokenGrant, now: DateTime<Utc>) {
        self.access_token.zeroize();
        self.access_token = grant.access_token;
        if let Some(rotated) = grant.refresh_token.filter(|t| !t.is_empty()) {
            self.refresh_token.zeroize();
            self.refresh_token = Some(rotated);
        }
        self.expires_at = expiry_from(now, grant.expires_in);
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("access_token", &"<redacted>")
            .field("has_refresh_token", &self.refresh_token().is_some())
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// The session a request was authenticated with, inserted by the auth middleware.
#[derive(Debug, Clone, Copy)]
pub struct AuthenticatedSession {
    pub id: Uuid,
}
