//! A backend that signs users in with Microsoft, keeps their tokens server-side
//! and proxies OneDrive operations to the Graph API on their behalf.

pub mod app;
pub mod config;
pub mod error;
pub mod state;

pub mod models {
    pub mod session;
}

pub mod repositories {
    pub mod login_state;
    pub mod session;
}

pub mod services {
    pub mod drive;
    pub mod graph;
    pub mod oauth;
    pub mod tokens;
}

pub mod handlers {
    pub mod auth;
    pub mod drive;
}

pub mod middleware_layer {
    pub mod auth;
}

pub mod validation {
    pub mod drive;
}

#[cfg(test)]
pub(crate) mod test_support;
