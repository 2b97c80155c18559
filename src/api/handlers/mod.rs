pub(crate) mod auth;
pub(crate) mod health;
pub(crate) mod policies;
pub(crate) mod settings;
pub(crate) mod users;

pub use auth::{AuthConfig, AuthState};

pub(crate) mod root {
    use axum::response::IntoResponse;

    // Plain banner for load balancers and the curious.
    pub async fn root() -> impl IntoResponse {
        concat!(env!("CARGO_PKG_NAME"), " ", env!("CARGO_PKG_VERSION"))
    }
}
