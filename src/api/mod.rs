//! HTTP API module.
//!
//! Serverless-style proxy endpoints in front of the upstream
//! conversational API, including the live stream relay.

mod error;
mod handlers;
mod routes;
mod state;

pub use error::{ApiError, ApiResult, ErrorBody};
pub use routes::create_router;
pub use state::AppState;
