//! HTTP surface: request guard, handlers and the server loop.

mod error;
mod guard;
mod handlers;
mod server;

pub use error::ApiError;
pub use guard::{Caller, API_KEY_HEADER, USER_ID_HEADER};
pub use handlers::{AnalyzeRequest, CreditsResponse, DescriptionResponse};
pub use server::{build_router, AppState, HttpServer};
