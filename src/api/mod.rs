pub mod auth_routes;
pub mod dto;
pub mod error;
pub mod rate_limiter;
pub mod routes;

pub use error::{ApiError, ApiResult};
pub use routes::{create_router, AppState};
