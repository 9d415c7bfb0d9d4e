//! Backend API surface.

mod auth;
mod backend;
pub mod envelope;
mod gateway;

pub use auth::{AuthApi, LoginOutcome, UserProfile};
pub use backend::{BackendApi, DEFAULT_MATCHES_LIMIT, DEFAULT_MATCHES_PAGE};
pub use envelope::ErrorBody;
pub use gateway::{ApiGateway, ApiRequest, ApiResponse, RequestBody};
