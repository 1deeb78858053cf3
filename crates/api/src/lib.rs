pub mod error;
pub mod middleware;
pub mod models;
pub mod openapi;
pub mod routes;
pub mod scheduler;
pub mod state;

pub use error::{ApiError, ApiErrorResponse};
pub use openapi::ApiDoc;
pub use routes::create_router;
pub use state::{AppState, EngineRepositories};
