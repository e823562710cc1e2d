//! Admin and operational HTTP surface for the killfeed pipeline.

pub mod response;
pub mod routes;
pub mod state;

pub use routes::router;
pub use state::AppState;
