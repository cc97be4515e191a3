//! zeal-serve: HTTP/WebSocket transport for the zealcore engine.

pub mod routes;
pub mod state;
pub mod ws;

pub use routes::router;
pub use state::{AppState, SharedState};
