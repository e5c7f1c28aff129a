//! HTTP API server for the host platform
//!
//! This module exposes the trigger action and the result surface:
//! - POST /devices/:id/trigger - Start listening on a device, no wake word
//! - GET /devices/:id/result - Latest recognized text for a device
//! - GET /devices - Resolvable devices and whether they are busy
//! - GET /sessions/:id - Session snapshot
//! - POST /sessions/:id/cancel - Cancel a session
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use routes::create_router;
pub use state::AppState;
