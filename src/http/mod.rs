//! HTTP API for driving a session from outside the process
//!
//! Intents are fire-and-forget and answer `202 Accepted`; their outcome
//! shows up in `GET /events` and `GET /session`:
//! - POST /recording/{start,pause,stop,cancel}
//! - POST /playback/{toggle,seek,stop}
//! - POST /records/:id/{rename,delete,decode}, POST /records/active/info
//! - POST /import
//! - GET /health

mod handlers;
mod routes;
mod state;

pub use routes::create_router;
pub use state::{AppState, EventLog};
