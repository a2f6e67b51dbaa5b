//! Line-delimited JSON surface of the results daemon. Each request line is
//! routed to exactly one handler family and answered with one ok/err envelope.

mod error;
mod handlers;
mod helpers;
mod router;
mod types;

pub use router::handle_request;
pub use types::{AppState, Request};
