pub mod adapters;
pub mod auth;
pub mod compositor;
pub mod config;
pub mod dispatcher;
pub mod ingest;
pub mod liveness;

mod http;
#[cfg(test)]
mod test_support;

pub use adapters::{AdapterError, AdapterImage, AdapterRegistry, TryOnAdapter};
pub use auth::{AuthClient, AuthError, AuthOutcome};
pub use compositor::{compose, ComposeError};
pub use config::TryOnConfig;
pub use dispatcher::{GenerationError, GenerationErrorKind, GenerationOutcome, TryOnEngine};
pub use http::fetch_result_image;
pub use ingest::{ingest_bytes, ingest_path};
pub use liveness::{GenerationTickets, InFlight, InFlightGuard, ResultSlot, Ticket};
