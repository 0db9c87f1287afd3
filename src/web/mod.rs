//! HTTP surface over the engine boundary.
//!
//! Three read-only data endpoints plus a health check. The caller's
//! principal comes from the `x-painel-user` header.

mod server;

pub use server::{router, serve, AppState, PRINCIPAL_HEADER};
