//! HTTP transport for riders and administrators
//!
//! Handlers only translate between JSON and the managers; every rule lives
//! in the core.

mod admin;
mod auth;
mod error;
mod extract;
mod server;

pub use admin::{admin_router, AdminState};
pub use auth::require_admin;
pub use error::status_for;
pub use extract::{ApiJson, ApiPath, ApiQuery};
pub use server::{build_router, start_web_server, AppState};
