//! API handlers for quotedesk.
//!
//! Public routes (intake, login, password reset) and the authenticated admin
//! panel routes. Authentication and role checks happen at the top of each
//! handler through `utils::require_auth` / `utils::require_permission`.

pub mod admin;
pub mod auth;
pub mod health;
pub mod root;
pub mod submissions;
pub mod utils;
