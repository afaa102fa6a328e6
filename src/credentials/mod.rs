//! Admin and editor accounts.

pub mod lockout;
pub mod mailer;
pub mod models;
pub mod password;
pub mod service;

pub use lockout::{LockoutPolicy, LockoutState};
pub use mailer::{LogMailer, Mailer};
pub use models::{Credential, CredentialField, CredentialView, Role};
