use super::Identity;
use crate::{
    credentials::models::Role,
    error::{Error, Result},
};

/// Operations gated by role.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Permission {
    ReadSubmissions,
    TriageSubmissions,
    DeleteSubmissions,
    ViewStats,
    ExportSubmissions,
    ManageUsers,
}

impl Permission {
    #[must_use]
    pub const fn allowed(self) -> &'static [Role] {
        match self {
            Self::ReadSubmissions | Self::TriageSubmissions => &[Role::Admin, Role::Editor],
            Self::DeleteSubmissions
            | Self::ViewStats
            | Self::ExportSubmissions
            | Self::ManageUsers => &[Role::Admin],
        }
    }
}

/// # Errors
/// `Error::Authorization` when the identity's role is not allowed.
pub fn authorize(identity: &Identity, permission: Permission) -> Result<()> {
    if permission.allowed().contains(&identity.role) {
        Ok(())
    } else {
        Err(Error::Authorization)
    }
}
