use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;
use uuid::Uuid;

use super::lockout::LockoutState;
use crate::query::{Direction, FieldKind, Schema, SortKey, Value, eval::Record};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    #[default]
    Editor,
}

impl Role {
    pub const ALL: [Self; 2] = [Self::Admin, Self::Editor];
    const NAMES: &'static [&'static str] = &["admin", "editor"];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Editor => "editor",
        }
    }

    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim().to_lowercase();
        Self::ALL.into_iter().find(|role| role.as_str() == raw)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pending password reset; only the SHA-256 of the emailed token is kept.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResetToken {
    pub hash: String,
    pub expires_at: DateTime<Utc>,
}

/// Stored account. The password hash never leaves the crate through
/// [`CredentialView`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Credential {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub active: bool,
    pub lockout: LockoutState,
    pub last_login: Option<DateTime<Utc>>,
    pub password_changed_at: Option<DateTime<Utc>>,
    pub reset_token: Option<ResetToken>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Credential {
    /// Whether a token issued at `issued_at` (unix seconds) predates the last
    /// password change.
    #[must_use]
    pub fn changed_password_after(&self, issued_at: i64) -> bool {
        self.password_changed_at
            .is_some_and(|changed| changed.timestamp() > issued_at)
    }

    #[must_use]
    pub fn view(&self) -> CredentialView {
        CredentialView::from(self)
    }
}

/// Public projection of a credential.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, ToSchema)]
pub struct CredentialView {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub active: bool,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Credential> for CredentialView {
    fn from(credential: &Credential) -> Self {
        Self {
            id: credential.id,
            name: credential.name.clone(),
            email: credential.email.clone(),
            role: credential.role,
            active: credential.active,
            last_login: credential.last_login,
            created_at: credential.created_at,
            updated_at: credential.updated_at,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct CredentialCounts {
    pub total: u64,
    pub active: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CredentialField {
    Name,
    Email,
    Role,
    Active,
    LastLogin,
    CreatedAt,
    UpdatedAt,
}

impl Schema for CredentialField {
    const FIELDS: &'static [Self] = &[
        Self::Name,
        Self::Email,
        Self::Role,
        Self::Active,
        Self::LastLogin,
        Self::CreatedAt,
        Self::UpdatedAt,
    ];
    const PROJECTION: &'static [&'static str] = &[
        "name",
        "email",
        "role",
        "active",
        "last_login",
        "created_at",
        "updated_at",
    ];
    const SEARCH: &'static [Self] = &[Self::Name, Self::Email];
    const DEFAULT_SORT: &'static [SortKey<Self>] = &[SortKey {
        field: Self::CreatedAt,
        direction: Direction::Desc,
    }];

    fn name(self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Email => "email",
            Self::Role => "role",
            Self::Active => "active",
            Self::LastLogin => "last_login",
            Self::CreatedAt => "created_at",
            Self::UpdatedAt => "updated_at",
        }
    }

    fn column(self) -> &'static str {
        self.name()
    }

    fn kind(self) -> FieldKind {
        match self {
            Self::Name | Self::Email => FieldKind::Text,
            Self::Role => FieldKind::Enum(Role::NAMES),
            Self::Active => FieldKind::Bool,
            Self::LastLogin | Self::CreatedAt | Self::UpdatedAt => FieldKind::Timestamp,
        }
    }
}

impl Record<CredentialField> for Credential {
    fn id(&self) -> Uuid {
        self.id
    }

    fn value(&self, field: CredentialField) -> Option<Value> {
        match field {
            CredentialField::Name => Some(Value::Text(self.name.clone())),
            CredentialField::Email => Some(Value::Text(self.email.clone())),
            CredentialField::Role => Some(Value::Text(self.role.as_str().to_string())),
            CredentialField::Active => Some(Value::Bool(self.active)),
            CredentialField::LastLogin => self.last_login.map(Value::Timestamp),
            CredentialField::CreatedAt => Some(Value::Timestamp(self.created_at)),
            CredentialField::UpdatedAt => Some(Value::Timestamp(self.updated_at)),
        }
    }
}
