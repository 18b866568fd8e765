//! Authentication context handed to every engine operation.
//!
//! Credentials are verified upstream; the engine trusts [`Caller`] as given.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::BookingError;
use crate::state_machine::UserId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Customer,
    Translator,
    Admin,
    #[serde(alias = "super_admin")]
    Superadmin,
}

impl Role {
    pub fn is_admin(self) -> bool {
        matches!(self, Role::Admin | Role::Superadmin)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Book,
    Translate,
    Administer,
}

impl Capability {
    fn describe(self) -> &'static str {
        match self {
            Capability::Book => "customer",
            Capability::Translate => "translator",
            Capability::Administer => "admin",
        }
    }
}

/// The authenticated user behind a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub user_id: UserId,
    pub role: Role,
    pub capabilities: BTreeSet<Capability>,
}

impl Caller {
    pub fn new(user_id: UserId, role: Role) -> Self {
        let capabilities = match role {
            Role::Customer => BTreeSet::from([Capability::Book]),
            Role::Translator => BTreeSet::from([Capability::Translate]),
            Role::Admin | Role::Superadmin => BTreeSet::from([Capability::Administer]),
        };
        Self {
            user_id,
            role,
            capabilities,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }

    pub fn can(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    /// Fails with `Forbidden` unless the caller holds `capability`.
    pub fn require(&self, capability: Capability) -> Result<(), BookingError> {
        if self.can(capability) {
            Ok(())
        } else {
            Err(BookingError::forbidden(format!(
                "Only a {} can perform this action",
                capability.describe()
            )))
        }
    }
}
