//! User roles and what each one may do.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    #[default]
    ReadOnly,
    ReadCreate,
    ReadCreateUpdate,
    FullAccess,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    Read,
    Create,
    Update,
    Destroy,
}

impl Role {
    pub fn allows(&self, permission: Permission) -> bool {
        match (self, permission) {
            (_, Permission::Read) => true,
            (Role::ReadOnly, _) => false,
            (Role::ReadCreate, Permission::Create) => true,
            (Role::ReadCreate, Permission::Update | Permission::Destroy) => false,
            (Role::ReadCreateUpdate, Permission::Create | Permission::Update) => true,
            (Role::ReadCreateUpdate, Permission::Destroy) => false,
            (Role::FullAccess, _) => true,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::ReadOnly => "READ_ONLY",
            Role::ReadCreate => "READ_CREATE",
            Role::ReadCreateUpdate => "READ_CREATE_UPDATE",
            Role::FullAccess => "FULL_ACCESS",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Role::ReadOnly => "Read Only",
            Role::ReadCreate => "Read & Create",
            Role::ReadCreateUpdate => "Read, Create & Update",
            Role::FullAccess => "Full Access (Destroy)",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "READ_ONLY" => Ok(Role::ReadOnly),
            "READ_CREATE" => Ok(Role::ReadCreate),
            "READ_CREATE_UPDATE" => Ok(Role::ReadCreateUpdate),
            "FULL_ACCESS" => Ok(Role::FullAccess),
            _ => Err(format!("Invalid role: {}", s)),
        }
    }
}
