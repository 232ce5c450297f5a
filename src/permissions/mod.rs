//! Per-(user, project) capability rows and the guards that enforce them.
//!
//! `Role::Admin` bypasses every guard. Every other role is gated strictly by
//! its Permission row for the project; a missing row behaves as all-false.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::database::models::User;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Staff,
    Consultant,
    Guest,
}

impl Role {
    pub const ALL: [Role; 4] = [Role::Admin, Role::Staff, Role::Consultant, Role::Guest];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Staff => "staff",
            Role::Consultant => "consultant",
            Role::Guest => "guest",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "staff" => Ok(Role::Staff),
            "consultant" => Ok(Role::Consultant),
            "guest" => Ok(Role::Guest),
            other => Err(format!("unknown role '{}'", other)),
        }
    }
}

/// One independent flag on a Permission row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Create,
    Read,
    Update,
    Delete,
    CreateProjects,
    ReadDocuments,
    ReadPersonalInfo,
    InviteMembers,
}

impl Capability {
    pub const ALL: [Capability; 8] = [
        Capability::Create,
        Capability::Read,
        Capability::Update,
        Capability::Delete,
        Capability::CreateProjects,
        Capability::ReadDocuments,
        Capability::ReadPersonalInfo,
        Capability::InviteMembers,
    ];
}

/// The eight capability flags, without row identity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub can_create: bool,
    pub can_read: bool,
    pub can_update: bool,
    pub can_delete: bool,
    pub can_create_projects: bool,
    pub can_read_documents: bool,
    pub can_read_personal_info: bool,
    pub can_invite_members: bool,
}

impl Capabilities {
    pub const fn all() -> Self {
        Self {
            can_create: true,
            can_read: true,
            can_update: true,
            can_delete: true,
            can_create_projects: true,
            can_read_documents: true,
            can_read_personal_info: true,
            can_invite_members: true,
        }
    }

    /// Default grant when a user of `role` is added to a project
    pub const fn defaults_for(role: Role) -> Self {
        match role {
            Role::Admin | Role::Consultant => Self::all(),
            Role::Staff => Self {
                can_create: true,
                can_read: true,
                can_update: true,
                can_delete: false,
                can_create_projects: true,
                can_read_documents: false,
                can_read_personal_info: false,
                can_invite_members: true,
            },
            Role::Guest => Self {
                can_create: false,
                can_read: true,
                can_update: false,
                can_delete: false,
                can_create_projects: false,
                can_read_documents: false,
                can_read_personal_info: false,
                can_invite_members: false,
            },
        }
    }

    pub fn allows(&self, capability: Capability) -> bool {
        match capability {
            Capability::Create => self.can_create,
            Capability::Read => self.can_read,
            Capability::Update => self.can_update,
            Capability::Delete => self.can_delete,
            Capability::CreateProjects => self.can_create_projects,
            Capability::ReadDocuments => self.can_read_documents,
            Capability::ReadPersonalInfo => self.can_read_personal_info,
            Capability::InviteMembers => self.can_invite_members,
        }
    }
}

/// One row per (user, project). Uniqueness is enforced by the stores.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    pub id: Uuid,
    pub user_id: Uuid,
    pub project_id: Uuid,
    #[serde(flatten)]
    pub capabilities: Capabilities,
}

impl Permission {
    pub fn new(user_id: Uuid, project_id: Uuid, capabilities: Capabilities) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            project_id,
            capabilities,
        }
    }

    /// Row provisioned for a project member from the role matrix
    pub fn for_role(user_id: Uuid, project_id: Uuid, role: Role) -> Self {
        Self::new(user_id, project_id, Capabilities::defaults_for(role))
    }

    pub fn apply(&mut self, patch: &PermissionPatch) {
        patch.apply_to(&mut self.capabilities);
    }
}

/// Partial update: only supplied fields change
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionPatch {
    pub can_create: Option<bool>,
    pub can_read: Option<bool>,
    pub can_update: Option<bool>,
    pub can_delete: Option<bool>,
    pub can_create_projects: Option<bool>,
    pub can_read_documents: Option<bool>,
    pub can_read_personal_info: Option<bool>,
    pub can_invite_members: Option<bool>,
}

impl PermissionPatch {
    /// The flags this patch switches on
    pub fn granted(&self) -> Capabilities {
        let on = |value: Option<bool>| value == Some(true);
        Capabilities {
            can_create: on(self.can_create),
            can_read: on(self.can_read),
            can_update: on(self.can_update),
            can_delete: on(self.can_delete),
            can_create_projects: on(self.can_create_projects),
            can_read_documents: on(self.can_read_documents),
            can_read_personal_info: on(self.can_read_personal_info),
            can_invite_members: on(self.can_invite_members),
        }
    }

    pub fn apply_to(&self, caps: &mut Capabilities) {
        let set = |target: &mut bool, value: Option<bool>| {
            if let Some(v) = value {
                *target = v;
            }
        };
        set(&mut caps.can_create, self.can_create);
        set(&mut caps.can_read, self.can_read);
        set(&mut caps.can_update, self.can_update);
        set(&mut caps.can_delete, self.can_delete);
        set(&mut caps.can_create_projects, self.can_create_projects);
        set(&mut caps.can_read_documents, self.can_read_documents);
        set(&mut caps.can_read_personal_info, self.can_read_personal_info);
        set(&mut caps.can_invite_members, self.can_invite_members);
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PermissionError {
    /// Deliberately carries no detail about which capability was missing
    #[error("You do not have permission to perform this action")]
    Forbidden,
}

pub type GuardResult = Result<(), PermissionError>;

/// Pass if the user is an admin or the row grants every listed capability
fn require(user: &User, permission: Option<&Permission>, required: &[Capability]) -> GuardResult {
    if user.role == Role::Admin {
        return Ok(());
    }

    let granted = permission
        .map(|p| required.iter().all(|c| p.capabilities.allows(*c)))
        .unwrap_or(false);

    if granted {
        Ok(())
    } else {
        debug!(
            user_id = %user.id,
            project_id = ?permission.map(|p| p.project_id),
            ?required,
            "permission denied"
        );
        Err(PermissionError::Forbidden)
    }
}

pub fn assert_viewable(user: &User, permission: Option<&Permission>) -> GuardResult {
    require(user, permission, &[Capability::Read])
}

pub fn assert_writable(user: &User, permission: Option<&Permission>) -> GuardResult {
    require(user, permission, &[Capability::Create])
}

/// Editing a record implies seeing its personal fields, so both flags are needed
pub fn assert_updatable(user: &User, permission: Option<&Permission>) -> GuardResult {
    require(user, permission, &[Capability::Update, Capability::ReadPersonalInfo])
}

pub fn assert_deletable(user: &User, permission: Option<&Permission>) -> GuardResult {
    require(user, permission, &[Capability::Delete])
}

pub fn assert_docs_readable(user: &User, permission: Option<&Permission>) -> GuardResult {
    require(user, permission, &[Capability::ReadDocuments])
}

pub fn assert_can_see_private_info(user: &User, permission: Option<&Permission>) -> GuardResult {
    require(user, permission, &[Capability::ReadPersonalInfo])
}

pub fn assert_can_invite(user: &User, permission: Option<&Permission>) -> GuardResult {
    require(user, permission, &[Capability::InviteMembers])
}

pub fn assert_can_create_projects(user: &User, permission: Option<&Permission>) -> GuardResult {
    require(user, permission, &[Capability::CreateProjects])
}

/// Inviting a member or editing their row: the actor needs
/// `can_invite_members` plus every flag in `granted`
pub fn assert_can_grant(user: &User, permission: Option<&Permission>, granted: &Capabilities) -> GuardResult {
    let mut required = vec![Capability::InviteMembers];
    required.extend(Capability::ALL.into_iter().filter(|c| granted.allows(*c)));
    require(user, permission, &required)
}
