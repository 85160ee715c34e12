//! Authorization Resolution
//!
//! Pure role derivation over a freshly loaded project. Every service
//! operation rebuilds a `ProjectAcl` from the project row and its
//! collaborator rows before touching anything; a client-supplied role is
//! never trusted.
//!
//! The creator of a project is a manager unconditionally, regardless of what
//! the collaborator list contains. Everyone else gets the role recorded for
//! them, or no access at all.

use std::collections::HashMap;

use crate::database::{CollaboratorRow, ProjectRow};
use crate::models::Role;

#[derive(Debug, Clone)]
pub struct ProjectAcl {
    created_by: i64,
    roles: HashMap<i64, Role>,
}

impl ProjectAcl {
    pub fn new(created_by: i64, collaborators: impl IntoIterator<Item = (i64, Role)>) -> Self {
        Self {
            created_by,
            roles: collaborators.into_iter().collect(),
        }
    }

    pub fn from_rows(project: &ProjectRow, collaborators: &[CollaboratorRow]) -> Self {
        Self::new(
            project.created_by,
            collaborators
                .iter()
                .filter_map(|c| Role::parse(&c.role).map(|role| (c.user_id, role))),
        )
    }

    /// The effective role of `user_id`, or `None` for no access.
    pub fn role_of(&self, user_id: i64) -> Option<Role> {
        if user_id == self.created_by {
            return Some(Role::Manager);
        }
        self.roles.get(&user_id).copied()
    }

    pub fn has_manager_access(&self, user_id: i64) -> bool {
        self.role_of(user_id) == Some(Role::Manager)
    }

    pub fn has_any_access(&self, user_id: i64) -> bool {
        self.role_of(user_id).is_some()
    }

    /// Whether `user_id` has an explicit collaborator entry (the creator has
    /// one too, inserted at project creation).
    pub fn is_collaborator(&self, user_id: i64) -> bool {
        self.roles.contains_key(&user_id)
    }

    /// Number of collaborator entries recorded with the manager role.
    pub fn manager_count(&self) -> usize {
        self.roles.values().filter(|r| **r == Role::Manager).count()
    }
}
