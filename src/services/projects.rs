//! Project Service
//!
//! Project CRUD, collaborator lifecycle, and custom board lifecycle. Every
//! operation re-derives the caller's role from freshly loaded state; a
//! project that exists but is invisible to the caller is reported as not
//! found, never as forbidden.

use std::sync::Arc;

use rand::Rng;
use rand::distributions::Alphanumeric;

use crate::authz::ProjectAcl;
use crate::database::{CollaboratorRow, Database, DatabaseError, ProjectRow, UserRow};
use crate::error::ApiError;
use crate::models::{
    self, BoardView, CollaboratorInput, CollaboratorView, CreateProjectRequest, ProjectType,
    ProjectView, Role, UpdateProjectRequest, UserSummary,
};
use crate::notify::{Notification, Notifier, dispatch};

const SHORT_ID_LEN: usize = 8;
const SHORT_ID_ATTEMPTS: usize = 3;

#[derive(Clone)]
pub struct ProjectService {
    db: Database,
    notifier: Arc<dyn Notifier>,
}

impl ProjectService {
    pub fn new(db: Database, notifier: Arc<dyn Notifier>) -> Self {
        Self { db, notifier }
    }

    pub async fn create(
        &self,
        caller: &UserRow,
        req: CreateProjectRequest,
    ) -> Result<ProjectView, ApiError> {
        let project_type = req.project_type.unwrap_or(ProjectType::Personal);

        let mut details = Vec::new();
        let title = req.title.as_deref().unwrap_or("").trim().to_string();
        if let Err(e) = models::validate_title(&title) {
            details.push(e);
        }
        if let Some(description) = req.description.as_deref() {
            if let Err(e) = models::validate_description(description) {
                details.push(e);
            }
        }
        if let Some(link) = req.github_link.as_deref() {
            if let Err(e) = models::validate_github_link(link) {
                details.push(e);
            }
        }
        if project_type == ProjectType::Personal && !req.collaborators.is_empty() {
            details.push("Personal projects cannot have collaborators".to_string());
        }
        if !details.is_empty() {
            return Err(ApiError::validation_details(details));
        }

        let collaborators = self.normalize_collaborators(caller.id, &req.collaborators).await?;

        // Short ids are random and collision-tolerant: retry a couple of
        // times if we hit an existing one.
        let mut project_id = None;
        for attempt in 0..SHORT_ID_ATTEMPTS {
            let short_id = generate_short_id();
            match self
                .db
                .insert_project(
                    &short_id,
                    &title,
                    req.description.as_deref(),
                    req.github_link.as_deref(),
                    project_type.as_str(),
                    caller.id,
                )
                .await
            {
                Ok(id) => {
                    project_id = Some(id);
                    break;
                }
                Err(DatabaseError::Conflict(msg)) if msg.contains("Short id") => {
                    tracing::warn!(attempt, "short id collision, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }
        let project_id = project_id
            .ok_or_else(|| ApiError::Internal("Could not allocate a project short id".into()))?;

        for (user_id, role) in &collaborators {
            self.db.add_collaborator(project_id, *user_id, *role).await?;
        }

        tracing::info!(
            project_id,
            title = title.as_str(),
            project_type = project_type.as_str(),
            created_by = caller.id,
            "project created"
        );

        if project_type == ProjectType::Collaborative && collaborators.len() > 1 {
            self.notify_collaborators(project_id, &title, caller).await?;
        }

        self.view(project_id, None).await
    }

    pub async fn list(&self, caller_id: i64) -> Result<Vec<ProjectView>, ApiError> {
        let rows = self.db.list_projects_for_user(caller_id).await?;
        let mut views = Vec::with_capacity(rows.len());
        for row in rows {
            views.push(self.assemble_view(row, None).await?);
        }
        Ok(views)
    }

    pub async fn get(&self, project_id: i64, caller_id: i64) -> Result<ProjectView, ApiError> {
        let (project, _, _) = self.load_visible(project_id, caller_id).await?;
        self.assemble_view(project, Some(caller_id)).await
    }

    pub async fn update(
        &self,
        project_id: i64,
        caller_id: i64,
        req: UpdateProjectRequest,
    ) -> Result<ProjectView, ApiError> {
        let (project, _, acl) = self.load_visible(project_id, caller_id).await?;
        self.require_owner_or_manager(&project, &acl, caller_id, "update")?;

        if let Some(title) = req.title.as_deref() {
            models::validate_title(title).map_err(ApiError::validation)?;
        }
        if let Some(description) = req.description.as_deref() {
            models::validate_description(description).map_err(ApiError::validation)?;
        }
        if let Some(link) = req.github_link.as_deref() {
            models::validate_github_link(link).map_err(ApiError::validation)?;
        }

        self.db
            .update_project_fields(
                project_id,
                req.title.as_deref(),
                req.description.as_deref(),
                req.github_link.as_deref(),
            )
            .await?;

        // Collaborator list replacement is only meaningful for collaborative
        // projects; the creator always stays in as manager.
        if let Some(collaborators) = &req.collaborators {
            if project.project_type == ProjectType::Collaborative.as_str() {
                let normalized = self
                    .normalize_collaborators(project.created_by, collaborators)
                    .await?;
                self.db.replace_collaborators(project_id, &normalized).await?;
            }
        }

        self.view(project_id, None).await
    }

    /// Delete the project and cascade its tasks. The cascade and the project
    /// row removal commit together; a failure rolls back everything.
    pub async fn delete(&self, project_id: i64, caller_id: i64) -> Result<u64, ApiError> {
        let (project, _, acl) = self.load_visible(project_id, caller_id).await?;
        self.require_owner_or_manager(&project, &acl, caller_id, "delete")?;

        let tasks_deleted = self.db.delete_project_cascade(project_id).await?;
        tracing::info!(project_id, tasks_deleted, "project deleted");
        Ok(tasks_deleted)
    }

    // ========== Custom boards ==========

    pub async fn add_board(
        &self,
        project_id: i64,
        caller_id: i64,
        name: &str,
    ) -> Result<BoardView, ApiError> {
        // Any project member may add a board.
        self.load_visible(project_id, caller_id).await?;

        let name = name.trim();
        if name.is_empty() {
            return Err(ApiError::validation("Board name is required"));
        }
        let board_id = models::slugify(name);
        if board_id.is_empty() {
            return Err(ApiError::validation(
                "Board name must contain at least one letter or number",
            ));
        }
        if models::is_default_board(&board_id) {
            return Err(ApiError::conflict("A board with this name already exists"));
        }

        self.db.add_board(project_id, &board_id, name).await?;

        Ok(BoardView {
            id: board_id,
            name: name.to_string(),
        })
    }

    pub async fn rename_board(
        &self,
        project_id: i64,
        caller_id: i64,
        board_id: &str,
        name: &str,
    ) -> Result<BoardView, ApiError> {
        self.load_visible(project_id, caller_id).await?;

        let name = name.trim();
        if name.is_empty() {
            return Err(ApiError::validation("Board name is required"));
        }

        let renamed = self.db.rename_board(project_id, board_id, name).await?;
        if !renamed {
            return Err(ApiError::not_found("Board not found"));
        }

        Ok(BoardView {
            id: board_id.to_string(),
            name: name.to_string(),
        })
    }

    /// Deleting a board moves its tasks back to `todo` in the same
    /// transaction, so no task is ever left on a board that no longer
    /// exists.
    pub async fn delete_board(
        &self,
        project_id: i64,
        caller_id: i64,
        board_id: &str,
    ) -> Result<(), ApiError> {
        self.load_visible(project_id, caller_id).await?;

        let deleted = self.db.delete_board_and_reassign(project_id, board_id).await?;
        if !deleted {
            return Err(ApiError::not_found("Board not found"));
        }
        Ok(())
    }

    // ========== Collaborators ==========

    pub async fn add_collaborator(
        &self,
        project_id: i64,
        caller: &UserRow,
        user_id: i64,
        role: Role,
    ) -> Result<ProjectView, ApiError> {
        let (project, _, acl) = self.load_visible(project_id, caller.id).await?;

        if !acl.has_manager_access(caller.id) {
            return Err(ApiError::forbidden(
                "Only project managers can add collaborators",
            ));
        }

        let user = match self.db.get_user_by_id(user_id).await {
            Ok(user) => user,
            Err(DatabaseError::NotFound(_)) => {
                return Err(ApiError::validation("User not found"));
            }
            Err(e) => return Err(e.into()),
        };

        self.db.add_collaborator(project_id, user_id, role).await?;

        dispatch(
            self.notifier.clone(),
            Notification::CollaboratorAdded {
                email: user.email,
                full_name: user.full_name,
                project_title: project.title.clone(),
                role: role.as_str().to_string(),
                inviter: caller.full_name.clone(),
            },
        );

        self.view(project_id, None).await
    }

    pub async fn remove_collaborator(
        &self,
        project_id: i64,
        caller_id: i64,
        collaborator_id: i64,
    ) -> Result<ProjectView, ApiError> {
        let (_, _, acl) = self.load_visible(project_id, caller_id).await?;

        if !acl.has_manager_access(caller_id) {
            return Err(ApiError::forbidden(
                "Only project managers can remove collaborators",
            ));
        }
        // Self-removal goes through leave, which enforces the last-manager
        // invariant.
        if collaborator_id == caller_id {
            return Err(ApiError::validation(
                "Use leave to remove yourself from a project",
            ));
        }
        if !acl.is_collaborator(collaborator_id) {
            return Err(ApiError::not_found("Collaborator not found in this project"));
        }

        self.db.remove_collaborator(project_id, collaborator_id).await?;
        self.view(project_id, None).await
    }

    pub async fn leave(&self, project_id: i64, caller_id: i64) -> Result<(), ApiError> {
        let project = self.db.get_project(project_id).await?;

        if project.project_type != ProjectType::Collaborative.as_str() {
            return Err(ApiError::validation("Cannot leave a personal project"));
        }

        let collaborators = self.db.list_collaborators(project_id).await?;
        let acl = ProjectAcl::from_rows(&project, &collaborators);

        let Some(entry) = collaborators.iter().find(|c| c.user_id == caller_id) else {
            return Err(ApiError::not_found(
                "You are not a collaborator in this project",
            ));
        };

        if entry.role == Role::Manager.as_str() && acl.manager_count() <= 1 {
            return Err(ApiError::conflict(
                "Cannot leave project as you are the last manager. \
                 Please assign another manager or delete the project.",
            ));
        }

        self.db.remove_collaborator(project_id, caller_id).await?;
        tracing::info!(project_id, user_id = caller_id, "collaborator left project");
        Ok(())
    }

    // ========== Internals ==========

    /// Load a project with its collaborator rows, treating "no access" the
    /// same as "does not exist".
    pub(crate) async fn load_visible(
        &self,
        project_id: i64,
        caller_id: i64,
    ) -> Result<(ProjectRow, Vec<CollaboratorRow>, ProjectAcl), ApiError> {
        let project = self.db.get_project(project_id).await?;
        let collaborators = self.db.list_collaborators(project_id).await?;
        let acl = ProjectAcl::from_rows(&project, &collaborators);

        if !acl.has_any_access(caller_id) {
            return Err(ApiError::not_found(
                "Project not found or you do not have access",
            ));
        }
        Ok((project, collaborators, acl))
    }

    fn require_owner_or_manager(
        &self,
        project: &ProjectRow,
        acl: &ProjectAcl,
        caller_id: i64,
        action: &str,
    ) -> Result<(), ApiError> {
        if project.project_type == ProjectType::Personal.as_str() {
            if project.created_by != caller_id {
                return Err(ApiError::forbidden(format!(
                    "Only the project creator can {} personal projects",
                    action
                )));
            }
        } else if !acl.has_manager_access(caller_id) {
            return Err(ApiError::forbidden(format!(
                "Only Project Managers can {} the project",
                action
            )));
        }
        Ok(())
    }

    /// Dedupe the requested collaborator list and pin the owner in front as
    /// manager, so the >=1-manager invariant holds structurally.
    async fn normalize_collaborators(
        &self,
        owner_id: i64,
        requested: &[CollaboratorInput],
    ) -> Result<Vec<(i64, Role)>, ApiError> {
        let mut normalized: Vec<(i64, Role)> = vec![(owner_id, Role::Manager)];
        for input in requested {
            if input.user_id == owner_id {
                continue;
            }
            if normalized.iter().any(|(id, _)| *id == input.user_id) {
                continue;
            }
            match self.db.get_user_by_id(input.user_id).await {
                Ok(_) => normalized.push((input.user_id, input.role)),
                Err(DatabaseError::NotFound(_)) => {
                    return Err(ApiError::validation(format!(
                        "Collaborator user {} not found",
                        input.user_id
                    )));
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(normalized)
    }

    async fn notify_collaborators(
        &self,
        project_id: i64,
        title: &str,
        creator: &UserRow,
    ) -> Result<(), ApiError> {
        let collaborators = self.db.list_collaborators(project_id).await?;
        for collab in collaborators.into_iter().filter(|c| c.user_id != creator.id) {
            dispatch(
                self.notifier.clone(),
                Notification::CollaboratorAdded {
                    email: collab.email,
                    full_name: collab.full_name,
                    project_title: title.to_string(),
                    role: collab.role,
                    inviter: creator.full_name.clone(),
                },
            );
        }
        Ok(())
    }

    async fn view(&self, project_id: i64, caller_id: Option<i64>) -> Result<ProjectView, ApiError> {
        let project = self.db.get_project(project_id).await?;
        self.assemble_view(project, caller_id).await
    }

    async fn assemble_view(
        &self,
        project: ProjectRow,
        caller_id: Option<i64>,
    ) -> Result<ProjectView, ApiError> {
        let collaborators = self.db.list_collaborators(project.id).await?;
        let boards = self.db.list_boards(project.id).await?;
        let creator = self.db.get_user_by_id(project.created_by).await?;

        let current_user_role = caller_id.map(|caller| {
            let acl = ProjectAcl::from_rows(&project, &collaborators);
            acl.role_of(caller)
        });

        Ok(ProjectView {
            id: project.id,
            short_id: project.short_id,
            title: project.title,
            description: project.description,
            github_link: project.github_link,
            project_type: ProjectType::parse(&project.project_type)
                .unwrap_or(ProjectType::Personal),
            status: project.status,
            created_by: UserSummary::from(creator),
            collaborators: collaborators.into_iter().map(CollaboratorView::from).collect(),
            custom_boards: boards.into_iter().map(BoardView::from).collect(),
            created_at: project.created_at,
            updated_at: project.updated_at,
            current_user_role: current_user_role.flatten(),
        })
    }
}

fn generate_short_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SHORT_ID_LEN)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_ids_are_eight_alphanumeric_chars() {
        for _ in 0..32 {
            let id = generate_short_id();
            assert_eq!(id.len(), SHORT_ID_LEN);
            assert!(id.chars().all(|c| c.is_ascii_alphanumeric()));
        }
    }
}
