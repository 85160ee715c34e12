//! Task Service
//!
//! Task CRUD, the status state machine, and comments. Status transitions are
//! free-form between any two valid states; validity means "this board exists
//! for the owning project" (the three defaults plus its custom boards), so
//! the project is always loaded fresh to validate a transition.

use crate::authz::ProjectAcl;
use crate::database::{CollaboratorRow, Database, DatabaseError, ProjectRow, TaskRow};
use crate::error::ApiError;
use crate::models::{
    self, CommentView, CreateTaskRequest, ProjectType, TaskView, UpdateTaskRequest, UserSummary,
};

#[derive(Clone)]
pub struct TaskService {
    db: Database,
}

impl TaskService {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn list_by_project(
        &self,
        project_id: i64,
        caller_id: i64,
    ) -> Result<Vec<TaskView>, ApiError> {
        self.load_visible_project(project_id, caller_id).await?;

        let rows = self.db.list_tasks_by_project(project_id).await?;
        let mut views = Vec::with_capacity(rows.len());
        for row in rows {
            views.push(self.assemble_view(row).await?);
        }
        Ok(views)
    }

    pub async fn get(&self, task_id: i64, caller_id: i64) -> Result<TaskView, ApiError> {
        let task = self.db.get_task(task_id).await?;
        let (_, _, acl) = self.load_project(task.project_id).await?;

        if !acl.has_any_access(caller_id) {
            return Err(ApiError::forbidden(
                "You do not have permission to view this task",
            ));
        }
        self.assemble_view(task).await
    }

    pub async fn create(
        &self,
        caller_id: i64,
        req: CreateTaskRequest,
    ) -> Result<TaskView, ApiError> {
        let (_, collaborators, acl) =
            self.load_visible_project_for(req.project_id, caller_id).await?;

        if !acl.has_manager_access(caller_id) {
            return Err(ApiError::forbidden("Only project managers can create tasks"));
        }

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
        let task_type = req.task_type.as_deref().unwrap_or("tech");
        if let Err(e) = models::validate_task_type(task_type) {
            details.push(e);
        }
        if let Some(deadline) = req.deadline.as_deref() {
            if let Err(e) = models::validate_deadline(deadline) {
                details.push(e);
            }
        }
        let status = req.status.as_deref().unwrap_or("todo");
        if let Err(e) = self.check_status(req.project_id, status).await? {
            details.push(e);
        }
        if !details.is_empty() {
            return Err(ApiError::validation_details(details));
        }

        if let Some(assignee) = req.assignee {
            require_collaborator(&collaborators, assignee)?;
        }

        let task_id = self
            .db
            .insert_task(
                req.project_id,
                &title,
                req.description.as_deref(),
                task_type,
                status,
                req.deadline.as_deref(),
                req.assignee,
            )
            .await?;

        tracing::info!(task_id, project_id = req.project_id, "task created");

        let task = self.db.get_task(task_id).await?;
        self.assemble_view(task).await
    }

    /// The single concurrent-write path. Idempotent: re-applying the current
    /// status is a no-op success.
    pub async fn update_status(
        &self,
        task_id: i64,
        caller_id: i64,
        status: &str,
    ) -> Result<TaskView, ApiError> {
        let task = self.db.get_task(task_id).await?;
        let (project, _, acl) = self.load_project(task.project_id).await?;

        if !acl.has_any_access(caller_id) {
            return Err(ApiError::forbidden(
                "You do not have permission to update this task",
            ));
        }
        // On collaborative projects only developers and managers may move
        // tasks, a stricter gate than plain visibility.
        if project.project_type == ProjectType::Collaborative.as_str()
            && acl.role_of(caller_id).is_none()
        {
            return Err(ApiError::forbidden(
                "Only project members (developers and managers) can update task status",
            ));
        }

        if let Err(msg) = self.check_status(task.project_id, status).await? {
            return Err(ApiError::validation(msg));
        }

        if task.status != status {
            self.db.update_task_status(task_id, status).await?;
            tracing::info!(task_id, status, "task status updated");
        }

        let task = self.db.get_task(task_id).await?;
        self.assemble_view(task).await
    }

    /// Full update over the allow-listed fields (title, description, type,
    /// deadline, status, assignee). Manager only.
    pub async fn update(
        &self,
        task_id: i64,
        caller_id: i64,
        req: UpdateTaskRequest,
    ) -> Result<TaskView, ApiError> {
        let task = self.db.get_task(task_id).await?;
        let (_, collaborators, acl) = self.load_project(task.project_id).await?;

        if !acl.has_any_access(caller_id) {
            return Err(ApiError::forbidden(
                "You do not have permission to update this task",
            ));
        }
        if !acl.has_manager_access(caller_id) {
            return Err(ApiError::forbidden(
                "Only project managers can update task details",
            ));
        }

        if let Some(title) = req.title.as_deref() {
            models::validate_title(title).map_err(ApiError::validation)?;
        }
        if let Some(description) = req.description.as_deref() {
            models::validate_description(description).map_err(ApiError::validation)?;
        }
        if let Some(task_type) = req.task_type.as_deref() {
            models::validate_task_type(task_type).map_err(ApiError::validation)?;
        }
        if let Some(deadline) = req.deadline.as_deref() {
            models::validate_deadline(deadline).map_err(ApiError::validation)?;
        }
        if let Some(status) = req.status.as_deref() {
            if let Err(msg) = self.check_status(task.project_id, status).await? {
                return Err(ApiError::validation(msg));
            }
        }
        if let Some(assignee) = req.assignee {
            require_collaborator(&collaborators, assignee)?;
        }

        self.db
            .update_task_fields(
                task_id,
                req.title.as_deref(),
                req.description.as_deref(),
                req.task_type.as_deref(),
                req.status.as_deref(),
                req.deadline.as_deref(),
                req.assignee,
            )
            .await?;

        let task = self.db.get_task(task_id).await?;
        self.assemble_view(task).await
    }

    pub async fn delete(&self, task_id: i64, caller_id: i64) -> Result<(), ApiError> {
        let task = self.db.get_task(task_id).await?;
        let (_, _, acl) = self.load_project(task.project_id).await?;

        if !acl.has_manager_access(caller_id) {
            return Err(ApiError::forbidden("Only project managers can delete tasks"));
        }

        self.db.delete_task(task_id).await?;
        tracing::info!(task_id, "task deleted");
        Ok(())
    }

    pub async fn add_comment(
        &self,
        task_id: i64,
        caller_id: i64,
        text: &str,
    ) -> Result<TaskView, ApiError> {
        let task = self.db.get_task(task_id).await?;
        let (_, _, acl) = self.load_project(task.project_id).await?;

        if !acl.has_any_access(caller_id) {
            return Err(ApiError::forbidden(
                "You do not have permission to comment on this task",
            ));
        }

        let text = text.trim();
        models::validate_comment(text).map_err(ApiError::validation)?;

        self.db.add_comment(task_id, caller_id, text).await?;
        self.assemble_view(task).await
    }

    /// Cascade helper for project deletion. Authorization is the invoking
    /// operation's responsibility.
    pub async fn delete_by_project(&self, project_id: i64) -> Result<u64, ApiError> {
        let deleted = self.db.delete_tasks_by_project(project_id).await?;
        tracing::info!(project_id, deleted, "tasks deleted for project");
        Ok(deleted)
    }

    // ========== Internals ==========

    async fn load_project(
        &self,
        project_id: i64,
    ) -> Result<(ProjectRow, Vec<CollaboratorRow>, ProjectAcl), ApiError> {
        let project = self.db.get_project(project_id).await?;
        let collaborators = self.db.list_collaborators(project_id).await?;
        let acl = ProjectAcl::from_rows(&project, &collaborators);
        Ok((project, collaborators, acl))
    }

    /// Load a project, reporting "no access" as not found (used where the
    /// project id comes straight from the client).
    async fn load_visible_project_for(
        &self,
        project_id: i64,
        caller_id: i64,
    ) -> Result<(ProjectRow, Vec<CollaboratorRow>, ProjectAcl), ApiError> {
        let (project, collaborators, acl) = self.load_project(project_id).await?;
        if !acl.has_any_access(caller_id) {
            return Err(ApiError::not_found(
                "Project not found or you do not have access",
            ));
        }
        Ok((project, collaborators, acl))
    }

    async fn load_visible_project(&self, project_id: i64, caller_id: i64) -> Result<(), ApiError> {
        self.load_visible_project_for(project_id, caller_id).await.map(|_| ())
    }

    /// A status is valid when it is one of the three defaults or a custom
    /// board id of the owning project.
    async fn check_status(
        &self,
        project_id: i64,
        status: &str,
    ) -> Result<Result<(), String>, ApiError> {
        if models::is_default_board(status) {
            return Ok(Ok(()));
        }
        let boards = self.db.list_boards(project_id).await?;
        if boards.iter().any(|b| b.board_id == status) {
            return Ok(Ok(()));
        }
        Ok(Err(format!(
            "Invalid status '{}'. Must be one of: todo, doing, done, or a custom board of this project",
            status
        )))
    }

    async fn assemble_view(&self, task: TaskRow) -> Result<TaskView, ApiError> {
        let assignee = match task.assignee {
            Some(user_id) => match self.db.get_user_by_id(user_id).await {
                Ok(user) => Some(UserSummary::from(user)),
                Err(DatabaseError::NotFound(_)) => None,
                Err(e) => return Err(e.into()),
            },
            None => None,
        };

        let comments = self
            .db
            .list_comments(task.id)
            .await?
            .into_iter()
            .map(CommentView::from)
            .collect();

        Ok(TaskView::from_row(task, assignee, comments))
    }
}

fn require_collaborator(collaborators: &[CollaboratorRow], user_id: i64) -> Result<(), ApiError> {
    if collaborators.iter().any(|c| c.user_id == user_id) {
        Ok(())
    } else {
        Err(ApiError::validation(
            "Invalid assignee - must be a project collaborator",
        ))
    }
}
