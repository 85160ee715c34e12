//! Todo Service
//!
//! Personal to-do list, scoped entirely to the calling user.

use crate::database::Database;
use crate::error::ApiError;
use crate::models::{CreateTodoRequest, TodoView, UpdateTodoRequest, validate_deadline};

const PRIORITIES: [&str; 3] = ["Low", "Medium", "High"];
const STATUSES: [&str; 2] = ["Pending", "Done"];

#[derive(Clone)]
pub struct TodoService {
    db: Database,
}

impl TodoService {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn create(&self, caller_id: i64, req: CreateTodoRequest) -> Result<TodoView, ApiError> {
        let name = req.name.trim();
        if name.is_empty() {
            return Err(ApiError::validation("Todo name is required"));
        }

        let priority = req.priority.as_deref().unwrap_or("Low");
        check_one_of(priority, &PRIORITIES, "priority")?;
        let status = req.status.as_deref().unwrap_or("Pending");
        check_one_of(status, &STATUSES, "status")?;
        if let Some(due) = req.due_date.as_deref() {
            validate_deadline(due).map_err(ApiError::validation)?;
        }
        let category = req.category.as_deref().unwrap_or("General");

        let row = self
            .db
            .insert_todo(caller_id, name, priority, category, req.due_date.as_deref(), status)
            .await?;
        Ok(TodoView::from(row))
    }

    pub async fn list(&self, caller_id: i64) -> Result<Vec<TodoView>, ApiError> {
        let rows = self.db.list_todos(caller_id).await?;
        Ok(rows.into_iter().map(TodoView::from).collect())
    }

    pub async fn update(
        &self,
        todo_id: i64,
        caller_id: i64,
        req: UpdateTodoRequest,
    ) -> Result<TodoView, ApiError> {
        if let Some(name) = req.name.as_deref() {
            if name.trim().is_empty() {
                return Err(ApiError::validation("Todo name is required"));
            }
        }
        if let Some(priority) = req.priority.as_deref() {
            check_one_of(priority, &PRIORITIES, "priority")?;
        }
        if let Some(status) = req.status.as_deref() {
            check_one_of(status, &STATUSES, "status")?;
        }
        if let Some(due) = req.due_date.as_deref() {
            validate_deadline(due).map_err(ApiError::validation)?;
        }

        let updated = self
            .db
            .update_todo(
                todo_id,
                caller_id,
                req.name.as_deref().map(str::trim),
                req.priority.as_deref(),
                req.category.as_deref(),
                req.due_date.as_deref(),
                req.status.as_deref(),
            )
            .await?;
        if !updated {
            return Err(ApiError::not_found("Todo not found"));
        }

        let row = self.db.get_todo(todo_id, caller_id).await?;
        Ok(TodoView::from(row))
    }

    pub async fn delete(&self, todo_id: i64, caller_id: i64) -> Result<(), ApiError> {
        let deleted = self.db.delete_todo(todo_id, caller_id).await?;
        if !deleted {
            return Err(ApiError::not_found("Todo not found"));
        }
        Ok(())
    }
}

fn check_one_of(value: &str, allowed: &[&str], field: &str) -> Result<(), ApiError> {
    if allowed.contains(&value) {
        Ok(())
    } else {
        Err(ApiError::validation(format!(
            "Invalid {}: must be one of {}",
            field,
            allowed.join(", ")
        )))
    }
}
