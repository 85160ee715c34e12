//! Domain Models
//!
//! Business entities, wire-format DTOs, and field validation. Wire field
//! names are camelCase to match the public API (`projectType`, `createdBy`,
//! `currentUserRole`, ...). Database rows live in `database`; the `From`
//! impls here lift them into API views.

use serde::{Deserialize, Serialize};

use crate::database::{BoardRow, CollaboratorRow, CommentRow, TaskRow, TodoRow, UserRow};

pub const TITLE_MAX: usize = 100;
pub const DESCRIPTION_MAX: usize = 500;
pub const COMMENT_MAX: usize = 1000;
pub const GITHUB_PREFIX: &str = "https://github.com/";

/// Board ids that exist implicitly on every project and are never stored.
pub const DEFAULT_BOARDS: [&str; 3] = ["todo", "doing", "done"];

pub const TASK_TYPES: [&str; 5] = ["tech", "review", "bug", "feature", "documentation"];

// ========== Enums ==========

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Manager,
    Developer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Manager => "manager",
            Role::Developer => "developer",
        }
    }

    pub fn parse(s: &str) -> Option<Role> {
        match s {
            "manager" => Some(Role::Manager),
            "developer" => Some(Role::Developer),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectType {
    Personal,
    Collaborative,
}

impl ProjectType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectType::Personal => "personal",
            ProjectType::Collaborative => "collaborative",
        }
    }

    pub fn parse(s: &str) -> Option<ProjectType> {
        match s {
            "personal" => Some(ProjectType::Personal),
            "collaborative" => Some(ProjectType::Collaborative),
            _ => None,
        }
    }
}

// ========== API views ==========

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: i64,
    pub username: String,
    pub full_name: String,
    pub email: String,
}

impl From<UserRow> for UserSummary {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            username: row.username,
            full_name: row.full_name,
            email: row.email,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollaboratorView {
    pub user_id: UserSummary,
    pub role: Role,
}

impl From<CollaboratorRow> for CollaboratorView {
    fn from(row: CollaboratorRow) -> Self {
        let role = Role::parse(&row.role).unwrap_or(Role::Developer);
        Self {
            user_id: UserSummary {
                id: row.user_id,
                username: row.username,
                full_name: row.full_name,
                email: row.email,
            },
            role,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardView {
    pub id: String,
    pub name: String,
}

impl From<BoardRow> for BoardView {
    fn from(row: BoardRow) -> Self {
        Self {
            id: row.board_id,
            name: row.name,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectView {
    pub id: i64,
    pub short_id: String,
    pub title: String,
    pub description: Option<String>,
    pub github_link: Option<String>,
    pub project_type: ProjectType,
    pub status: String,
    pub created_by: UserSummary,
    pub collaborators: Vec<CollaboratorView>,
    pub custom_boards: Vec<BoardView>,
    pub created_at: String,
    pub updated_at: String,
    /// Derived per request, never stored.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_user_role: Option<Role>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentView {
    pub user: UserSummary,
    pub text: String,
    pub created_at: String,
}

impl From<CommentRow> for CommentView {
    fn from(row: CommentRow) -> Self {
        Self {
            user: UserSummary {
                id: row.user_id,
                username: row.username,
                full_name: row.full_name,
                email: row.email,
            },
            text: row.text,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskView {
    pub id: i64,
    pub serial_number: i64,
    pub title: String,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub task_type: String,
    pub status: String,
    pub deadline: Option<String>,
    pub project_id: i64,
    pub assignee: Option<UserSummary>,
    pub comments: Vec<CommentView>,
    pub created_at: String,
    pub updated_at: String,
}

impl TaskView {
    pub fn from_row(row: TaskRow, assignee: Option<UserSummary>, comments: Vec<CommentView>) -> Self {
        Self {
            id: row.id,
            serial_number: row.serial_number,
            title: row.title,
            description: row.description,
            task_type: row.task_type,
            status: row.status,
            deadline: row.deadline,
            project_id: row.project_id,
            assignee,
            comments,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TodoView {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    pub priority: String,
    pub category: String,
    pub due_date: Option<String>,
    pub status: String,
    pub created_at: String,
}

impl From<TodoRow> for TodoView {
    fn from(row: TodoRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            name: row.name,
            priority: row.priority,
            category: row.category,
            due_date: row.due_date,
            status: row.status,
            created_at: row.created_at,
        }
    }
}

// ========== Request DTOs ==========

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollaboratorInput {
    pub user_id: i64,
    pub role: Role,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProjectRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub github_link: Option<String>,
    pub project_type: Option<ProjectType>,
    #[serde(default)]
    pub collaborators: Vec<CollaboratorInput>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProjectRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub github_link: Option<String>,
    pub collaborators: Option<Vec<CollaboratorInput>>,
}

#[derive(Debug, Deserialize)]
pub struct BoardRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddCollaboratorRequest {
    pub user_id: i64,
    pub role: Role,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveCollaboratorRequest {
    pub collaborator_id: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTaskRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub task_type: Option<String>,
    pub status: Option<String>,
    pub deadline: Option<String>,
    pub project_id: i64,
    pub assignee: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTaskRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub task_type: Option<String>,
    pub status: Option<String>,
    pub deadline: Option<String>,
    pub assignee: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateTaskStatusRequest {
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct AddCommentRequest {
    pub text: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTodoRequest {
    pub name: String,
    pub priority: Option<String>,
    pub category: Option<String>,
    pub due_date: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTodoRequest {
    pub name: Option<String>,
    pub priority: Option<String>,
    pub category: Option<String>,
    pub due_date: Option<String>,
    pub status: Option<String>,
}

// ========== Validation ==========

pub fn validate_title(title: &str) -> Result<(), String> {
    if title.trim().is_empty() {
        return Err("Title is required".to_string());
    }
    if title.len() > TITLE_MAX {
        return Err(format!("Title cannot be more than {} characters", TITLE_MAX));
    }
    Ok(())
}

pub fn validate_description(description: &str) -> Result<(), String> {
    if description.len() > DESCRIPTION_MAX {
        return Err(format!(
            "Description cannot be more than {} characters",
            DESCRIPTION_MAX
        ));
    }
    Ok(())
}

pub fn validate_github_link(link: &str) -> Result<(), String> {
    if link.starts_with(GITHUB_PREFIX) {
        Ok(())
    } else {
        Err("GitHub link must be a valid GitHub URL".to_string())
    }
}

pub fn validate_username(username: &str) -> Result<(), String> {
    if username.len() < 3 {
        return Err("Username must be at least 3 characters long".to_string());
    }
    if username.len() > 20 {
        return Err("Username cannot be more than 20 characters".to_string());
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(
            "Username can only contain letters, numbers, underscores, and hyphens".to_string(),
        );
    }
    Ok(())
}

pub fn validate_email(email: &str) -> Result<(), String> {
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err("Please enter a valid email address".to_string())
    }
}

/// A task type is either one of the predefined types or a custom slug.
pub fn validate_task_type(task_type: &str) -> Result<(), String> {
    if TASK_TYPES.contains(&task_type) {
        return Ok(());
    }
    if !task_type.is_empty()
        && task_type
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Ok(());
    }
    Err(
        "Type must be either a predefined type (tech, review, bug, feature, documentation) \
         or a custom type containing only letters, numbers, hyphens, and underscores"
            .to_string(),
    )
}

pub fn validate_comment(text: &str) -> Result<(), String> {
    if text.trim().is_empty() {
        return Err("Comment text is required".to_string());
    }
    if text.len() > COMMENT_MAX {
        return Err(format!(
            "Comment cannot be more than {} characters",
            COMMENT_MAX
        ));
    }
    Ok(())
}

/// Deadlines travel as strings; accept RFC 3339 or a plain date.
pub fn validate_deadline(deadline: &str) -> Result<(), String> {
    if chrono::DateTime::parse_from_rfc3339(deadline).is_ok()
        || chrono::NaiveDate::parse_from_str(deadline, "%Y-%m-%d").is_ok()
    {
        Ok(())
    } else {
        Err("Deadline must be an RFC 3339 timestamp or a YYYY-MM-DD date".to_string())
    }
}

/// Board ids are slugs of their display name: lowercased, with every run of
/// non-alphanumeric characters collapsed to a single hyphen.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_hyphen = false;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_hyphen = true;
        }
    }
    slug
}

pub fn is_default_board(board_id: &str) -> bool {
    DEFAULT_BOARDS.contains(&board_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_lowercases_and_hyphenates() {
        assert_eq!(slugify("In Review"), "in-review");
        assert_eq!(slugify("  QA / Staging  "), "qa-staging");
        assert_eq!(slugify("Blocked!!!"), "blocked");
        assert_eq!(slugify("v2 Backlog"), "v2-backlog");
    }

    #[test]
    fn slugify_can_produce_reserved_ids() {
        // The caller must reject these explicitly.
        assert_eq!(slugify("To Do"), "to-do");
        assert_eq!(slugify("Done"), "done");
        assert!(is_default_board(&slugify("Done")));
    }

    #[test]
    fn username_rules() {
        assert!(validate_username("ab").is_err());
        assert!(validate_username(&"a".repeat(21)).is_err());
        assert!(validate_username("user name").is_err());
        assert!(validate_username("user.name").is_err());
        assert!(validate_username("user_name-1").is_ok());
    }

    #[test]
    fn task_type_accepts_predefined_and_custom_slugs() {
        assert!(validate_task_type("bug").is_ok());
        assert!(validate_task_type("documentation").is_ok());
        assert!(validate_task_type("infra_cleanup-2").is_ok());
        assert!(validate_task_type("not valid").is_err());
        assert!(validate_task_type("").is_err());
    }

    #[test]
    fn github_link_requires_prefix() {
        assert!(validate_github_link("https://github.com/org/repo").is_ok());
        assert!(validate_github_link("https://gitlab.com/org/repo").is_err());
    }

    #[test]
    fn email_shape() {
        assert!(validate_email("a@b.com").is_ok());
        assert!(validate_email("a b@c.com").is_err());
        assert!(validate_email("nope").is_err());
        assert!(validate_email("a@nodot").is_err());
    }
}
