//! Database Infrastructure Layer
//!
//! Connection handling, schema initialization, and data access for users,
//! sessions, projects, collaborators, boards, tasks, comments, and todos.
//! The unit of atomicity is a single statement; multi-step mutations
//! (cascading deletes, serial assignment, board reassignment) run inside
//! explicit transactions.

use std::ops::Deref;
use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::info;

use crate::models::Role;

#[derive(Debug)]
pub enum DatabaseError {
    Query(sqlx::Error),
    NotFound(String),
    Conflict(String),
}

impl std::fmt::Display for DatabaseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DatabaseError::Query(err) => write!(f, "Database query error: {}", err),
            DatabaseError::NotFound(msg) => write!(f, "{}", msg),
            DatabaseError::Conflict(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for DatabaseError {}

impl From<sqlx::Error> for DatabaseError {
    fn from(err: sqlx::Error) -> Self {
        DatabaseError::Query(err)
    }
}

pub type Result<T> = std::result::Result<T, DatabaseError>;

/// Map a unique-constraint violation to a domain conflict, everything else
/// to a query error.
fn conflict_on_unique(err: sqlx::Error, message: &str) -> DatabaseError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            DatabaseError::Conflict(message.to_string())
        }
        _ => DatabaseError::Query(err),
    }
}

fn not_found_on_missing(err: sqlx::Error, message: &str) -> DatabaseError {
    match err {
        sqlx::Error::RowNotFound => DatabaseError::NotFound(message.to_string()),
        e => DatabaseError::Query(e),
    }
}

// ========== Row types ==========

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserRow {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub password_hash: String,
    pub created_at: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PendingSignupRow {
    pub email: String,
    pub full_name: String,
    pub username: String,
    pub password_hash: String,
    pub otp: String,
    pub expires_at: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProjectRow {
    pub id: i64,
    pub short_id: String,
    pub title: String,
    pub description: Option<String>,
    pub github_link: Option<String>,
    pub project_type: String,
    pub status: String,
    pub created_by: i64,
    pub created_at: String,
    pub updated_at: String,
}

/// Collaborator entry joined with the user's directory fields.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CollaboratorRow {
    pub user_id: i64,
    pub role: String,
    pub username: String,
    pub full_name: String,
    pub email: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct BoardRow {
    pub board_id: String,
    pub name: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TaskRow {
    pub id: i64,
    pub project_id: i64,
    pub serial_number: i64,
    pub title: String,
    pub description: Option<String>,
    pub task_type: String,
    pub status: String,
    pub deadline: Option<String>,
    pub assignee: Option<i64>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CommentRow {
    pub user_id: i64,
    pub username: String,
    pub full_name: String,
    pub email: String,
    pub text: String,
    pub created_at: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TodoRow {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    pub priority: String,
    pub category: String,
    pub due_date: Option<String>,
    pub status: String,
    pub created_at: String,
}

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Deref for Database {
    type Target = SqlitePool;
    fn deref(&self) -> &Self::Target {
        &self.pool
    }
}

impl Database {
    pub async fn new(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(DatabaseError::Query)?
            .create_if_missing(true);

        let pool = SqlitePool::connect_lazy_with(options);

        let db = Self { pool };
        db.initialize_tables().await?;

        info!(database = database_url, "Database initialized");
        Ok(db)
    }

    /// In-memory database on a single connection, for tests. A pooled
    /// `sqlite::memory:` would give every connection its own database.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(DatabaseError::Query)?
            // sqlx turns the foreign_keys pragma on by default; cascades here
            // are explicit and views tolerate dangling references, so keep
            // SQLite's native default (off) as the tests assume.
            .foreign_keys(false);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.initialize_tables().await?;
        Ok(db)
    }

    async fn initialize_tables(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT NOT NULL UNIQUE,
                email TEXT NOT NULL UNIQUE,
                full_name TEXT NOT NULL,
                password_hash TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                token TEXT PRIMARY KEY,
                user_id INTEGER NOT NULL,
                expires_at TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (user_id) REFERENCES users(id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS pending_signups (
                email TEXT PRIMARY KEY,
                full_name TEXT NOT NULL,
                username TEXT NOT NULL,
                password_hash TEXT NOT NULL,
                otp TEXT NOT NULL,
                expires_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS password_resets (
                token TEXT PRIMARY KEY,
                user_id INTEGER NOT NULL,
                expires_at TEXT NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS projects (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                short_id TEXT NOT NULL UNIQUE,
                title TEXT NOT NULL,
                description TEXT,
                github_link TEXT,
                project_type TEXT NOT NULL DEFAULT 'personal',
                status TEXT NOT NULL DEFAULT 'active',
                created_by INTEGER NOT NULL,
                created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (created_by) REFERENCES users(id),
                UNIQUE(created_by, title)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS project_collaborators (
                project_id INTEGER NOT NULL,
                user_id INTEGER NOT NULL,
                role TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                PRIMARY KEY (project_id, user_id),
                FOREIGN KEY (project_id) REFERENCES projects(id),
                FOREIGN KEY (user_id) REFERENCES users(id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS project_boards (
                project_id INTEGER NOT NULL,
                board_id TEXT NOT NULL,
                name TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                PRIMARY KEY (project_id, board_id),
                FOREIGN KEY (project_id) REFERENCES projects(id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS tasks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                project_id INTEGER NOT NULL,
                serial_number INTEGER NOT NULL,
                title TEXT NOT NULL,
                description TEXT,
                task_type TEXT NOT NULL DEFAULT 'tech',
                status TEXT NOT NULL DEFAULT 'todo',
                deadline TEXT,
                assignee INTEGER,
                created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (project_id) REFERENCES projects(id),
                FOREIGN KEY (assignee) REFERENCES users(id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS task_comments (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                task_id INTEGER NOT NULL,
                user_id INTEGER NOT NULL,
                text TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (task_id) REFERENCES tasks(id),
                FOREIGN KEY (user_id) REFERENCES users(id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS todos (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                name TEXT NOT NULL,
                priority TEXT NOT NULL DEFAULT 'Low',
                category TEXT NOT NULL DEFAULT 'General',
                due_date TEXT,
                status TEXT NOT NULL DEFAULT 'Pending',
                created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (user_id) REFERENCES users(id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_projects_created_by ON projects(created_by)")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_collaborators_user_id ON project_collaborators(user_id)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_tasks_project_status ON tasks(project_id, status)")
            .execute(&self.pool)
            .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_tasks_assignee ON tasks(assignee)")
            .execute(&self.pool)
            .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_comments_task_id ON task_comments(task_id)")
            .execute(&self.pool)
            .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_todos_user_id ON todos(user_id)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    // ========== User Operations ==========

    pub async fn create_user(
        &self,
        username: &str,
        email: &str,
        full_name: &str,
        password_hash: &str,
    ) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO users (username, email, full_name, password_hash)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(username)
        .bind(email)
        .bind(full_name)
        .bind(password_hash)
        .execute(&self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, "User with this email or username already exists"))?;

        Ok(result.last_insert_rowid())
    }

    pub async fn get_user_by_id(&self, id: i64) -> Result<UserRow> {
        sqlx::query_as::<_, UserRow>(
            "SELECT id, username, email, full_name, password_hash, created_at FROM users WHERE id = ?",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| not_found_on_missing(e, "User not found"))
    }

    pub async fn find_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        sqlx::query_as::<_, UserRow>(
            "SELECT id, username, email, full_name, password_hash, created_at FROM users WHERE username = ?",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::Query)
    }

    pub async fn find_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        sqlx::query_as::<_, UserRow>(
            "SELECT id, username, email, full_name, password_hash, created_at FROM users WHERE email = ?",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::Query)
    }

    /// Case-insensitive substring search over username and email, excluding
    /// the given user.
    pub async fn search_users(
        &self,
        term: &str,
        exclude_user_id: i64,
        limit: i64,
    ) -> Result<Vec<UserRow>> {
        let pattern = format!("%{}%", term.to_lowercase());
        sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, username, email, full_name, password_hash, created_at
            FROM users
            WHERE id != ? AND (lower(username) LIKE ? OR lower(email) LIKE ?)
            ORDER BY username
            LIMIT ?
            "#,
        )
        .bind(exclude_user_id)
        .bind(&pattern)
        .bind(&pattern)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::Query)
    }

    pub async fn update_user_profile(
        &self,
        id: i64,
        full_name: &str,
        username: &str,
        email: &str,
    ) -> Result<()> {
        sqlx::query("UPDATE users SET full_name = ?, username = ?, email = ? WHERE id = ?")
            .bind(full_name)
            .bind(username)
            .bind(email)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| conflict_on_unique(e, "Username or email is already taken"))?;
        Ok(())
    }

    pub async fn update_user_password(&self, id: i64, password_hash: &str) -> Result<()> {
        sqlx::query("UPDATE users SET password_hash = ? WHERE id = ?")
            .bind(password_hash)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Remove a user and everything they own: todos, sessions, reset tokens,
    /// the projects they created (with their tasks, comments, boards and
    /// collaborator entries), their membership in other projects, their
    /// comments, and their task assignments.
    pub async fn delete_user_cascade(&self, user_id: i64) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM todos WHERE user_id = ?")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM sessions WHERE user_id = ?")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM password_resets WHERE user_id = ?")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            DELETE FROM task_comments WHERE task_id IN (
                SELECT id FROM tasks WHERE project_id IN (
                    SELECT id FROM projects WHERE created_by = ?
                )
            )
            "#,
        )
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "DELETE FROM tasks WHERE project_id IN (SELECT id FROM projects WHERE created_by = ?)",
        )
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "DELETE FROM project_boards WHERE project_id IN (SELECT id FROM projects WHERE created_by = ?)",
        )
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "DELETE FROM project_collaborators WHERE project_id IN (SELECT id FROM projects WHERE created_by = ?)",
        )
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM projects WHERE created_by = ?")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM project_collaborators WHERE user_id = ?")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM task_comments WHERE user_id = ?")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("UPDATE tasks SET assignee = NULL WHERE assignee = ?")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    // ========== Session Operations ==========

    pub async fn create_session(&self, token: &str, user_id: i64, expires_at: &str) -> Result<()> {
        sqlx::query("INSERT INTO sessions (token, user_id, expires_at) VALUES (?, ?, ?)")
            .bind(token)
            .bind(user_id)
            .bind(expires_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn session_user(&self, token: &str) -> Result<Option<UserRow>> {
        sqlx::query_as::<_, UserRow>(
            r#"
            SELECT u.id, u.username, u.email, u.full_name, u.password_hash, u.created_at
            FROM sessions s
            JOIN users u ON u.id = s.user_id
            WHERE s.token = ? AND s.expires_at > datetime('now')
            "#,
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::Query)
    }

    pub async fn delete_sessions_for_user(&self, user_id: i64) -> Result<()> {
        sqlx::query("DELETE FROM sessions WHERE user_id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // ========== Pending Signup Operations ==========

    /// Last write wins for concurrent signups on the same email. Expired
    /// rows are swept opportunistically on every insert.
    pub async fn upsert_pending_signup(
        &self,
        email: &str,
        full_name: &str,
        username: &str,
        password_hash: &str,
        otp: &str,
        expires_at: &str,
    ) -> Result<()> {
        sqlx::query("DELETE FROM pending_signups WHERE expires_at <= datetime('now')")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            r#"
            INSERT OR REPLACE INTO pending_signups
                (email, full_name, username, password_hash, otp, expires_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(email)
        .bind(full_name)
        .bind(username)
        .bind(password_hash)
        .bind(otp)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn pending_signup(&self, email: &str) -> Result<Option<PendingSignupRow>> {
        sqlx::query_as::<_, PendingSignupRow>(
            r#"
            SELECT email, full_name, username, password_hash, otp, expires_at
            FROM pending_signups
            WHERE email = ?
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::Query)
    }

    pub async fn update_pending_otp(&self, email: &str, otp: &str, expires_at: &str) -> Result<()> {
        sqlx::query("UPDATE pending_signups SET otp = ?, expires_at = ? WHERE email = ?")
            .bind(otp)
            .bind(expires_at)
            .bind(email)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn delete_pending_signup(&self, email: &str) -> Result<()> {
        sqlx::query("DELETE FROM pending_signups WHERE email = ?")
            .bind(email)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // ========== Password Reset Operations ==========

    pub async fn create_password_reset(
        &self,
        token: &str,
        user_id: i64,
        expires_at: &str,
    ) -> Result<()> {
        sqlx::query("INSERT INTO password_resets (token, user_id, expires_at) VALUES (?, ?, ?)")
            .bind(token)
            .bind(user_id)
            .bind(expires_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Consume a reset token: returns the user id if the token is valid and
    /// unexpired, deleting it either way.
    pub async fn take_password_reset(&self, token: &str) -> Result<Option<i64>> {
        let user_id: Option<i64> = sqlx::query_scalar(
            "SELECT user_id FROM password_resets WHERE token = ? AND expires_at > datetime('now')",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        sqlx::query("DELETE FROM password_resets WHERE token = ?")
            .bind(token)
            .execute(&self.pool)
            .await?;

        Ok(user_id)
    }

    // ========== Project Operations ==========

    pub async fn insert_project(
        &self,
        short_id: &str,
        title: &str,
        description: Option<&str>,
        github_link: Option<&str>,
        project_type: &str,
        created_by: i64,
    ) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO projects (short_id, title, description, github_link, project_type, created_by)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(short_id)
        .bind(title)
        .bind(description)
        .bind(github_link)
        .bind(project_type)
        .bind(created_by)
        .execute(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                if db.message().contains("projects.short_id") {
                    DatabaseError::Conflict("Short id collision".to_string())
                } else {
                    DatabaseError::Conflict(
                        "You already have a project with this title".to_string(),
                    )
                }
            }
            _ => DatabaseError::Query(e),
        })?;

        Ok(result.last_insert_rowid())
    }

    pub async fn get_project(&self, id: i64) -> Result<ProjectRow> {
        sqlx::query_as::<_, ProjectRow>(
            r#"
            SELECT id, short_id, title, description, github_link, project_type,
                   status, created_by, created_at, updated_at
            FROM projects
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| not_found_on_missing(e, "Project not found or you do not have access"))
    }

    /// Projects the user created or collaborates on, newest first.
    pub async fn list_projects_for_user(&self, user_id: i64) -> Result<Vec<ProjectRow>> {
        sqlx::query_as::<_, ProjectRow>(
            r#"
            SELECT id, short_id, title, description, github_link, project_type,
                   status, created_by, created_at, updated_at
            FROM projects
            WHERE created_by = ?
               OR id IN (SELECT project_id FROM project_collaborators WHERE user_id = ?)
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(user_id)
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::Query)
    }

    pub async fn update_project_fields(
        &self,
        id: i64,
        title: Option<&str>,
        description: Option<&str>,
        github_link: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE projects
            SET title = COALESCE(?, title),
                description = COALESCE(?, description),
                github_link = COALESCE(?, github_link),
                updated_at = datetime('now')
            WHERE id = ?
            "#,
        )
        .bind(title)
        .bind(description)
        .bind(github_link)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, "You already have a project with this title"))?;
        Ok(())
    }

    /// Delete a project together with its tasks, comments, boards, and
    /// collaborator entries in one transaction. Nothing commits unless
    /// every step succeeds, so no orphaned tasks can remain.
    pub async fn delete_project_cascade(&self, id: i64) -> Result<u64> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "DELETE FROM task_comments WHERE task_id IN (SELECT id FROM tasks WHERE project_id = ?)",
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;

        let tasks_deleted = sqlx::query("DELETE FROM tasks WHERE project_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        sqlx::query("DELETE FROM project_boards WHERE project_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM project_collaborators WHERE project_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM projects WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(tasks_deleted)
    }

    // ========== Collaborator Operations ==========

    pub async fn list_collaborators(&self, project_id: i64) -> Result<Vec<CollaboratorRow>> {
        sqlx::query_as::<_, CollaboratorRow>(
            r#"
            SELECT c.user_id, c.role, u.username, u.full_name, u.email
            FROM project_collaborators c
            JOIN users u ON u.id = c.user_id
            WHERE c.project_id = ?
            ORDER BY c.rowid
            "#,
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::Query)
    }

    pub async fn add_collaborator(&self, project_id: i64, user_id: i64, role: Role) -> Result<()> {
        sqlx::query(
            "INSERT INTO project_collaborators (project_id, user_id, role) VALUES (?, ?, ?)",
        )
        .bind(project_id)
        .bind(user_id)
        .bind(role.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, "User is already a collaborator in this project"))?;
        Ok(())
    }

    pub async fn remove_collaborator(&self, project_id: i64, user_id: i64) -> Result<bool> {
        let result =
            sqlx::query("DELETE FROM project_collaborators WHERE project_id = ? AND user_id = ?")
                .bind(project_id)
                .bind(user_id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Replace the collaborator set wholesale (collaborative projects only;
    /// the service layer guarantees the creator stays in as manager).
    pub async fn replace_collaborators(
        &self,
        project_id: i64,
        collaborators: &[(i64, Role)],
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM project_collaborators WHERE project_id = ?")
            .bind(project_id)
            .execute(&mut *tx)
            .await?;

        for (user_id, role) in collaborators {
            sqlx::query(
                "INSERT INTO project_collaborators (project_id, user_id, role) VALUES (?, ?, ?)",
            )
            .bind(project_id)
            .bind(user_id)
            .bind(role.as_str())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    // ========== Board Operations ==========

    pub async fn list_boards(&self, project_id: i64) -> Result<Vec<BoardRow>> {
        sqlx::query_as::<_, BoardRow>(
            "SELECT board_id, name FROM project_boards WHERE project_id = ? ORDER BY rowid",
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::Query)
    }

    pub async fn add_board(&self, project_id: i64, board_id: &str, name: &str) -> Result<()> {
        sqlx::query("INSERT INTO project_boards (project_id, board_id, name) VALUES (?, ?, ?)")
            .bind(project_id)
            .bind(board_id)
            .bind(name)
            .execute(&self.pool)
            .await
            .map_err(|e| conflict_on_unique(e, "A board with this name already exists"))?;
        Ok(())
    }

    pub async fn rename_board(&self, project_id: i64, board_id: &str, name: &str) -> Result<bool> {
        let result =
            sqlx::query("UPDATE project_boards SET name = ? WHERE project_id = ? AND board_id = ?")
                .bind(name)
                .bind(project_id)
                .bind(board_id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete a custom board and move every task sitting on it back to
    /// `todo`, atomically. Returns false if the board does not exist.
    pub async fn delete_board_and_reassign(
        &self,
        project_id: i64,
        board_id: &str,
    ) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let deleted =
            sqlx::query("DELETE FROM project_boards WHERE project_id = ? AND board_id = ?")
                .bind(project_id)
                .bind(board_id)
                .execute(&mut *tx)
                .await?
                .rows_affected();

        if deleted == 0 {
            return Ok(false);
        }

        sqlx::query(
            r#"
            UPDATE tasks
            SET status = 'todo', updated_at = datetime('now')
            WHERE project_id = ? AND status = ?
            "#,
        )
        .bind(project_id)
        .bind(board_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    // ========== Task Operations ==========

    /// Insert a task, assigning the next per-project serial number inside
    /// the same transaction so concurrent creators cannot collide.
    pub async fn insert_task(
        &self,
        project_id: i64,
        title: &str,
        description: Option<&str>,
        task_type: &str,
        status: &str,
        deadline: Option<&str>,
        assignee: Option<i64>,
    ) -> Result<i64> {
        let mut tx = self.pool.begin().await?;

        let serial: i64 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(serial_number), 0) + 1 FROM tasks WHERE project_id = ?",
        )
        .bind(project_id)
        .fetch_one(&mut *tx)
        .await?;

        let result = sqlx::query(
            r#"
            INSERT INTO tasks (project_id, serial_number, title, description, task_type, status, deadline, assignee)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(project_id)
        .bind(serial)
        .bind(title)
        .bind(description)
        .bind(task_type)
        .bind(status)
        .bind(deadline)
        .bind(assignee)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn get_task(&self, id: i64) -> Result<TaskRow> {
        sqlx::query_as::<_, TaskRow>(
            r#"
            SELECT id, project_id, serial_number, title, description, task_type,
                   status, deadline, assignee, created_at, updated_at
            FROM tasks
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| not_found_on_missing(e, "Task not found"))
    }

    pub async fn list_tasks_by_project(&self, project_id: i64) -> Result<Vec<TaskRow>> {
        sqlx::query_as::<_, TaskRow>(
            r#"
            SELECT id, project_id, serial_number, title, description, task_type,
                   status, deadline, assignee, created_at, updated_at
            FROM tasks
            WHERE project_id = ?
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::Query)
    }

    pub async fn update_task_status(&self, id: i64, status: &str) -> Result<()> {
        sqlx::query("UPDATE tasks SET status = ?, updated_at = datetime('now') WHERE id = ?")
            .bind(status)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn update_task_fields(
        &self,
        id: i64,
        title: Option<&str>,
        description: Option<&str>,
        task_type: Option<&str>,
        status: Option<&str>,
        deadline: Option<&str>,
        assignee: Option<i64>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE tasks
            SET title = COALESCE(?, title),
                description = COALESCE(?, description),
                task_type = COALESCE(?, task_type),
                status = COALESCE(?, status),
                deadline = COALESCE(?, deadline),
                assignee = COALESCE(?, assignee),
                updated_at = datetime('now')
            WHERE id = ?
            "#,
        )
        .bind(title)
        .bind(description)
        .bind(task_type)
        .bind(status)
        .bind(deadline)
        .bind(assignee)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn delete_task(&self, id: i64) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM task_comments WHERE task_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM tasks WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Bulk cascade used by project deletion paths. Idempotent: deleting by
    /// filter is safe to retry.
    pub async fn delete_tasks_by_project(&self, project_id: i64) -> Result<u64> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "DELETE FROM task_comments WHERE task_id IN (SELECT id FROM tasks WHERE project_id = ?)",
        )
        .bind(project_id)
        .execute(&mut *tx)
        .await?;

        let deleted = sqlx::query("DELETE FROM tasks WHERE project_id = ?")
            .bind(project_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit().await?;
        Ok(deleted)
    }

    // ========== Comment Operations ==========

    pub async fn add_comment(&self, task_id: i64, user_id: i64, text: &str) -> Result<()> {
        sqlx::query("INSERT INTO task_comments (task_id, user_id, text) VALUES (?, ?, ?)")
            .bind(task_id)
            .bind(user_id)
            .bind(text)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn list_comments(&self, task_id: i64) -> Result<Vec<CommentRow>> {
        sqlx::query_as::<_, CommentRow>(
            r#"
            SELECT c.user_id, u.username, u.full_name, u.email, c.text, c.created_at
            FROM task_comments c
            JOIN users u ON u.id = c.user_id
            WHERE c.task_id = ?
            ORDER BY c.created_at ASC, c.id ASC
            "#,
        )
        .bind(task_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::Query)
    }

    // ========== Todo Operations ==========

    pub async fn insert_todo(
        &self,
        user_id: i64,
        name: &str,
        priority: &str,
        category: &str,
        due_date: Option<&str>,
        status: &str,
    ) -> Result<TodoRow> {
        let result = sqlx::query(
            r#"
            INSERT INTO todos (user_id, name, priority, category, due_date, status)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(user_id)
        .bind(name)
        .bind(priority)
        .bind(category)
        .bind(due_date)
        .bind(status)
        .execute(&self.pool)
        .await?;

        self.get_todo(result.last_insert_rowid(), user_id).await
    }

    pub async fn get_todo(&self, id: i64, user_id: i64) -> Result<TodoRow> {
        sqlx::query_as::<_, TodoRow>(
            r#"
            SELECT id, user_id, name, priority, category, due_date, status, created_at
            FROM todos
            WHERE id = ? AND user_id = ?
            "#,
        )
        .bind(id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| not_found_on_missing(e, "Todo not found"))
    }

    pub async fn list_todos(&self, user_id: i64) -> Result<Vec<TodoRow>> {
        sqlx::query_as::<_, TodoRow>(
            r#"
            SELECT id, user_id, name, priority, category, due_date, status, created_at
            FROM todos
            WHERE user_id = ?
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::Query)
    }

    pub async fn update_todo(
        &self,
        id: i64,
        user_id: i64,
        name: Option<&str>,
        priority: Option<&str>,
        category: Option<&str>,
        due_date: Option<&str>,
        status: Option<&str>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE todos
            SET name = COALESCE(?, name),
                priority = COALESCE(?, priority),
                category = COALESCE(?, category),
                due_date = COALESCE(?, due_date),
                status = COALESCE(?, status)
            WHERE id = ? AND user_id = ?
            "#,
        )
        .bind(name)
        .bind(priority)
        .bind(category)
        .bind(due_date)
        .bind(status)
        .bind(id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn delete_todo(&self, id: i64, user_id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM todos WHERE id = ? AND user_id = ?")
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
