//! HTTP API
//!
//! Route table and handlers. Handlers stay thin: extract, delegate to a
//! service, serialize. All authorization decisions live in the services.
//!
//! - `POST /api/auth/...` - signup/OTP/login/password flows
//! - `GET/POST/PUT/DELETE /api/projects...` - projects, boards, collaborators
//! - `GET/POST/PATCH/PUT/DELETE /api/tasks...` - tasks and comments
//! - `GET /api/users/search` - collaborator lookup
//! - `/api/todos` - personal todo list

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::auth::{
    AuthResponse, AuthService, AuthUser, Availability, CheckEmailRequest, CheckUsernameRequest,
    ForgotPasswordRequest, LoginRequest, ResendOtpRequest, ResetPasswordRequest, SignupRequest,
    UpdateProfileRequest, VerifyOtpRequest,
};
use crate::config::Config;
use crate::database::Database;
use crate::error::ApiError;
use crate::models::{
    AddCollaboratorRequest, AddCommentRequest, BoardRequest, BoardView, CreateProjectRequest,
    CreateTaskRequest, CreateTodoRequest, ProjectView, RemoveCollaboratorRequest, TaskView,
    TodoView, UpdateProjectRequest, UpdateTaskRequest, UpdateTaskStatusRequest, UpdateTodoRequest,
    UserSummary,
};
use crate::notify::Notifier;
use crate::services::{ProjectService, TaskService, TodoService};

#[derive(Clone)]
pub struct AppState {
    pub auth: AuthService,
    pub projects: ProjectService,
    pub tasks: TaskService,
    pub todos: TodoService,
}

impl AppState {
    pub fn new(db: Database, notifier: Arc<dyn Notifier>, config: Config) -> Self {
        Self {
            auth: AuthService::new(db.clone(), notifier.clone(), config),
            projects: ProjectService::new(db.clone(), notifier),
            tasks: TaskService::new(db.clone()),
            todos: TodoService::new(db),
        }
    }
}

/// Build the API routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        // Auth
        .route("/auth/check-username", post(check_username))
        .route("/auth/check-email", post(check_email))
        .route("/auth/signup", post(signup))
        .route("/auth/verify-otp", post(verify_otp))
        .route("/auth/resend-otp", post(resend_otp))
        .route("/auth/login", post(login))
        .route("/auth/forgot-password", post(forgot_password))
        .route("/auth/reset-password/{token}", post(reset_password))
        .route("/auth/me", get(me))
        .route("/auth/profile", put(update_profile))
        .route("/auth/delete-account", delete(delete_account))
        // Users
        .route("/users/search", get(search_users))
        // Projects
        .route("/projects", get(list_projects).post(create_project))
        .route(
            "/projects/{id}",
            get(get_project).put(update_project).delete(delete_project),
        )
        .route("/projects/{id}/boards", post(add_board))
        .route(
            "/projects/{id}/boards/{boardId}",
            put(rename_board).delete(delete_board),
        )
        .route("/projects/{id}/collaborators", post(add_collaborator))
        .route("/projects/{id}/collaborators/remove", post(remove_collaborator))
        .route("/projects/{id}/leave", post(leave_project))
        // Tasks
        .route("/projects/{projectId}/tasks", get(list_tasks))
        .route("/tasks", post(create_task))
        .route(
            "/tasks/{id}",
            get(get_task)
                .patch(update_task_status)
                .put(update_task)
                .delete(delete_task),
        )
        .route("/tasks/{id}/comments", post(add_comment))
        // Todos
        .route("/todos", get(list_todos).post(create_todo))
        .route("/todos/{id}", put(update_todo).delete(delete_todo))
}

// ========== Auth handlers ==========

async fn check_username(
    State(state): State<AppState>,
    Json(req): Json<CheckUsernameRequest>,
) -> Result<Json<Availability>, ApiError> {
    Ok(Json(state.auth.check_username(&req.username).await?))
}

async fn check_email(
    State(state): State<AppState>,
    Json(req): Json<CheckEmailRequest>,
) -> Result<Json<Availability>, ApiError> {
    Ok(Json(state.auth.check_email(&req.email).await?))
}

async fn signup(
    State(state): State<AppState>,
    Json(req): Json<SignupRequest>,
) -> Result<Json<Value>, ApiError> {
    state.auth.signup(req).await?;
    Ok(Json(json!({
        "message": "Verification code sent to your email"
    })))
}

async fn verify_otp(
    State(state): State<AppState>,
    Json(req): Json<VerifyOtpRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), ApiError> {
    let response = state.auth.verify_otp(req).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

async fn resend_otp(
    State(state): State<AppState>,
    Json(req): Json<ResendOtpRequest>,
) -> Result<Json<Value>, ApiError> {
    state.auth.resend_otp(&req.email).await?;
    Ok(Json(json!({
        "message": "Verification code sent to your email"
    })))
}

async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    Ok(Json(state.auth.login(req).await?))
}

async fn forgot_password(
    State(state): State<AppState>,
    Json(req): Json<ForgotPasswordRequest>,
) -> Result<Json<Value>, ApiError> {
    state.auth.forgot_password(&req.email).await?;
    Ok(Json(json!({
        "message": "If that email is registered, a reset link has been sent"
    })))
}

async fn reset_password(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Json(req): Json<ResetPasswordRequest>,
) -> Result<Json<Value>, ApiError> {
    state.auth.reset_password(&token, &req.password).await?;
    Ok(Json(json!({ "message": "Password reset successfully" })))
}

async fn me(AuthUser(user): AuthUser) -> Json<UserSummary> {
    Json(UserSummary::from(user))
}

async fn update_profile(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<Json<UserSummary>, ApiError> {
    Ok(Json(state.auth.update_profile(&user, req).await?))
}

async fn delete_account(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<Value>, ApiError> {
    state.auth.delete_account(user.id).await?;
    Ok(Json(json!({ "message": "Account deleted successfully" })))
}

// ========== User handlers ==========

#[derive(Debug, Deserialize)]
struct SearchQuery {
    #[serde(rename = "searchTerm", alias = "query", default)]
    search_term: String,
}

async fn search_users(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<UserSummary>>, ApiError> {
    Ok(Json(
        state.auth.search_users(&query.search_term, user.id).await?,
    ))
}

// ========== Project handlers ==========

async fn list_projects(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<Vec<ProjectView>>, ApiError> {
    Ok(Json(state.projects.list(user.id).await?))
}

async fn get_project(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<ProjectView>, ApiError> {
    Ok(Json(state.projects.get(id, user.id).await?))
}

async fn create_project(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(req): Json<CreateProjectRequest>,
) -> Result<(StatusCode, Json<ProjectView>), ApiError> {
    let project = state.projects.create(&user, req).await?;
    Ok((StatusCode::CREATED, Json(project)))
}

async fn update_project(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<i64>,
    Json(req): Json<UpdateProjectRequest>,
) -> Result<Json<ProjectView>, ApiError> {
    Ok(Json(state.projects.update(id, user.id, req).await?))
}

async fn delete_project(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    state.projects.delete(id, user.id).await?;
    Ok(Json(json!({
        "message": "Project and associated tasks deleted successfully"
    })))
}

async fn add_board(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<i64>,
    Json(req): Json<BoardRequest>,
) -> Result<Json<BoardView>, ApiError> {
    Ok(Json(state.projects.add_board(id, user.id, &req.name).await?))
}

async fn rename_board(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path((id, board_id)): Path<(i64, String)>,
    Json(req): Json<BoardRequest>,
) -> Result<Json<BoardView>, ApiError> {
    Ok(Json(
        state
            .projects
            .rename_board(id, user.id, &board_id, &req.name)
            .await?,
    ))
}

async fn delete_board(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path((id, board_id)): Path<(i64, String)>,
) -> Result<Json<Value>, ApiError> {
    state.projects.delete_board(id, user.id, &board_id).await?;
    Ok(Json(json!({ "message": "Board deleted successfully" })))
}

async fn add_collaborator(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<i64>,
    Json(req): Json<AddCollaboratorRequest>,
) -> Result<Json<Value>, ApiError> {
    let project = state
        .projects
        .add_collaborator(id, &user, req.user_id, req.role)
        .await?;
    Ok(Json(json!({
        "message": "Collaborator added successfully",
        "project": project
    })))
}

async fn remove_collaborator(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<i64>,
    Json(req): Json<RemoveCollaboratorRequest>,
) -> Result<Json<Value>, ApiError> {
    let project = state
        .projects
        .remove_collaborator(id, user.id, req.collaborator_id)
        .await?;
    Ok(Json(json!({
        "message": "Collaborator removed successfully",
        "project": project
    })))
}

async fn leave_project(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    state.projects.leave(id, user.id).await?;
    Ok(Json(json!({ "message": "Successfully left the project" })))
}

// ========== Task handlers ==========

async fn list_tasks(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(project_id): Path<i64>,
) -> Result<Json<Vec<TaskView>>, ApiError> {
    Ok(Json(state.tasks.list_by_project(project_id, user.id).await?))
}

async fn get_task(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<TaskView>, ApiError> {
    Ok(Json(state.tasks.get(id, user.id).await?))
}

async fn create_task(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(req): Json<CreateTaskRequest>,
) -> Result<(StatusCode, Json<TaskView>), ApiError> {
    let task = state.tasks.create(user.id, req).await?;
    Ok((StatusCode::CREATED, Json(task)))
}

async fn update_task_status(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<i64>,
    Json(req): Json<UpdateTaskStatusRequest>,
) -> Result<Json<TaskView>, ApiError> {
    Ok(Json(
        state.tasks.update_status(id, user.id, &req.status).await?,
    ))
}

async fn update_task(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<i64>,
    Json(req): Json<UpdateTaskRequest>,
) -> Result<Json<TaskView>, ApiError> {
    Ok(Json(state.tasks.update(id, user.id, req).await?))
}

async fn delete_task(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    state.tasks.delete(id, user.id).await?;
    Ok(Json(json!({ "message": "Task deleted successfully" })))
}

async fn add_comment(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<i64>,
    Json(req): Json<AddCommentRequest>,
) -> Result<Json<TaskView>, ApiError> {
    Ok(Json(state.tasks.add_comment(id, user.id, &req.text).await?))
}

// ========== Todo handlers ==========

async fn list_todos(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<Vec<TodoView>>, ApiError> {
    Ok(Json(state.todos.list(user.id).await?))
}

async fn create_todo(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(req): Json<CreateTodoRequest>,
) -> Result<(StatusCode, Json<TodoView>), ApiError> {
    let todo = state.todos.create(user.id, req).await?;
    Ok((StatusCode::CREATED, Json(todo)))
}

async fn update_todo(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<i64>,
    Json(req): Json<UpdateTodoRequest>,
) -> Result<Json<TodoView>, ApiError> {
    Ok(Json(state.todos.update(id, user.id, req).await?))
}

async fn delete_todo(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    state.todos.delete(id, user.id).await?;
    Ok(Json(json!({ "message": "Todo deleted successfully" })))
}
