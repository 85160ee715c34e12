pub mod auth;
mod authz;
mod config;
pub mod database;
mod error;
pub mod models;
mod notify;
pub mod services;
mod web;

pub use auth::AuthService;
pub use config::Config;
pub use database::Database;
pub use error::ApiError;
pub use notify::{LogNotifier, Notification, Notifier};
pub use services::{ProjectService, TaskService, TodoService};
pub use web::{AppState, routes};
