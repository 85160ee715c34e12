pub mod projects;
pub mod tasks;
pub mod todos;

pub use projects::ProjectService;
pub use tasks::TaskService;
pub use todos::TodoService;
