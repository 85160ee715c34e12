//! Task integration tests: serial numbers, the status state machine, and
//! role gates for developers versus managers.

use std::sync::Arc;

use taskhub::database::{Database, UserRow};
use taskhub::models::{
    CollaboratorInput, CreateProjectRequest, CreateTaskRequest, ProjectType, Role,
    UpdateTaskRequest,
};
use taskhub::services::{ProjectService, TaskService};
use taskhub::{ApiError, LogNotifier};

struct Fixture {
    db: Database,
    tasks: TaskService,
    manager: UserRow,
    developer: UserRow,
    outsider: UserRow,
    project_id: i64,
}

async fn setup() -> Fixture {
    let db = Database::in_memory().await.unwrap();
    let projects = ProjectService::new(db.clone(), Arc::new(LogNotifier));
    let tasks = TaskService::new(db.clone());

    let manager = user(&db, "alice").await;
    let developer = user(&db, "bob").await;
    let outsider = user(&db, "mallory").await;

    let view = projects
        .create(
            &manager,
            CreateProjectRequest {
                title: Some("Apollo".to_string()),
                description: None,
                github_link: None,
                project_type: Some(ProjectType::Collaborative),
                collaborators: vec![CollaboratorInput {
                    user_id: developer.id,
                    role: Role::Developer,
                }],
            },
        )
        .await
        .unwrap();

    Fixture {
        db,
        tasks,
        manager,
        developer,
        outsider,
        project_id: view.id,
    }
}

async fn user(db: &Database, name: &str) -> UserRow {
    let id = db
        .create_user(name, &format!("{}@example.com", name), name, "hash")
        .await
        .unwrap();
    db.get_user_by_id(id).await.unwrap()
}

fn task_request(project_id: i64, title: &str) -> CreateTaskRequest {
    CreateTaskRequest {
        title: Some(title.to_string()),
        description: None,
        task_type: None,
        status: None,
        deadline: None,
        project_id,
        assignee: None,
    }
}

#[tokio::test]
async fn serial_numbers_count_up_per_project() {
    let f = setup().await;

    for expected in 1..=3 {
        let task = f
            .tasks
            .create(f.manager.id, task_request(f.project_id, "Task"))
            .await
            .unwrap();
        assert_eq!(task.serial_number, expected);
        assert_eq!(task.task_type, "tech");
        assert_eq!(task.status, "todo");
    }
}

#[tokio::test]
async fn only_managers_create_update_and_delete() {
    let f = setup().await;

    let err = f
        .tasks
        .create(f.developer.id, task_request(f.project_id, "Nope"))
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Forbidden(_)));

    let task = f
        .tasks
        .create(f.manager.id, task_request(f.project_id, "Ship it"))
        .await
        .unwrap();

    let err = f
        .tasks
        .update(
            task.id,
            f.developer.id,
            UpdateTaskRequest {
                title: Some("Renamed".to_string()),
                description: None,
                task_type: None,
                status: None,
                deadline: None,
                assignee: None,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Forbidden(_)));

    let err = f.tasks.delete(task.id, f.developer.id).await.unwrap_err();
    assert!(matches!(err, ApiError::Forbidden(_)));

    f.tasks.delete(task.id, f.manager.id).await.unwrap();
    let err = f.tasks.get(task.id, f.manager.id).await.unwrap_err();
    assert!(matches!(err, ApiError::NotFound(_)));
}

#[tokio::test]
async fn developers_move_tasks_and_comment() {
    let f = setup().await;

    let task = f
        .tasks
        .create(f.manager.id, task_request(f.project_id, "Ship it"))
        .await
        .unwrap();

    let moved = f
        .tasks
        .update_status(task.id, f.developer.id, "doing")
        .await
        .unwrap();
    assert_eq!(moved.status, "doing");

    let with_comment = f
        .tasks
        .add_comment(task.id, f.developer.id, "  on it  ")
        .await
        .unwrap();
    assert_eq!(with_comment.comments.len(), 1);
    assert_eq!(with_comment.comments[0].text, "on it");
    assert_eq!(with_comment.comments[0].user.id, f.developer.id);
}

#[tokio::test]
async fn status_must_be_a_board_of_the_project() {
    let f = setup().await;
    let projects = ProjectService::new(f.db.clone(), Arc::new(LogNotifier));

    let task = f
        .tasks
        .create(f.manager.id, task_request(f.project_id, "Ship it"))
        .await
        .unwrap();

    let err = f
        .tasks
        .update_status(task.id, f.manager.id, "shipped")
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Validation { .. }));

    projects
        .add_board(f.project_id, f.manager.id, "Shipped")
        .await
        .unwrap();
    let moved = f
        .tasks
        .update_status(task.id, f.manager.id, "shipped")
        .await
        .unwrap();
    assert_eq!(moved.status, "shipped");

    // Re-applying the current status is a no-op success.
    let again = f
        .tasks
        .update_status(task.id, f.manager.id, "shipped")
        .await
        .unwrap();
    assert_eq!(again.status, "shipped");
}

#[tokio::test]
async fn outsiders_cannot_see_or_touch_tasks() {
    let f = setup().await;

    let task = f
        .tasks
        .create(f.manager.id, task_request(f.project_id, "Ship it"))
        .await
        .unwrap();

    let err = f.tasks.get(task.id, f.outsider.id).await.unwrap_err();
    assert!(matches!(err, ApiError::Forbidden(_)));

    let err = f
        .tasks
        .update_status(task.id, f.outsider.id, "doing")
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Forbidden(_)));

    let err = f
        .tasks
        .add_comment(task.id, f.outsider.id, "hi")
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Forbidden(_)));

    // Listing through the project is gated earlier, as not-found.
    let err = f
        .tasks
        .list_by_project(f.project_id, f.outsider.id)
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::NotFound(_)));
}

#[tokio::test]
async fn assignee_must_be_a_collaborator() {
    let f = setup().await;

    let mut req = task_request(f.project_id, "Ship it");
    req.assignee = Some(f.outsider.id);
    let err = f.tasks.create(f.manager.id, req).await.unwrap_err();
    assert!(matches!(err, ApiError::Validation { .. }));

    let mut req = task_request(f.project_id, "Ship it");
    req.assignee = Some(f.developer.id);
    let task = f.tasks.create(f.manager.id, req).await.unwrap();
    assert_eq!(task.assignee.unwrap().id, f.developer.id);
}

#[tokio::test]
async fn create_collects_all_validation_failures() {
    let f = setup().await;

    let req = CreateTaskRequest {
        title: Some("   ".to_string()),
        description: Some("x".repeat(501)),
        task_type: Some("not valid".to_string()),
        status: Some("nowhere".to_string()),
        deadline: Some("tomorrow-ish".to_string()),
        project_id: f.project_id,
        assignee: None,
    };

    match f.tasks.create(f.manager.id, req).await.unwrap_err() {
        ApiError::Validation { details, .. } => assert_eq!(details.len(), 5),
        other => panic!("expected validation error, got {:?}", other),
    }
}

#[tokio::test]
async fn view_tolerates_deleted_assignee() {
    let f = setup().await;

    let mut req = task_request(f.project_id, "Ship it");
    req.assignee = Some(f.developer.id);
    let task = f.tasks.create(f.manager.id, req).await.unwrap();

    // Simulate the assignee's account going away without a cascade.
    sqlx::query("DELETE FROM users WHERE id = ?")
        .bind(f.developer.id)
        .execute(&*f.db)
        .await
        .unwrap();

    let view = f.tasks.get(task.id, f.manager.id).await.unwrap();
    assert!(view.assignee.is_none());
}
