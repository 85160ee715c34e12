//! Project lifecycle integration tests: roles, collaborators, boards, and
//! the cascading delete, all against an in-memory database.

use std::sync::Arc;

use taskhub::database::{Database, UserRow};
use taskhub::models::{
    CollaboratorInput, CreateProjectRequest, ProjectType, Role, UpdateProjectRequest,
};
use taskhub::services::{ProjectService, TaskService};
use taskhub::{ApiError, LogNotifier};

async fn setup() -> (Database, ProjectService) {
    let db = Database::in_memory().await.unwrap();
    let projects = ProjectService::new(db.clone(), Arc::new(LogNotifier));
    (db, projects)
}

async fn user(db: &Database, name: &str) -> UserRow {
    let id = db
        .create_user(name, &format!("{}@example.com", name), name, "hash")
        .await
        .unwrap();
    db.get_user_by_id(id).await.unwrap()
}

fn personal(title: &str) -> CreateProjectRequest {
    CreateProjectRequest {
        title: Some(title.to_string()),
        description: None,
        github_link: None,
        project_type: Some(ProjectType::Personal),
        collaborators: Vec::new(),
    }
}

fn collaborative(title: &str, collaborators: Vec<CollaboratorInput>) -> CreateProjectRequest {
    CreateProjectRequest {
        title: Some(title.to_string()),
        description: None,
        github_link: None,
        project_type: Some(ProjectType::Collaborative),
        collaborators,
    }
}

#[tokio::test]
async fn creator_is_inserted_as_manager() {
    let (db, projects) = setup().await;
    let alice = user(&db, "alice").await;
    let bob = user(&db, "bob").await;

    let view = projects
        .create(
            &alice,
            collaborative(
                "Apollo",
                vec![CollaboratorInput {
                    user_id: bob.id,
                    role: Role::Developer,
                }],
            ),
        )
        .await
        .unwrap();

    assert_eq!(view.collaborators.len(), 2);
    let owner_entry = view
        .collaborators
        .iter()
        .find(|c| c.user_id.id == alice.id)
        .expect("owner missing from collaborators");
    assert_eq!(owner_entry.role, Role::Manager);

    let fetched = projects.get(view.id, alice.id).await.unwrap();
    assert_eq!(fetched.current_user_role, Some(Role::Manager));
    let as_bob = projects.get(view.id, bob.id).await.unwrap();
    assert_eq!(as_bob.current_user_role, Some(Role::Developer));
}

#[tokio::test]
async fn personal_projects_cannot_have_collaborators() {
    let (db, projects) = setup().await;
    let alice = user(&db, "alice").await;
    let bob = user(&db, "bob").await;

    let mut req = personal("Solo");
    req.collaborators = vec![CollaboratorInput {
        user_id: bob.id,
        role: Role::Developer,
    }];

    let err = projects.create(&alice, req).await.unwrap_err();
    assert!(matches!(err, ApiError::Validation { .. }));
}

#[tokio::test]
async fn duplicate_title_is_scoped_per_creator() {
    let (db, projects) = setup().await;
    let alice = user(&db, "alice").await;
    let bob = user(&db, "bob").await;

    projects.create(&alice, personal("Apollo")).await.unwrap();

    let err = projects.create(&alice, personal("Apollo")).await.unwrap_err();
    assert!(matches!(err, ApiError::Conflict(_)));

    // A different creator may reuse the title.
    projects.create(&bob, personal("Apollo")).await.unwrap();
}

#[tokio::test]
async fn invisible_project_reads_as_not_found() {
    let (db, projects) = setup().await;
    let alice = user(&db, "alice").await;
    let mallory = user(&db, "mallory").await;

    let view = projects.create(&alice, personal("Secret")).await.unwrap();

    let err = projects.get(view.id, mallory.id).await.unwrap_err();
    assert!(matches!(err, ApiError::NotFound(_)));

    let err = projects
        .update(
            view.id,
            mallory.id,
            UpdateProjectRequest {
                title: Some("Hijacked".to_string()),
                description: None,
                github_link: None,
                collaborators: None,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::NotFound(_)));
}

#[tokio::test]
async fn only_managers_manage_collaborators() {
    let (db, projects) = setup().await;
    let alice = user(&db, "alice").await;
    let bob = user(&db, "bob").await;
    let carol = user(&db, "carol").await;

    let view = projects
        .create(
            &alice,
            collaborative(
                "Apollo",
                vec![CollaboratorInput {
                    user_id: bob.id,
                    role: Role::Developer,
                }],
            ),
        )
        .await
        .unwrap();

    // Developer may not add.
    let err = projects
        .add_collaborator(view.id, &bob, carol.id, Role::Developer)
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Forbidden(_)));

    // Manager may; adding twice conflicts.
    projects
        .add_collaborator(view.id, &alice, carol.id, Role::Developer)
        .await
        .unwrap();
    let err = projects
        .add_collaborator(view.id, &alice, carol.id, Role::Developer)
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Conflict(_)));
}

#[tokio::test]
async fn remove_collaborator_edge_cases() {
    let (db, projects) = setup().await;
    let alice = user(&db, "alice").await;
    let bob = user(&db, "bob").await;
    let carol = user(&db, "carol").await;

    let view = projects
        .create(
            &alice,
            collaborative(
                "Apollo",
                vec![CollaboratorInput {
                    user_id: bob.id,
                    role: Role::Developer,
                }],
            ),
        )
        .await
        .unwrap();

    // Self-removal is routed through leave.
    let err = projects
        .remove_collaborator(view.id, alice.id, alice.id)
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Validation { .. }));

    // Not a collaborator at all.
    let err = projects
        .remove_collaborator(view.id, alice.id, carol.id)
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::NotFound(_)));

    let updated = projects
        .remove_collaborator(view.id, alice.id, bob.id)
        .await
        .unwrap();
    assert_eq!(updated.collaborators.len(), 1);
}

#[tokio::test]
async fn last_manager_cannot_leave() {
    let (db, projects) = setup().await;
    let alice = user(&db, "alice").await;
    let bob = user(&db, "bob").await;

    let view = projects
        .create(
            &alice,
            collaborative(
                "Apollo",
                vec![CollaboratorInput {
                    user_id: bob.id,
                    role: Role::Developer,
                }],
            ),
        )
        .await
        .unwrap();

    let err = projects.leave(view.id, alice.id).await.unwrap_err();
    assert!(matches!(err, ApiError::Conflict(_)));

    // Promote a second manager and the original one may leave.
    db.remove_collaborator(view.id, bob.id).await.unwrap();
    db.add_collaborator(view.id, bob.id, Role::Manager).await.unwrap();
    projects.leave(view.id, alice.id).await.unwrap();

    let remaining = db.list_collaborators(view.id).await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].user_id, bob.id);
}

#[tokio::test]
async fn leaving_a_personal_project_is_rejected() {
    let (db, projects) = setup().await;
    let alice = user(&db, "alice").await;

    let view = projects.create(&alice, personal("Solo")).await.unwrap();
    let err = projects.leave(view.id, alice.id).await.unwrap_err();
    assert!(matches!(err, ApiError::Validation { .. }));
}

#[tokio::test]
async fn delete_cascades_to_tasks_and_comments() {
    let (db, projects) = setup().await;
    let tasks = TaskService::new(db.clone());
    let alice = user(&db, "alice").await;

    let view = projects.create(&alice, personal("Apollo")).await.unwrap();
    for i in 0..3 {
        let task = tasks
            .create(
                alice.id,
                taskhub::models::CreateTaskRequest {
                    title: Some(format!("Task {}", i)),
                    description: None,
                    task_type: None,
                    status: None,
                    deadline: None,
                    project_id: view.id,
                    assignee: None,
                },
            )
            .await
            .unwrap();
        tasks.add_comment(task.id, alice.id, "note").await.unwrap();
    }

    let deleted = projects.delete(view.id, alice.id).await.unwrap();
    assert_eq!(deleted, 3);

    assert!(db.list_tasks_by_project(view.id).await.unwrap().is_empty());
    assert!(matches!(
        db.get_project(view.id).await.unwrap_err(),
        taskhub::database::DatabaseError::NotFound(_)
    ));
}

#[tokio::test]
async fn board_names_are_slugged_and_reserved_ids_rejected() {
    let (db, projects) = setup().await;
    let alice = user(&db, "alice").await;

    let view = projects.create(&alice, personal("Apollo")).await.unwrap();

    let board = projects
        .add_board(view.id, alice.id, "In Review")
        .await
        .unwrap();
    assert_eq!(board.id, "in-review");
    assert_eq!(board.name, "In Review");

    // Same slug again conflicts.
    let err = projects
        .add_board(view.id, alice.id, "in review!")
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Conflict(_)));

    // Slugs colliding with the default boards are reserved.
    let err = projects.add_board(view.id, alice.id, "Done").await.unwrap_err();
    assert!(matches!(err, ApiError::Conflict(_)));

    let err = projects.add_board(view.id, alice.id, "!!!").await.unwrap_err();
    assert!(matches!(err, ApiError::Validation { .. }));
}

#[tokio::test]
async fn deleting_a_board_reassigns_its_tasks() {
    let (db, projects) = setup().await;
    let tasks = TaskService::new(db.clone());
    let alice = user(&db, "alice").await;

    let view = projects.create(&alice, personal("Apollo")).await.unwrap();
    projects.add_board(view.id, alice.id, "QA").await.unwrap();

    let task = tasks
        .create(
            alice.id,
            taskhub::models::CreateTaskRequest {
                title: Some("Verify release".to_string()),
                description: None,
                task_type: None,
                status: Some("qa".to_string()),
                deadline: None,
                project_id: view.id,
                assignee: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(task.status, "qa");

    projects.delete_board(view.id, alice.id, "qa").await.unwrap();

    let task = tasks.get(task.id, alice.id).await.unwrap();
    assert_eq!(task.status, "todo");

    let err = projects
        .delete_board(view.id, alice.id, "qa")
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::NotFound(_)));
}

#[tokio::test]
async fn rename_board_requires_existing_board() {
    let (db, projects) = setup().await;
    let alice = user(&db, "alice").await;

    let view = projects.create(&alice, personal("Apollo")).await.unwrap();
    projects.add_board(view.id, alice.id, "QA").await.unwrap();

    let renamed = projects
        .rename_board(view.id, alice.id, "qa", "Quality")
        .await
        .unwrap();
    assert_eq!(renamed.name, "Quality");

    let err = projects
        .rename_board(view.id, alice.id, "missing", "Nope")
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::NotFound(_)));
}

#[tokio::test]
async fn update_replaces_collaborators_but_keeps_creator() {
    let (db, projects) = setup().await;
    let alice = user(&db, "alice").await;
    let bob = user(&db, "bob").await;
    let carol = user(&db, "carol").await;

    let view = projects
        .create(
            &alice,
            collaborative(
                "Apollo",
                vec![CollaboratorInput {
                    user_id: bob.id,
                    role: Role::Developer,
                }],
            ),
        )
        .await
        .unwrap();

    // Replacement list omits the creator; they are pinned back in anyway.
    let updated = projects
        .update(
            view.id,
            alice.id,
            UpdateProjectRequest {
                title: None,
                description: None,
                github_link: None,
                collaborators: Some(vec![CollaboratorInput {
                    user_id: carol.id,
                    role: Role::Manager,
                }]),
            },
        )
        .await
        .unwrap();

    let ids: Vec<i64> = updated.collaborators.iter().map(|c| c.user_id.id).collect();
    assert!(ids.contains(&alice.id));
    assert!(ids.contains(&carol.id));
    assert!(!ids.contains(&bob.id));
}
