//! Campaign lifecycle tests against a scripted build runner

use std::sync::Arc;
use std::time::Duration;

use deploy_api::{ApplicationTarget, CreateQuickDeploymentRequest, DeployableQuery, ListQuery};
use rollout::deploy::orchestrator;
use rollout::errors::EngineError;
use rollout::models::deployment::{CampaignStatus, ExecutionMode, Operator, TaskStatus};
use rollout::workers::task_runner::{CANCELLED, SKIPPED};
use tokio_test::{assert_err, assert_ok};

use crate::support::{orchestrator, orchestrator_with, wait_settled, FakeRunner, Script};

fn request(title: &str, targets: &[(u64, &str)]) -> CreateQuickDeploymentRequest {
    CreateQuickDeploymentRequest {
        title: title.to_string(),
        business_group_id: 10,
        business_dept_id: 20,
        description: String::new(),
        applications: targets
            .iter()
            .map(|(app_id, environment)| ApplicationTarget {
                app_id: *app_id,
                environment: environment.to_string(),
            })
            .collect(),
    }
}

fn operator() -> Operator {
    Operator {
        id: 7,
        name: "release-bot".to_string(),
    }
}

fn succeed(polls: u32) -> Script {
    Script::Finish {
        polls,
        result: "SUCCESS",
    }
}

#[tokio::test]
async fn test_parallel_campaign_succeeds() {
    let runner = Arc::new(FakeRunner::new(vec![("web-test", succeed(2)), ("api-test", succeed(1))]));
    let orchestrator = orchestrator(runner.clone());

    let detail = orchestrator
        .create(request("release 1", &[(1, "test"), (2, "test")]), operator())
        .await
        .unwrap();
    let id = detail.campaign.id;

    let campaign = orchestrator.execute(id, Some(ExecutionMode::Parallel)).await.unwrap();
    assert_eq!(campaign.status, CampaignStatus::Running);
    assert!(campaign.start_time.is_some());

    let detail = wait_settled(&orchestrator, id).await;
    assert_eq!(detail.campaign.status, CampaignStatus::Succeeded);
    assert!(detail.campaign.duration.unwrap() > 0);
    assert_eq!(runner.starts(), 2);

    for task in &detail.tasks {
        assert_eq!(task.status, TaskStatus::Succeeded);
        assert_eq!(task.build_number, Some(1));
        assert!(task.end_time.unwrap() >= task.start_time.unwrap());
        assert!(task.log_url.as_deref().unwrap().ends_with("/console"));
    }

    let status = orchestrator.campaign_status(id).await.unwrap();
    assert_eq!(status.progress, 100);
    assert_eq!(status.succeeded_count, 2);
}

#[tokio::test]
async fn test_serial_failure_skips_remaining_tasks() {
    let runner = Arc::new(FakeRunner::new(vec![
        ("web-test", succeed(1)),
        (
            "api-test",
            Script::Finish {
                polls: 1,
                result: "FAILURE",
            },
        ),
        ("worker-test", succeed(1)),
    ]));
    let orchestrator = orchestrator(runner.clone());

    let detail = orchestrator
        .create(
            request("release 2", &[(1, "test"), (2, "test"), (3, "test")]),
            operator(),
        )
        .await
        .unwrap();
    let id = detail.campaign.id;
    orchestrator.execute(id, Some(ExecutionMode::Serial)).await.unwrap();

    let detail = wait_settled(&orchestrator, id).await;
    assert_eq!(detail.campaign.status, CampaignStatus::Failed);
    assert_eq!(detail.campaign.execution_mode, ExecutionMode::Serial);

    let tasks = &detail.tasks;
    assert_eq!(tasks[0].status, TaskStatus::Succeeded);
    assert_eq!(tasks[1].status, TaskStatus::Failed);
    assert_eq!(tasks[1].error_message.as_deref(), Some("FAILURE"));
    assert_eq!(tasks[2].status, TaskStatus::Failed);
    assert_eq!(tasks[2].error_message.as_deref(), Some(SKIPPED));
    assert!(tasks[2].build_number.is_none());

    // The third job was never triggered
    assert_eq!(runner.starts(), 2);
}

#[tokio::test]
async fn test_unconfigured_task_fails_without_runner_calls() {
    let runner = Arc::new(FakeRunner::new(vec![]));
    let orchestrator = orchestrator(runner.clone());

    // App 4 only has a uat job
    let detail = orchestrator
        .create(request("release 3", &[(4, "test")]), operator())
        .await
        .unwrap();
    let id = detail.campaign.id;
    orchestrator.execute(id, None).await.unwrap();

    let detail = wait_settled(&orchestrator, id).await;
    assert_eq!(detail.campaign.status, CampaignStatus::Failed);
    assert_eq!(detail.campaign.execution_mode, ExecutionMode::Parallel);

    let task = &detail.tasks[0];
    assert_eq!(task.status, TaskStatus::Failed);
    assert!(task.error_message.as_deref().unwrap().starts_with("not configured"));
    assert!(task.start_time.is_none());
    assert_eq!(runner.calls(), 0);
}

#[tokio::test]
async fn test_rejected_start_fails_task() {
    let runner = Arc::new(FakeRunner::new(vec![("web-test", Script::Reject)]));
    let orchestrator = orchestrator(runner.clone());

    let id = orchestrator
        .create(request("release 4", &[(1, "test")]), operator())
        .await
        .unwrap()
        .campaign
        .id;
    orchestrator.execute(id, None).await.unwrap();

    let detail = wait_settled(&orchestrator, id).await;
    let task = &detail.tasks[0];
    assert_eq!(task.status, TaskStatus::Failed);
    assert!(task.error_message.as_deref().unwrap().contains("failed to start build"));
    assert!(task.build_number.is_none());
    assert_eq!(runner.starts(), 1);
}

#[tokio::test]
async fn test_create_assigns_order_and_count() {
    let runner = Arc::new(FakeRunner::new(vec![]));
    let orchestrator = orchestrator(runner);

    let detail = orchestrator
        .create(
            request("  release 5  ", &[(3, "test"), (1, "test"), (2, "test")]),
            operator(),
        )
        .await
        .unwrap();

    let campaign = &detail.campaign;
    assert_eq!(campaign.title, "release 5");
    assert_eq!(campaign.status, CampaignStatus::Pending);
    assert_eq!(campaign.task_count, 3);
    assert_eq!(campaign.creator_id, 7);
    assert_eq!(campaign.creator_name, "release-bot");

    let orders: Vec<u32> = detail.tasks.iter().map(|t| t.execute_order).collect();
    assert_eq!(orders, vec![1, 2, 3]);
    let apps: Vec<u64> = detail.tasks.iter().map(|t| t.app_id).collect();
    assert_eq!(apps, vec![3, 1, 2]);
    assert!(detail
        .tasks
        .iter()
        .all(|t| t.status == TaskStatus::NotDeployed && t.deployment_id == campaign.id));
}

#[tokio::test]
async fn test_create_rejects_invalid_requests() {
    let runner = Arc::new(FakeRunner::new(vec![]));
    let orchestrator = orchestrator(runner);

    let cases = [
        request("   ", &[(1, "test")]),
        request("empty", &[]),
        request("blank env", &[(1, " ")]),
        request("production", &[(1, "PROD")]),
        request("unknown app", &[(99, "test")]),
    ];
    for case in cases {
        let title = case.title.clone();
        let result = orchestrator.create(case, operator()).await;
        assert!(
            matches!(result, Err(EngineError::ValidationError(_))),
            "{title} should be rejected"
        );
    }

    let page = orchestrator.list(ListQuery::default()).await.unwrap();
    assert_eq!(page.total, 0);
}

#[tokio::test]
async fn test_execute_requires_pending() {
    let runner = Arc::new(FakeRunner::new(vec![("web-test", succeed(0))]));
    let orchestrator = orchestrator(runner);

    let id = orchestrator
        .create(request("release 6", &[(1, "test")]), operator())
        .await
        .unwrap()
        .campaign
        .id;
    orchestrator.execute(id, None).await.unwrap();
    wait_settled(&orchestrator, id).await;

    let result = orchestrator.execute(id, None).await;
    assert!(matches!(result, Err(EngineError::ValidationError(_))));

    let result = orchestrator.execute(404, None).await;
    assert!(matches!(result, Err(EngineError::NotFound(_))));
}

#[tokio::test]
async fn test_cancel_stops_running_builds() {
    let runner = Arc::new(FakeRunner::new(vec![("web-test", Script::Hang), ("api-test", Script::Hang)]));
    let orchestrator = orchestrator(runner.clone());

    let id = orchestrator
        .create(request("release 7", &[(1, "test"), (2, "test")]), operator())
        .await
        .unwrap()
        .campaign
        .id;
    orchestrator.execute(id, None).await.unwrap();

    // Wait until both builds are attached
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let detail = orchestrator.get_campaign(id).await.unwrap();
            if detail.tasks.iter().all(|t| t.build_number.is_some()) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    orchestrator.cancel(id).await.unwrap();
    let detail = wait_settled(&orchestrator, id).await;

    assert_eq!(detail.campaign.status, CampaignStatus::Cancelled);
    for task in &detail.tasks {
        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.error_message.as_deref(), Some(CANCELLED));
    }
    let mut stopped = runner.stopped();
    stopped.sort();
    assert_eq!(
        stopped,
        vec![("api-test".to_string(), 1), ("web-test".to_string(), 1)]
    );

    // Cancelling a settled campaign is rejected
    assert!(matches!(
        orchestrator.cancel(id).await,
        Err(EngineError::ValidationError(_))
    ));
}

#[tokio::test]
async fn test_campaign_timeout_fails_open_tasks() {
    let runner = Arc::new(FakeRunner::new(vec![("web-test", Script::Hang)]));
    let orchestrator = orchestrator_with(
        runner.clone(),
        orchestrator::Options {
            campaign_timeout: Some(Duration::from_millis(100)),
            stop_wait: Duration::from_secs(2),
            ..Default::default()
        },
    );

    let id = orchestrator
        .create(request("release 8", &[(1, "test")]), operator())
        .await
        .unwrap()
        .campaign
        .id;
    orchestrator.execute(id, None).await.unwrap();

    let detail = wait_settled(&orchestrator, id).await;
    assert_eq!(detail.campaign.status, CampaignStatus::Failed);
    assert_eq!(detail.tasks[0].status, TaskStatus::Failed);
    assert_eq!(runner.stopped().len(), 1);
}

#[tokio::test]
async fn test_delete_cascades_and_is_idempotent() {
    let runner = Arc::new(FakeRunner::new(vec![("web-test", Script::Hang)]));
    let orchestrator = orchestrator(runner.clone());

    let detail = orchestrator
        .create(request("release 9", &[(1, "test")]), operator())
        .await
        .unwrap();
    let id = detail.campaign.id;
    let task_id = detail.tasks[0].id;
    orchestrator.execute(id, None).await.unwrap();

    orchestrator.delete(id).await.unwrap();
    assert!(matches!(
        orchestrator.get_campaign(id).await,
        Err(EngineError::NotFound(_))
    ));
    assert_err!(orchestrator.task_status(task_id).await);

    assert_ok!(orchestrator.delete(id).await);
    assert_ok!(orchestrator.delete(12345).await);
}

#[tokio::test]
async fn test_task_log_requires_build() {
    let runner = Arc::new(FakeRunner::new(vec![("web-test", succeed(0))]));
    let orchestrator = orchestrator(runner);

    let detail = orchestrator
        .create(request("release 10", &[(1, "test")]), operator())
        .await
        .unwrap();
    let id = detail.campaign.id;
    let task_id = detail.tasks[0].id;

    assert!(matches!(
        orchestrator.task_log(task_id, 0, false).await,
        Err(EngineError::NotAvailable(_))
    ));

    orchestrator.execute(id, None).await.unwrap();
    wait_settled(&orchestrator, id).await;

    let first = orchestrator.task_log(task_id, 0, false).await.unwrap();
    let again = orchestrator.task_log(task_id, 0, false).await.unwrap();
    assert_eq!(first.build_number, 1);
    assert_eq!(first.text, again.text);
    assert_eq!(first.next_start, again.next_start);

    let tail = orchestrator
        .task_log(task_id, first.next_start, false)
        .await
        .unwrap();
    assert!(tail.text.is_empty());
}

#[tokio::test]
async fn test_task_status_reports_progress() {
    let runner = Arc::new(FakeRunner::new(vec![("web-test", succeed(0))]));
    let orchestrator = orchestrator(runner);

    let detail = orchestrator
        .create(request("release 11", &[(1, "test")]), operator())
        .await
        .unwrap();
    let task_id = detail.tasks[0].id;

    let status = orchestrator.task_status(task_id).await.unwrap();
    assert_eq!(status.status, TaskStatus::NotDeployed.code());
    assert_eq!(status.progress, 0);

    orchestrator.execute(detail.campaign.id, None).await.unwrap();
    wait_settled(&orchestrator, detail.campaign.id).await;

    let status = orchestrator.task_status(task_id).await.unwrap();
    assert_eq!(status.status, TaskStatus::Succeeded.code());
    assert_eq!(status.status_text, TaskStatus::Succeeded.text());
    assert_eq!(status.progress, 100);
    assert!(status.duration.is_some());
}

#[tokio::test]
async fn test_list_filters_and_pages() {
    let runner = Arc::new(FakeRunner::new(vec![]));
    let orchestrator = orchestrator(runner);

    for n in 0..3 {
        orchestrator
            .create(request(&format!("release {n}"), &[(1, "test")]), operator())
            .await
            .unwrap();
    }
    orchestrator
        .create(
            request("by someone else", &[(2, "test")]),
            Operator::default(),
        )
        .await
        .unwrap();

    let page = orchestrator
        .list(ListQuery {
            page: Some(1),
            page_size: Some(2),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(page.total, 4);
    assert_eq!(page.list.len(), 2);
    assert_eq!(page.list[0].title, "by someone else");

    let mine = orchestrator
        .list(ListQuery {
            creator_id: Some(7),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(mine.total, 3);

    let pending = orchestrator
        .list(ListQuery {
            status: Some(CampaignStatus::Pending.code()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(pending.total, 4);

    let invalid = orchestrator
        .list(ListQuery {
            status: Some(42),
            ..Default::default()
        })
        .await;
    assert!(matches!(invalid, Err(EngineError::ValidationError(_))));
}

#[tokio::test]
async fn test_deployable_applications() {
    let runner = Arc::new(FakeRunner::new(vec![]));
    let orchestrator = orchestrator(runner);

    let apps = orchestrator
        .deployable_applications(DeployableQuery {
            business_group_id: Some(10),
            business_dept_id: None,
            environment: "test".to_string(),
        })
        .await
        .unwrap();
    assert_eq!(apps.len(), 4);
    for app in &apps {
        assert_eq!(app.can_deploy, app.app_id != 4, "app {}", app.app_id);
    }
    assert!(apps[3].reason.is_some());

    let prod = orchestrator
        .deployable_applications(DeployableQuery {
            business_group_id: None,
            business_dept_id: None,
            environment: "prod".to_string(),
        })
        .await
        .unwrap();
    assert!(prod.iter().all(|app| !app.can_deploy));

    let blank = orchestrator
        .deployable_applications(DeployableQuery {
            business_group_id: None,
            business_dept_id: None,
            environment: " ".to_string(),
        })
        .await;
    assert!(matches!(blank, Err(EngineError::ValidationError(_))));
}

#[tokio::test]
async fn test_shutdown_winds_campaigns_down_together() {
    let runner = Arc::new(
        FakeRunner::new(vec![("web-test", Script::Hang), ("api-test", Script::Hang)])
            .with_stop_delay(Duration::from_secs(5)),
    );
    let orchestrator = orchestrator_with(
        runner.clone(),
        orchestrator::Options {
            stop_wait: Duration::from_millis(500),
            ..Default::default()
        },
    );

    let mut ids = Vec::new();
    for (app_id, title) in [(1, "web"), (2, "api")] {
        let id = orchestrator
            .create(request(title, &[(app_id, "test")]), operator())
            .await
            .unwrap()
            .campaign
            .id;
        orchestrator.execute(id, None).await.unwrap();
        ids.push(id);
    }

    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let mut attached = 0;
            for id in &ids {
                let detail = orchestrator.get_campaign(*id).await.unwrap();
                attached += detail.tasks.iter().filter(|t| t.build_number.is_some()).count();
            }
            if attached == ids.len() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    // Both stops hang, so each campaign uses its full stop_wait
    let started = std::time::Instant::now();
    orchestrator.shutdown().await;
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(450), "{elapsed:?}");
    assert!(elapsed < Duration::from_millis(950), "{elapsed:?}");
}
