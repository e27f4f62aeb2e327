//! Task dispatch per execution mode

use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::models::deployment::{ExecutionMode, Task, TaskStatus};
use crate::workers::task_runner::{
    TaskMessage, TaskOutcome, TaskReporter, TaskRunner, CANCELLED_BEFORE_START, SKIPPED,
};

/// Run the tasks of one campaign; `tasks` must be in execution order
pub async fn dispatch(
    task_runner: Arc<TaskRunner>,
    tasks: Vec<Task>,
    mode: ExecutionMode,
    tx: mpsc::UnboundedSender<TaskMessage>,
    cancel: CancellationToken,
) {
    match mode {
        ExecutionMode::Parallel => run_parallel(task_runner, tasks, tx, cancel).await,
        ExecutionMode::Serial => run_serial(task_runner, tasks, tx, cancel).await,
    }
}

async fn run_parallel(
    task_runner: Arc<TaskRunner>,
    tasks: Vec<Task>,
    tx: mpsc::UnboundedSender<TaskMessage>,
    cancel: CancellationToken,
) {
    let handles: Vec<_> = tasks
        .into_iter()
        .map(|task| {
            let task_runner = task_runner.clone();
            let reporter = TaskReporter::new(task.id, tx.clone());
            let cancel = cancel.clone();
            tokio::spawn(async move { task_runner.run(&task, reporter, &cancel).await })
        })
        .collect();
    drop(tx);

    for result in join_all(handles).await {
        if let Err(e) = result {
            error!("Task worker failed: {}", e);
        }
    }
}

async fn run_serial(
    task_runner: Arc<TaskRunner>,
    tasks: Vec<Task>,
    tx: mpsc::UnboundedSender<TaskMessage>,
    cancel: CancellationToken,
) {
    let mut remaining = tasks.into_iter();
    while let Some(task) = remaining.next() {
        let reporter = TaskReporter::new(task.id, tx.clone());
        let status = task_runner.run(&task, reporter, &cancel).await;
        if status != TaskStatus::Failed {
            continue;
        }

        let reason = if cancel.is_cancelled() {
            CANCELLED_BEFORE_START
        } else {
            SKIPPED
        };
        let skipped: Vec<Task> = remaining.by_ref().collect();
        if !skipped.is_empty() {
            info!(
                "Task {} failed, {} remaining tasks will not run",
                task.id,
                skipped.len()
            );
        }
        for rest in skipped {
            TaskReporter::new(rest.id, tx.clone()).finish(TaskOutcome::failed(reason, None));
        }
        break;
    }
}
