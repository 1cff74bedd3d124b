use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{error, info, warn};
use serde_json::Value;
use shared::TaskStage;

use super::WorkerError;
use crate::queue::{Delivery, QueueError, TaskQueue};

#[async_trait]
pub trait TaskHandler: Send + Sync {
    fn stage(&self) -> TaskStage;

    /// Processes one delivery; the returned value becomes the task's result
    /// payload on ack.
    async fn handle(&self, delivery: &Delivery) -> Result<Value, WorkerError>;
}

/// Receives at most one task and settles it. Returns whether a task was
/// processed, so callers can distinguish work from an idle poll.
pub async fn poll_once(
    queue: &dyn TaskQueue,
    queue_name: &str,
    handler: &dyn TaskHandler,
    wait: Duration,
) -> Result<bool, QueueError> {
    let Some(delivery) = queue.receive(queue_name, wait).await? else {
        return Ok(false);
    };
    if delivery.stage != handler.stage() {
        warn!(
            "task {} on queue {} carries stage {}, expected {}",
            delivery.task_id,
            queue_name,
            delivery.stage,
            handler.stage()
        );
        let err = WorkerError::WrongStage(delivery.stage);
        queue.nack(&delivery, &err.to_string()).await?;
        return Ok(true);
    }

    info!(
        "processing {} task {} (attempt {})",
        delivery.stage, delivery.task_id, delivery.attempt
    );
    match handler.handle(&delivery).await {
        Ok(result) => {
            info!("task {} completed", delivery.task_id);
            queue.ack(&delivery, result).await?;
        }
        Err(err) => {
            error!("task {} attempt failed: {err}", delivery.task_id);
            queue.nack(&delivery, &err.to_string()).await?;
        }
    }
    Ok(true)
}

/// Long-running consumer loop: one task at a time until ctrl-c.
pub async fn run(
    queue: Arc<dyn TaskQueue>,
    queue_name: &str,
    handler: Arc<dyn TaskHandler>,
    wait: Duration,
) {
    info!(
        "consuming {} tasks from queue {}",
        handler.stage(),
        queue_name
    );
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down consumer for queue {queue_name}");
                break;
            }
            polled = poll_once(queue.as_ref(), queue_name, handler.as_ref(), wait) => {
                if let Err(err) = polled {
                    error!("receive from queue {queue_name} failed: {err}");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
    }
}
