pub mod dynamo_queue;
pub mod memory_queue;

use async_trait::async_trait;
use serde_json::Value;
use shared::{TaskStage, TaskStatus};
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("queue backend error: {0}")]
    Backend(String),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("malformed task record: {0}")]
    InvalidRecord(String),
}

/// One claimed delivery attempt. The consumer must settle it with `ack` or
/// `nack`; an unsettled delivery becomes deliverable again once its
/// visibility lease expires.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub queue: String,
    pub task_id: String,
    pub stage: TaskStage,
    pub payload: Value,
    pub attempt: u32,
}

/// Delivery bookkeeping for one task, as persisted by the queue backend.
#[derive(Debug, Clone)]
pub struct TaskRecord {
    pub task_id: String,
    pub queue: String,
    pub stage: TaskStage,
    pub status: TaskStatus,
    pub attempts: u32,
    pub result: Option<Value>,
    pub error: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Durable, at-least-once delivery channel per named queue. Producers and
/// consumers share no state beyond the backend; terminal statuses are
/// monotonic (an acked or exhausted task never reverts to PENDING).
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Records the task as PENDING and returns the backend-assigned id.
    async fn enqueue(
        &self,
        queue: &str,
        stage: TaskStage,
        payload: Value,
    ) -> Result<String, QueueError>;

    /// Claims one deliverable task, waiting up to `wait` for one to appear.
    async fn receive(&self, queue: &str, wait: Duration)
    -> Result<Option<Delivery>, QueueError>;

    /// Marks the delivery's task SUCCESS and stores the worker's result.
    async fn ack(&self, delivery: &Delivery, result: Value) -> Result<(), QueueError>;

    /// Records a failed attempt. The task goes back to PENDING until
    /// max attempts are exhausted, then FAILED.
    async fn nack(&self, delivery: &Delivery, error: &str) -> Result<(), QueueError>;

    async fn lookup(&self, queue: &str, task_id: &str)
    -> Result<Option<TaskRecord>, QueueError>;
}
