use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use chrono::Utc;
use log::debug;
use serde_json::Value;
use shared::{TaskStage, TaskStatus};
use tokio::sync::{Mutex, Notify};
use uuid::Uuid;

use super::{Delivery, QueueError, TaskQueue, TaskRecord};

/// In-process queue backend with the same observable semantics as the
/// DynamoDB one: visibility leases, attempt counting, monotonic terminal
/// statuses. Used by tests and local single-process runs.
pub struct MemoryQueue {
    max_attempts: u32,
    visibility: Duration,
    inner: Mutex<HashMap<String, Channel>>,
    notify: Notify,
}

#[derive(Default)]
struct Channel {
    pending: VecDeque<String>,
    tasks: HashMap<String, StoredTask>,
}

struct StoredTask {
    record: TaskRecord,
    payload: Value,
    lease_until: Option<Instant>,
}

impl MemoryQueue {
    pub fn new(max_attempts: u32, visibility: Duration) -> Self {
        Self {
            max_attempts,
            visibility,
            inner: Mutex::new(HashMap::new()),
            notify: Notify::new(),
        }
    }

    async fn try_claim(&self, queue: &str) -> Option<Delivery> {
        let mut inner = self.inner.lock().await;
        let channel = inner.get_mut(queue)?;
        let now = Instant::now();

        // Expired leases are reaped lazily, on the next receive.
        let Channel { pending, tasks } = channel;
        for (task_id, task) in tasks.iter_mut() {
            if task.record.status == TaskStatus::Pending
                && task.lease_until.is_some_and(|lease| lease <= now)
            {
                debug!("lease expired for task {task_id}, requeueing");
                task.lease_until = None;
                if !pending.contains(task_id) {
                    pending.push_back(task_id.clone());
                }
            }
        }

        while let Some(task_id) = pending.pop_front() {
            let Some(task) = tasks.get_mut(&task_id) else {
                continue;
            };
            if task.record.status != TaskStatus::Pending || task.lease_until.is_some() {
                continue;
            }
            task.lease_until = Some(now + self.visibility);
            task.record.attempts += 1;
            task.record.updated_at = Utc::now().to_rfc3339();
            return Some(Delivery {
                queue: queue.to_string(),
                task_id: task_id.clone(),
                stage: task.record.stage,
                payload: task.payload.clone(),
                attempt: task.record.attempts,
            });
        }
        None
    }
}

#[async_trait::async_trait]
impl TaskQueue for MemoryQueue {
    async fn enqueue(
        &self,
        queue: &str,
        stage: TaskStage,
        payload: Value,
    ) -> Result<String, QueueError> {
        let task_id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        let record = TaskRecord {
            task_id: task_id.clone(),
            queue: queue.to_string(),
            stage,
            status: TaskStatus::Pending,
            attempts: 0,
            result: None,
            error: None,
            created_at: now.clone(),
            updated_at: now,
        };
        let mut inner = self.inner.lock().await;
        let channel = inner.entry(queue.to_string()).or_default();
        channel.tasks.insert(
            task_id.clone(),
            StoredTask {
                record,
                payload,
                lease_until: None,
            },
        );
        channel.pending.push_back(task_id.clone());
        drop(inner);
        self.notify.notify_one();
        Ok(task_id)
    }

    async fn receive(
        &self,
        queue: &str,
        wait: Duration,
    ) -> Result<Option<Delivery>, QueueError> {
        let deadline = Instant::now() + wait;
        loop {
            if let Some(delivery) = self.try_claim(queue).await {
                return Ok(Some(delivery));
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            let _ = tokio::time::timeout(deadline - now, self.notify.notified()).await;
        }
    }

    async fn ack(&self, delivery: &Delivery, result: Value) -> Result<(), QueueError> {
        let mut inner = self.inner.lock().await;
        let task = inner
            .get_mut(&delivery.queue)
            .and_then(|channel| channel.tasks.get_mut(&delivery.task_id))
            .ok_or_else(|| QueueError::InvalidRecord(delivery.task_id.clone()))?;
        if task.record.status != TaskStatus::Pending {
            debug!(
                "ack for task {} ignored, already {}",
                delivery.task_id, task.record.status
            );
            return Ok(());
        }
        task.record.status = TaskStatus::Success;
        task.record.result = Some(result);
        task.record.updated_at = Utc::now().to_rfc3339();
        task.lease_until = None;
        Ok(())
    }

    async fn nack(&self, delivery: &Delivery, error: &str) -> Result<(), QueueError> {
        let mut inner = self.inner.lock().await;
        let channel = inner
            .get_mut(&delivery.queue)
            .ok_or_else(|| QueueError::InvalidRecord(delivery.task_id.clone()))?;
        let requeue = {
            let task = channel
                .tasks
                .get_mut(&delivery.task_id)
                .ok_or_else(|| QueueError::InvalidRecord(delivery.task_id.clone()))?;
            if task.record.status != TaskStatus::Pending {
                debug!(
                    "nack for task {} ignored, already {}",
                    delivery.task_id, task.record.status
                );
                return Ok(());
            }
            task.record.error = Some(error.to_string());
            task.record.updated_at = Utc::now().to_rfc3339();
            task.lease_until = None;
            if task.record.attempts >= self.max_attempts {
                task.record.status = TaskStatus::Failed;
                false
            } else {
                true
            }
        };
        if requeue {
            channel.pending.push_back(delivery.task_id.clone());
            drop(inner);
            self.notify.notify_one();
        }
        Ok(())
    }

    async fn lookup(
        &self,
        queue: &str,
        task_id: &str,
    ) -> Result<Option<TaskRecord>, QueueError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .get(queue)
            .and_then(|channel| channel.tasks.get(task_id))
            .map(|task| task.record.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn queue() -> MemoryQueue {
        MemoryQueue::new(2, Duration::from_secs(30))
    }

    #[tokio::test]
    async fn enqueue_receive_ack_lifecycle() {
        let q = queue();
        let task_id = q
            .enqueue("imagery", TaskStage::Filter, json!({"gender": "Women"}))
            .await
            .unwrap();

        let record = q.lookup("imagery", &task_id).await.unwrap().unwrap();
        assert_eq!(record.status, TaskStatus::Pending);
        assert_eq!(record.attempts, 0);

        let delivery = q
            .receive("imagery", Duration::from_millis(10))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(delivery.task_id, task_id);
        assert_eq!(delivery.attempt, 1);
        assert_eq!(delivery.payload, json!({"gender": "Women"}));

        q.ack(&delivery, json!({"s3_target": "tasks/x"})).await.unwrap();
        let record = q.lookup("imagery", &task_id).await.unwrap().unwrap();
        assert_eq!(record.status, TaskStatus::Success);
        assert_eq!(record.result, Some(json!({"s3_target": "tasks/x"})));
    }

    #[tokio::test]
    async fn leased_task_is_not_redelivered() {
        let q = queue();
        q.enqueue("imagery", TaskStage::Filter, json!({})).await.unwrap();
        let first = q.receive("imagery", Duration::from_millis(10)).await.unwrap();
        assert!(first.is_some());
        let second = q.receive("imagery", Duration::from_millis(10)).await.unwrap();
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn expired_lease_makes_the_task_deliverable_again() {
        let q = MemoryQueue::new(5, Duration::from_millis(10));
        let task_id = q.enqueue("imagery", TaskStage::Filter, json!({})).await.unwrap();
        let first = q
            .receive("imagery", Duration::from_millis(10))
            .await
            .unwrap()
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        let second = q
            .receive("imagery", Duration::from_millis(50))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.task_id, task_id);
        assert_eq!(second.task_id, task_id);
        assert_eq!(second.attempt, 2);
    }

    #[tokio::test]
    async fn nack_retries_until_attempts_are_exhausted() {
        let q = queue();
        let task_id = q.enqueue("imagery", TaskStage::Filter, json!({})).await.unwrap();

        let first = q
            .receive("imagery", Duration::from_millis(10))
            .await
            .unwrap()
            .unwrap();
        q.nack(&first, "catalog unreachable").await.unwrap();
        let record = q.lookup("imagery", &task_id).await.unwrap().unwrap();
        assert_eq!(record.status, TaskStatus::Pending);
        assert_eq!(record.error.as_deref(), Some("catalog unreachable"));

        let second = q
            .receive("imagery", Duration::from_millis(10))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(second.attempt, 2);
        q.nack(&second, "catalog unreachable").await.unwrap();

        let record = q.lookup("imagery", &task_id).await.unwrap().unwrap();
        assert_eq!(record.status, TaskStatus::Failed);
        assert!(
            q.receive("imagery", Duration::from_millis(10))
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn terminal_status_is_monotonic() {
        let q = queue();
        let task_id = q.enqueue("imagery", TaskStage::Filter, json!({})).await.unwrap();
        let delivery = q
            .receive("imagery", Duration::from_millis(10))
            .await
            .unwrap()
            .unwrap();
        q.ack(&delivery, json!({"ok": true})).await.unwrap();

        // Late settlement of the same delivery must not revert the record.
        q.nack(&delivery, "stale failure").await.unwrap();
        let record = q.lookup("imagery", &task_id).await.unwrap().unwrap();
        assert_eq!(record.status, TaskStatus::Success);
        assert_eq!(record.error, None);
    }

    #[tokio::test]
    async fn queues_are_isolated() {
        let q = queue();
        q.enqueue("imagery-a", TaskStage::Filter, json!({})).await.unwrap();
        assert!(
            q.receive("imagery-b", Duration::from_millis(10))
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn lookup_of_unknown_task_returns_none() {
        let q = queue();
        assert!(q.lookup("imagery", "missing").await.unwrap().is_none());
    }
}
