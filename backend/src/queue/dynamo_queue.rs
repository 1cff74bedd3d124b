use std::collections::HashMap;
use std::str::FromStr;
use std::time::{Duration, Instant};

use aws_sdk_dynamodb::Client;
use aws_sdk_dynamodb::types::{AttributeValue, ReturnValue};
use chrono::Utc;
use log::{debug, info, warn};
use serde_json::Value;
use shared::{TaskStage, TaskStatus};
use uuid::Uuid;

use super::{Delivery, QueueError, TaskQueue, TaskRecord};

const CLAIM_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// DynamoDB-backed queue. One item per task, keyed (queue, task_id); claims
/// are conditional updates on the visibility lease, so concurrent consumers
/// never hold the same delivery at once.
pub struct DynamoQueue {
    client: Client,
    table_name: String,
    max_attempts: u32,
    visibility: Duration,
}

impl DynamoQueue {
    pub fn new(
        client: Client,
        table_name: String,
        max_attempts: u32,
        visibility: Duration,
    ) -> Self {
        info!("Initializing DynamoDB queue backend with table: {table_name}");
        Self {
            client,
            table_name,
            max_attempts,
            visibility,
        }
    }

    async fn claimable_task_ids(&self, queue: &str, now_ms: i64) -> Result<Vec<String>, QueueError> {
        let response = self
            .client
            .query()
            .table_name(&self.table_name)
            .key_condition_expression("#q = :queue")
            .filter_expression(
                "#s = :pending AND (attribute_not_exists(lease_until) OR lease_until < :now)",
            )
            .expression_attribute_names("#q", "queue")
            .expression_attribute_names("#s", "status")
            .expression_attribute_values(":queue", AttributeValue::S(queue.to_string()))
            .expression_attribute_values(
                ":pending",
                AttributeValue::S(TaskStatus::Pending.to_string()),
            )
            .expression_attribute_values(":now", AttributeValue::N(now_ms.to_string()))
            .send()
            .await
            .map_err(|e| QueueError::Backend(e.to_string()))?;

        Ok(response
            .items()
            .iter()
            .filter_map(|item| string_attr(item, "task_id").ok())
            .collect())
    }

    /// Claims one task with a conditional update. Returns None when another
    /// consumer won the race for every candidate.
    async fn try_claim(&self, queue: &str) -> Result<Option<Delivery>, QueueError> {
        let now_ms = Utc::now().timestamp_millis();
        for task_id in self.claimable_task_ids(queue, now_ms).await? {
            let lease_until = now_ms + self.visibility.as_millis() as i64;
            let outcome = self
                .client
                .update_item()
                .table_name(&self.table_name)
                .key("queue", AttributeValue::S(queue.to_string()))
                .key("task_id", AttributeValue::S(task_id.clone()))
                .update_expression(
                    "SET lease_until = :lease, attempts = attempts + :one, updated_at = :ts",
                )
                .condition_expression(
                    "#s = :pending AND (attribute_not_exists(lease_until) OR lease_until < :now)",
                )
                .expression_attribute_names("#s", "status")
                .expression_attribute_values(":lease", AttributeValue::N(lease_until.to_string()))
                .expression_attribute_values(":one", AttributeValue::N("1".to_string()))
                .expression_attribute_values(":ts", AttributeValue::S(Utc::now().to_rfc3339()))
                .expression_attribute_values(
                    ":pending",
                    AttributeValue::S(TaskStatus::Pending.to_string()),
                )
                .expression_attribute_values(":now", AttributeValue::N(now_ms.to_string()))
                .return_values(ReturnValue::AllNew)
                .send()
                .await;

            match outcome {
                Ok(updated) => {
                    let attributes = updated.attributes().ok_or_else(|| {
                        QueueError::InvalidRecord(format!("claim of {task_id} returned no item"))
                    })?;
                    let stage = stage_attr(attributes)?;
                    let payload = payload_attr(attributes)?;
                    let attempt = number_attr(attributes, "attempts")?;
                    debug!("claimed task {task_id} from queue {queue} (attempt {attempt})");
                    return Ok(Some(Delivery {
                        queue: queue.to_string(),
                        task_id,
                        stage,
                        payload,
                        attempt,
                    }));
                }
                Err(err) => {
                    let service = err.into_service_error();
                    if service.is_conditional_check_failed_exception() {
                        debug!("lost claim race for task {task_id}, trying next");
                        continue;
                    }
                    return Err(QueueError::Backend(service.to_string()));
                }
            }
        }
        Ok(None)
    }

    async fn settle(
        &self,
        delivery: &Delivery,
        status: TaskStatus,
        result: Option<&Value>,
        error: Option<&str>,
    ) -> Result<(), QueueError> {
        let mut update = self
            .client
            .update_item()
            .table_name(&self.table_name)
            .key("queue", AttributeValue::S(delivery.queue.clone()))
            .key("task_id", AttributeValue::S(delivery.task_id.clone()))
            .condition_expression("#s = :pending")
            .expression_attribute_names("#s", "status")
            .expression_attribute_values(
                ":pending",
                AttributeValue::S(TaskStatus::Pending.to_string()),
            )
            .expression_attribute_values(":ts", AttributeValue::S(Utc::now().to_rfc3339()));

        update = match (status, result, error) {
            (TaskStatus::Success, Some(result), _) => update
                .update_expression(
                    "SET #s = :status, #r = :result, updated_at = :ts REMOVE lease_until",
                )
                .expression_attribute_names("#r", "result")
                .expression_attribute_values(
                    ":status",
                    AttributeValue::S(TaskStatus::Success.to_string()),
                )
                .expression_attribute_values(
                    ":result",
                    AttributeValue::S(serde_json::to_string(result)?),
                ),
            (TaskStatus::Failed, _, Some(error)) => update
                .update_expression(
                    "SET #s = :status, #e = :error, updated_at = :ts REMOVE lease_until",
                )
                .expression_attribute_names("#e", "error")
                .expression_attribute_values(
                    ":status",
                    AttributeValue::S(TaskStatus::Failed.to_string()),
                )
                .expression_attribute_values(":error", AttributeValue::S(error.to_string())),
            // Retryable failure: keep PENDING, record the error, release the lease.
            (TaskStatus::Pending, _, Some(error)) => update
                .update_expression("SET #e = :error, updated_at = :ts REMOVE lease_until")
                .expression_attribute_names("#e", "error")
                .expression_attribute_values(":error", AttributeValue::S(error.to_string())),
            _ => {
                return Err(QueueError::InvalidRecord(format!(
                    "unsupported settlement for task {}",
                    delivery.task_id
                )));
            }
        };

        match update.send().await {
            Ok(_) => Ok(()),
            Err(err) => {
                let service = err.into_service_error();
                if service.is_conditional_check_failed_exception() {
                    // Already settled by an earlier attempt; terminal statuses
                    // are monotonic, so this is not an error.
                    debug!("settlement of task {} ignored, already terminal", delivery.task_id);
                    Ok(())
                } else {
                    Err(QueueError::Backend(service.to_string()))
                }
            }
        }
    }

    fn attributes_to_record(
        &self,
        attributes: &HashMap<String, AttributeValue>,
    ) -> Result<TaskRecord, QueueError> {
        let status_str = string_attr(attributes, "status")?;
        let status = TaskStatus::from_str(&status_str)
            .map_err(|_| QueueError::InvalidRecord(format!("unknown status {status_str}")))?;
        let result = match attributes.get("result").and_then(|av| av.as_s().ok()) {
            Some(raw) => Some(serde_json::from_str(raw)?),
            None => None,
        };
        Ok(TaskRecord {
            task_id: string_attr(attributes, "task_id")?,
            queue: string_attr(attributes, "queue")?,
            stage: stage_attr(attributes)?,
            status,
            attempts: number_attr(attributes, "attempts")?,
            result,
            error: attributes
                .get("error")
                .and_then(|av| av.as_s().ok())
                .map(|s| s.to_string()),
            created_at: string_attr(attributes, "created_at")?,
            updated_at: string_attr(attributes, "updated_at")?,
        })
    }
}

#[async_trait::async_trait]
impl TaskQueue for DynamoQueue {
    async fn enqueue(
        &self,
        queue: &str,
        stage: TaskStage,
        payload: Value,
    ) -> Result<String, QueueError> {
        let task_id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        self.client
            .put_item()
            .table_name(&self.table_name)
            .item("queue", AttributeValue::S(queue.to_string()))
            .item("task_id", AttributeValue::S(task_id.clone()))
            .item("stage", AttributeValue::S(stage.to_string()))
            .item(
                "status",
                AttributeValue::S(TaskStatus::Pending.to_string()),
            )
            .item("attempts", AttributeValue::N("0".to_string()))
            .item(
                "payload",
                AttributeValue::S(serde_json::to_string(&payload)?),
            )
            .item("created_at", AttributeValue::S(now.clone()))
            .item("updated_at", AttributeValue::S(now))
            .condition_expression("attribute_not_exists(task_id)")
            .send()
            .await
            .map_err(|e| QueueError::Backend(e.to_string()))?;
        info!("enqueued {stage} task {task_id} on queue {queue}");
        Ok(task_id)
    }

    async fn receive(
        &self,
        queue: &str,
        wait: Duration,
    ) -> Result<Option<Delivery>, QueueError> {
        let deadline = Instant::now() + wait;
        loop {
            if let Some(delivery) = self.try_claim(queue).await? {
                return Ok(Some(delivery));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(CLAIM_POLL_INTERVAL.min(wait)).await;
        }
    }

    async fn ack(&self, delivery: &Delivery, result: Value) -> Result<(), QueueError> {
        self.settle(delivery, TaskStatus::Success, Some(&result), None)
            .await
    }

    async fn nack(&self, delivery: &Delivery, error: &str) -> Result<(), QueueError> {
        if delivery.attempt >= self.max_attempts {
            warn!(
                "task {} exhausted {} attempts, marking FAILED",
                delivery.task_id, delivery.attempt
            );
            self.settle(delivery, TaskStatus::Failed, None, Some(error))
                .await
        } else {
            self.settle(delivery, TaskStatus::Pending, None, Some(error))
                .await
        }
    }

    async fn lookup(
        &self,
        queue: &str,
        task_id: &str,
    ) -> Result<Option<TaskRecord>, QueueError> {
        let response = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .key("queue", AttributeValue::S(queue.to_string()))
            .key("task_id", AttributeValue::S(task_id.to_string()))
            .send()
            .await
            .map_err(|e| QueueError::Backend(e.to_string()))?;
        match response.item {
            Some(item) => Ok(Some(self.attributes_to_record(&item)?)),
            None => Ok(None),
        }
    }
}

fn string_attr(
    attributes: &HashMap<String, AttributeValue>,
    name: &str,
) -> Result<String, QueueError> {
    attributes
        .get(name)
        .and_then(|av| av.as_s().ok())
        .map(|s| s.to_string())
        .ok_or_else(|| QueueError::InvalidRecord(format!("missing {name} attribute")))
}

fn number_attr(
    attributes: &HashMap<String, AttributeValue>,
    name: &str,
) -> Result<u32, QueueError> {
    attributes
        .get(name)
        .and_then(|av| av.as_n().ok())
        .and_then(|raw| raw.parse().ok())
        .ok_or_else(|| QueueError::InvalidRecord(format!("missing {name} attribute")))
}

fn stage_attr(attributes: &HashMap<String, AttributeValue>) -> Result<TaskStage, QueueError> {
    let raw = string_attr(attributes, "stage")?;
    TaskStage::from_str(&raw)
        .map_err(|_| QueueError::InvalidRecord(format!("unknown stage {raw}")))
}

fn payload_attr(attributes: &HashMap<String, AttributeValue>) -> Result<Value, QueueError> {
    let raw = string_attr(attributes, "payload")?;
    Ok(serde_json::from_str(&raw)?)
}
