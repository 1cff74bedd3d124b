use std::sync::Arc;

use actix_web::error::InternalError;
use actix_web::{HttpResponse, web};
use log::{error, info};
use serde::{Deserialize, Serialize};
use serde_json::json;
use shared::{
    EnqueueResponse, FilterSubmission, PredictSubmission, StatusResponse, TaskStage, TaskStatus,
    ValidationIssue,
};

use crate::queue::TaskQueue;
use crate::storage::{BlobStore, BlobStoreError, TaskNamespace};

#[derive(Clone)]
pub struct AppState {
    pub queue: Arc<dyn TaskQueue>,
    pub blobs: Arc<dyn BlobStore>,
    pub imagery_queue: String,
    pub inference_queue: String,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Deserialize)]
pub struct StatusParams {
    queue: Option<String>,
}

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.app_data(json_config())
        .service(web::resource("/filter").route(web::post().to(submit_filter)))
        .service(web::resource("/predict").route(web::post().to(submit_predict)))
        .service(web::resource("/task/{task_id}").route(web::get().to(task_status)));
}

/// Malformed JSON bodies come back as a 422 with the same issue shape as
/// field-level validation failures.
fn json_config() -> web::JsonConfig {
    web::JsonConfig::default().error_handler(|err, _req| {
        let issues = vec![ValidationIssue::invalid(&["body"], err.to_string())];
        InternalError::from_response(err, validation_response(&issues)).into()
    })
}

fn validation_response(issues: &[ValidationIssue]) -> HttpResponse {
    HttpResponse::UnprocessableEntity().json(json!({ "detail": issues }))
}

fn enqueue_failure(context: &str, err: impl std::fmt::Display) -> HttpResponse {
    error!("{context}: {err}");
    HttpResponse::InternalServerError().json(ErrorResponse {
        error: format!("failed to {context}"),
    })
}

async fn submit_filter(
    state: web::Data<AppState>,
    body: web::Json<FilterSubmission>,
) -> HttpResponse {
    let (predicate, queue) = match body.into_inner().validate() {
        Ok(validated) => validated,
        Err(issues) => return validation_response(&issues),
    };
    let queue = queue.unwrap_or_else(|| state.imagery_queue.clone());
    let payload = match serde_json::to_value(&predicate) {
        Ok(payload) => payload,
        Err(err) => return enqueue_failure("serialize filter payload", err),
    };
    match state
        .queue
        .enqueue(&queue, TaskStage::Filter, payload)
        .await
    {
        Ok(task_id) => {
            info!("accepted filter task {task_id} on queue {queue}");
            HttpResponse::Created().json(EnqueueResponse { task_id, queue })
        }
        Err(err) => enqueue_failure("enqueue filter task", err),
    }
}

async fn submit_predict(
    state: web::Data<AppState>,
    body: web::Json<PredictSubmission>,
) -> HttpResponse {
    let (message, queue) = match body.into_inner().validate() {
        Ok(validated) => validated,
        Err(issues) => return validation_response(&issues),
    };
    let queue = queue.unwrap_or_else(|| state.inference_queue.clone());
    let payload = match serde_json::to_value(&message) {
        Ok(payload) => payload,
        Err(err) => return enqueue_failure("serialize inference payload", err),
    };
    match state
        .queue
        .enqueue(&queue, TaskStage::Inference, payload)
        .await
    {
        Ok(task_id) => {
            info!("accepted inference task {task_id} on queue {queue}");
            HttpResponse::Created().json(EnqueueResponse { task_id, queue })
        }
        Err(err) => enqueue_failure("enqueue inference task", err),
    }
}

async fn task_status(
    state: web::Data<AppState>,
    path: web::Path<String>,
    params: web::Query<StatusParams>,
) -> HttpResponse {
    let task_id = path.into_inner();
    let queue = params
        .into_inner()
        .queue
        .unwrap_or_else(|| state.imagery_queue.clone());

    match state.queue.lookup(&queue, &task_id).await {
        Ok(Some(record)) => {
            let response = match record.status {
                TaskStatus::Pending => StatusResponse::pending(),
                TaskStatus::Success => {
                    StatusResponse::success(record.result.unwrap_or(serde_json::Value::Null))
                }
                TaskStatus::Failed => StatusResponse::failed(
                    record
                        .error
                        .unwrap_or_else(|| "task failed".to_string()),
                ),
                // Backends never persist NOT_FOUND; treat a record claiming it
                // as pending bookkeeping.
                TaskStatus::NotFound => StatusResponse::pending(),
            };
            HttpResponse::Ok().json(response)
        }
        Ok(None) => {
            // Unknown to the queue backend (expired or never enqueued). Only
            // report SUCCESS when a durable artifact corroborates it.
            let namespace = TaskNamespace::new(&task_id);
            match corroborated_result(state.blobs.as_ref(), &namespace).await {
                Ok(Some(result)) => HttpResponse::Ok().json(StatusResponse::success(result)),
                Ok(None) => HttpResponse::Ok().json(StatusResponse::not_found()),
                Err(err) => {
                    error!("artifact check for task {task_id} failed: {err}");
                    HttpResponse::InternalServerError().json(ErrorResponse {
                        error: "failed to resolve task status".to_string(),
                    })
                }
            }
        }
        Err(err) => {
            error!("status lookup for task {task_id} failed: {err}");
            HttpResponse::InternalServerError().json(ErrorResponse {
                error: "failed to resolve task status".to_string(),
            })
        }
    }
}

async fn corroborated_result(
    blobs: &dyn BlobStore,
    namespace: &TaskNamespace,
) -> Result<Option<serde_json::Value>, BlobStoreError> {
    if blobs.exists(&namespace.inferences_key()).await?
        || blobs.exists(&namespace.metadata_key()).await?
    {
        return Ok(Some(json!({ "s3_target": namespace.root() })));
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{App, test};
    use std::time::Duration;

    use crate::queue::memory_queue::MemoryQueue;
    use crate::queue::{Delivery, TaskQueue};
    use crate::storage::memory_store::MemoryBlobStore;

    fn state() -> AppState {
        AppState {
            queue: Arc::new(MemoryQueue::new(3, Duration::from_secs(30))),
            blobs: Arc::new(MemoryBlobStore::new()),
            imagery_queue: "imagery".to_string(),
            inference_queue: "inference".to_string(),
        }
    }

    macro_rules! service {
        ($state:expr) => {
            test::init_service(
                App::new()
                    .app_data(web::Data::new($state))
                    .configure(configure_routes),
            )
            .await
        };
    }

    #[actix_web::test]
    async fn missing_gender_yields_exactly_one_issue() {
        let app = service!(state());
        let req = test::TestRequest::post()
            .uri("/filter")
            .set_json(json!({"foo": 1}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 422);
        let body: serde_json::Value = test::read_body_json(resp).await;
        let detail = body["detail"].as_array().unwrap();
        assert_eq!(detail.len(), 1);
        assert_eq!(detail[0]["loc"], json!(["body", "gender"]));
    }

    #[actix_web::test]
    async fn filter_submission_is_enqueued_and_pending() {
        let state = state();
        let app = service!(state.clone());
        let req = test::TestRequest::post()
            .uri("/filter")
            .set_json(json!({"gender": "Women", "sub_category": "Dress", "limit": 10}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 201);
        let body: EnqueueResponse = test::read_body_json(resp).await;
        assert_eq!(body.queue, "imagery");

        let req = test::TestRequest::get()
            .uri(&format!("/task/{}?queue=imagery", body.task_id))
            .to_request();
        let status: StatusResponse =
            test::read_body_json(test::call_service(&app, req).await).await;
        assert_eq!(status.status, TaskStatus::Pending);
    }

    #[actix_web::test]
    async fn predict_requires_a_task_reference() {
        let app = service!(state());
        let req = test::TestRequest::post()
            .uri("/predict")
            .set_json(json!({"queue": "inference"}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 422);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["detail"][0]["loc"], json!(["body", "task_id"]));
    }

    #[actix_web::test]
    async fn malformed_json_is_a_validation_error() {
        let app = service!(state());
        let req = test::TestRequest::post()
            .uri("/filter")
            .insert_header(("content-type", "application/json"))
            .set_payload("{not json")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 422);
    }

    #[actix_web::test]
    async fn unknown_task_is_not_found_without_artifacts() {
        let app = service!(state());
        let req = test::TestRequest::get()
            .uri("/task/does-not-exist?queue=imagery")
            .to_request();
        let status: StatusResponse =
            test::read_body_json(test::call_service(&app, req).await).await;
        assert_eq!(status.status, TaskStatus::NotFound);
    }

    #[actix_web::test]
    async fn unknown_task_with_artifacts_is_corroborated_success() {
        let state = state();
        state
            .blobs
            .put("tasks/expired-task/metadata.json", b"[]".to_vec(), "application/json")
            .await
            .unwrap();
        let app = service!(state);
        let req = test::TestRequest::get()
            .uri("/task/expired-task?queue=imagery")
            .to_request();
        let status: StatusResponse =
            test::read_body_json(test::call_service(&app, req).await).await;
        assert_eq!(status.status, TaskStatus::Success);
        assert_eq!(status.result, Some(json!({"s3_target": "tasks/expired-task"})));
    }

    #[actix_web::test]
    async fn failed_attempts_surface_the_last_error() {
        let state = state();
        let task_id = state
            .queue
            .enqueue("imagery", TaskStage::Filter, json!({"gender": "Women"}))
            .await
            .unwrap();
        let delivery = state
            .queue
            .receive("imagery", Duration::from_millis(10))
            .await
            .unwrap()
            .unwrap();
        // Exhaust the remaining attempts.
        state.queue.nack(&delivery, "catalog unreachable").await.unwrap();
        for _ in 0..2 {
            let delivery: Delivery = state
                .queue
                .receive("imagery", Duration::from_millis(10))
                .await
                .unwrap()
                .unwrap();
            state.queue.nack(&delivery, "catalog unreachable").await.unwrap();
        }

        let app = service!(state);
        let req = test::TestRequest::get()
            .uri(&format!("/task/{task_id}?queue=imagery"))
            .to_request();
        let status: StatusResponse =
            test::read_body_json(test::call_service(&app, req).await).await;
        assert_eq!(status.status, TaskStatus::Failed);
        assert_eq!(status.error.as_deref(), Some("catalog unreachable"));
    }
}
