use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Process configuration, read once at startup. Every value has a default so
/// a local run against in-region AWS resources needs no .env file.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub tasks_table: String,
    pub catalog_table: String,
    pub bucket_name: String,
    pub imagery_queue: String,
    pub inference_queue: String,
    pub max_attempts: u32,
    pub visibility: Duration,
    pub receive_wait: Duration,
    pub source_prefix: String,
    pub augmentation_seed: u64,
    pub model_seed: u64,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            port: parse_var("PORT", 8081),
            tasks_table: string_var("DYNAMODB_TASKS_TABLE", "tasks"),
            catalog_table: string_var("DYNAMODB_PRODUCTS_TABLE", "products"),
            bucket_name: string_var("S3_BUCKET_NAME", "tcc-clothes"),
            imagery_queue: string_var("IMAGERY_QUEUE", "imagery"),
            inference_queue: string_var("INFERENCE_QUEUE", "inference"),
            max_attempts: parse_var("QUEUE_MAX_ATTEMPTS", 3),
            visibility: Duration::from_secs(parse_var("QUEUE_VISIBILITY_SECONDS", 300)),
            receive_wait: Duration::from_secs(parse_var("QUEUE_RECEIVE_WAIT_SECONDS", 5)),
            source_prefix: string_var("SOURCE_IMAGE_PREFIX", "images"),
            augmentation_seed: parse_var("AUGMENTATION_SEED", 42),
            model_seed: parse_var("MODEL_SEED", 16),
        }
    }
}

fn string_var(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn parse_var<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}
