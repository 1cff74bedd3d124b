use std::env;
use std::sync::Arc;

use aws_config::BehaviorVersion;
use aws_sdk_dynamodb::Client as DynamoDbClient;
use aws_sdk_s3::Client as S3Client;

use backend::config::AppConfig;
use backend::imgproc::model::FashionModel;
use backend::queue::dynamo_queue::DynamoQueue;
use backend::storage::s3_store::S3BlobStore;
use backend::workers::consumer;
use backend::workers::inference::InferenceWorker;

#[tokio::main]
async fn main() {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));
    dotenv::dotenv().ok();

    let config = AppConfig::from_env();
    let queue_name = env::var("QUEUE_NAME").unwrap_or_else(|_| config.inference_queue.clone());

    let aws_config = aws_config::defaults(BehaviorVersion::latest()).load().await;
    let dynamodb_client = DynamoDbClient::new(&aws_config);
    let s3_client = S3Client::new(&aws_config);

    let queue = Arc::new(DynamoQueue::new(
        dynamodb_client,
        config.tasks_table.clone(),
        config.max_attempts,
        config.visibility,
    ));
    let blobs = Arc::new(S3BlobStore::new(s3_client, config.bucket_name.clone()));

    // One weights-seeded model instance shared across the whole batch.
    let model = Arc::new(FashionModel::new(config.model_seed));
    let worker = Arc::new(InferenceWorker::new(blobs, model));

    consumer::run(queue, &queue_name, worker, config.receive_wait).await;
}
