use actix_cors::Cors;
use actix_web::{App, HttpServer, web};
use aws_config::BehaviorVersion;
use aws_sdk_dynamodb::Client as DynamoDbClient;
use aws_sdk_s3::Client as S3Client;
use std::sync::Arc;

use backend::config::AppConfig;
use backend::queue::dynamo_queue::DynamoQueue;
use backend::routes::{AppState, configure_routes};
use backend::storage::s3_store::S3BlobStore;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));
    dotenv::dotenv().ok();

    let config = AppConfig::from_env();

    // Initialize AWS configuration
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
    let state = AppState {
        queue,
        blobs,
        imagery_queue: config.imagery_queue.clone(),
        inference_queue: config.inference_queue.clone(),
    };

    let bind_address = format!("0.0.0.0:{}", config.port);
    log::info!("Starting server on {}", bind_address);

    HttpServer::new(move || {
        App::new()
            .wrap(
                Cors::default()
                    .allow_any_origin()
                    .allowed_methods(vec!["GET", "POST", "OPTIONS"])
                    .allowed_headers(vec![
                        actix_web::http::header::ACCEPT,
                        actix_web::http::header::CONTENT_TYPE,
                    ])
                    .max_age(3600),
            )
            .app_data(web::Data::new(state.clone()))
            .configure(configure_routes)
    })
    .bind(&bind_address)?
    .run()
    .await
}
