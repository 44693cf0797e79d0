use lambda_http::{run, service_fn, tracing, Error, Request};
use aws_sdk_cognitoidentityprovider::Client as CognitoClient;
use aws_sdk_dynamodb::Client as DynamoClient;
use rupantor_shared::cognito::CognitoIdentity;
use rupantor_shared::config::{Config, KvBackend};
use rupantor_shared::dynamo::DynamoStore;
use rupantor_shared::kv::KvStore;
use rupantor_shared::memory::MemoryStore;
use rupantor_shared::AppState;
use std::sync::Arc;

mod http_handler;

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing::init_default_subscriber();

    let config = Config::from_env()?;

    // Initialize AWS clients once at startup
    let aws_config = aws_config::load_from_env().await;

    let store: Arc<dyn KvStore> = match config.kv_backend {
        KvBackend::DynamoDb => Arc::new(DynamoStore::new(
            DynamoClient::new(&aws_config),
            config.table_name.clone(),
        )),
        KvBackend::Memory => {
            tracing::warn!("KV_BACKEND=memory: data lives only as long as this instance");
            Arc::new(MemoryStore::new())
        }
    };

    if config.cognito_user_pool_id.is_none() {
        tracing::warn!("COGNITO_USER_POOL_ID not set; new accounts will not be auto-confirmed");
    }
    let identity = Arc::new(CognitoIdentity::new(
        CognitoClient::new(&aws_config),
        config.cognito_client_id.clone(),
        config.cognito_client_secret.clone(),
        config.cognito_user_pool_id.clone(),
    ));

    tracing::info!(
        "Starting API with table {} ({:?} backend)",
        config.table_name,
        config.kv_backend
    );
    let state = AppState::new(store, identity, config);

    run(service_fn(move |event: Request| {
        let state = Arc::clone(&state);
        async move { http_handler::function_handler(event, state).await }
    }))
    .await
}
