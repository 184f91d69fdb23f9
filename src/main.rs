use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use gift_quiz_api::{
    api::{create_router, AppState},
    config::Config,
    db::{create_redis_client, Cache},
    services::{
        providers::ChatCompletionsClient, FeedbackStore, JsonFileProvider, ShareStore, Snapshot,
    },
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("gift_quiz_api=info,tower_http=info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    let provider = JsonFileProvider {
        catalog_path: config.catalog_path.clone().into(),
        questions_path: config.questions_path.clone().into(),
        tag_embeddings_path: config.tag_embeddings_path.clone().into(),
    };
    let snapshot = Arc::new(Snapshot::load(&provider, &provider, &provider)?);

    let mut state = AppState::new(snapshot, config.engine())
        .with_free_text_max_chars(config.free_text_max_chars);

    let mut cache_writer = None;
    let cache = match config.redis_url.as_deref() {
        Some(redis_url) => {
            let (cache, handle) = Cache::new(create_redis_client(redis_url)?).await;
            cache_writer = Some(handle);
            state = state
                .with_shares(ShareStore::new(cache.clone(), config.share_ttl_secs))
                .with_feedback(FeedbackStore::new(cache.clone()));
            tracing::info!("Redis cache enabled, sharing and feedback available");
            Some(cache)
        }
        None => {
            tracing::warn!("REDIS_URL not set, sharing, feedback and collaborator caching disabled");
            None
        }
    };

    match config.chat_api_key.clone() {
        Some(api_key) => {
            let chat = Arc::new(ChatCompletionsClient::new(
                config.chat_api_url.clone(),
                api_key,
                config.chat_model.clone(),
                cache,
            ));
            state = state.with_interpreter(chat.clone()).with_generator(chat);
            tracing::info!(model = %config.chat_model, "Chat collaborators enabled");
        }
        None => {
            tracing::warn!("CHAT_API_KEY not set, free text and generated questions disabled");
        }
    }

    let sweeper = state.spawn_session_sweeper(
        Duration::from_secs(config.session_sweep_secs.max(1)),
        Duration::from_secs(config.session_idle_secs),
    );

    let app = create_router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sweeper.abort();
    if let Some(handle) = cache_writer {
        handle.shutdown().await;
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutdown signal received");
}
