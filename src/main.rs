use actix_web::{web, App, HttpServer};
use realtime_gateway::{
    config, db, error, logging, metrics,
    redis_client::RedisClient,
    routes::{self, dispatcher::dispatch_upgrade, status},
    services::{PgChatStore, RedisSessionStore, SessionAuthenticator},
    state::AppState,
};
use std::sync::Arc;

#[actix_web::main]
async fn main() -> Result<(), error::AppError> {
    let cfg = config::Config::from_env()?;
    logging::init_tracing(cfg.json_logs);

    let db = db::init_pool(&cfg.database_url, cfg.db_max_connections)
        .await
        .map_err(|e| error::AppError::StartServer(format!("db: {e}")))?;

    let redis = RedisClient::from_url(&cfg.redis_url)
        .await
        .map_err(|e| error::AppError::StartServer(format!("redis: {e}")))?;

    let sessions = Arc::new(RedisSessionStore::new(redis, cfg.session.key_prefix.clone()));
    let authenticator =
        SessionAuthenticator::new(cfg.session.cookie_name.clone(), &cfg.session.secrets, sessions);

    let store = Arc::new(PgChatStore::new(db));
    let state = AppState::new(store.clone(), store, &cfg.ws);
    let dispatcher = web::Data::new(routes::build_dispatcher(&cfg, &state, authenticator)?);
    let state = web::Data::new(state);

    let bind_addr = format!("0.0.0.0:{}", cfg.port);
    tracing::info!(
        %bind_addr,
        chat_path = %cfg.paths.chat,
        meeting_path = %cfg.paths.meeting,
        heartbeat_secs = cfg.ws.heartbeat_interval.as_secs(),
        "starting realtime-gateway"
    );

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .app_data(dispatcher.clone())
            .route("/health", web::get().to(status::health))
            .route("/metrics", web::get().to(metrics::metrics_handler))
            .configure(status::register_routes)
            .default_service(web::to(dispatch_upgrade))
    })
    .bind(&bind_addr)
    .map_err(|e| error::AppError::StartServer(format!("bind {bind_addr}: {e}")))?
    .run()
    .await
    .map_err(|e| error::AppError::StartServer(format!("run: {e}")))?;

    tracing::info!("realtime-gateway stopped");
    Ok(())
}
