use actix_web::{App, HttpServer, middleware::Logger, web};
use chrono::Local; // timestamp in log lines
use env_logger::{Env, Target};
use std::io::Write; // for env_logger custom formatter
use std::sync::Arc;

use zlma_backend::{
    config::Config,
    database::{create_pool, run_migrations},
    external::{
        ChatCompletionProvider, FirebaseAuth, IdentityProvider, OpenRouterClient, PaymentGateway,
        PaystackClient,
    },
    handlers,
    middlewares::{AuthMiddleware, create_cors},
    models::RateLimits,
    services::*,
    swagger::swagger_config,
    tasks,
};

fn startup_error(context: &str, e: impl std::fmt::Display) -> std::io::Error {
    std::io::Error::other(format!("{context}: {e}"))
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .format(|buf, record| {
            let ts = Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z");
            let level = record.level().as_str().to_ascii_lowercase();
            let msg_json = serde_json::to_string(&format!("{}", record.args()))
                .unwrap_or_else(|_| "\"<invalid utf8>\"".to_string());
            writeln!(
                buf,
                "{{\"timestamp\":\"{}\",\"level\":\"{}\",\"message\":{},\"target\":\"{}\"}}",
                ts,
                level,
                msg_json,
                record.target(),
            )
        })
        .target(Target::Stdout)
        .init();

    // 加载配置
    let config =
        Config::from_toml().map_err(|e| startup_error("Failed to load configuration", e))?;

    // 数据库连接与迁移
    let pool = create_pool(&config.database)
        .await
        .map_err(|e| startup_error("Failed to create database connection pool", e))?;
    run_migrations(&pool)
        .await
        .map_err(|e| startup_error("Failed to run database migrations", e))?;

    // 外部服务
    let identity: Arc<dyn IdentityProvider> = Arc::new(
        FirebaseAuth::new(&config.firebase)
            .map_err(|e| startup_error("Failed to initialise Firebase", e))?,
    );
    let completion: Arc<dyn ChatCompletionProvider> = Arc::new(
        OpenRouterClient::new(
            config.openrouter.clone(),
            config.chat.max_tokens,
            config.chat.temperature,
        )
        .map_err(|e| startup_error("Failed to initialise OpenRouter client", e))?,
    );
    let gateway: Arc<dyn PaymentGateway> = Arc::new(PaystackClient::new(config.paystack.clone()));

    // 服务
    let settings_service = SettingsService::new(pool.clone());
    let user_service = UserService::new(pool.clone(), identity.clone());
    let subscription_service = SubscriptionService::new(pool.clone(), settings_service.clone());
    let auth_service = AuthService::new(
        identity.clone(),
        user_service.clone(),
        settings_service.clone(),
    );
    let rate_limiter = RateLimitService::new(RateLimits::default());
    let chat_service = ChatService::new(
        pool.clone(),
        completion,
        user_service.clone(),
        subscription_service.clone(),
        settings_service.clone(),
        rate_limiter.clone(),
        config.chat.conversation_list_limit,
    );
    let payment_service = PaymentService::new(
        pool.clone(),
        gateway,
        config.paystack.default_callback_url.clone(),
    );
    let admin_service = AdminService::new(
        pool.clone(),
        identity.clone(),
        user_service.clone(),
        settings_service.clone(),
    );

    tasks::spawn_all(
        subscription_service.clone(),
        rate_limiter,
        config.chat.expiry_sweep_interval_secs,
    );

    log::info!(
        "Starting HTTP server at {}:{}",
        config.server.host,
        config.server.port
    );

    let cors_origins = config.server.cors_origins.clone();
    HttpServer::new(move || {
        App::new()
            .wrap(AuthMiddleware::new(identity.clone()))
            .wrap(create_cors(&cors_origins))
            .wrap(Logger::default())
            .app_data(web::Data::new(auth_service.clone()))
            .app_data(web::Data::new(user_service.clone()))
            .app_data(web::Data::new(subscription_service.clone()))
            .app_data(web::Data::new(chat_service.clone()))
            .app_data(web::Data::new(payment_service.clone()))
            .app_data(web::Data::new(admin_service.clone()))
            .configure(swagger_config)
            .configure(handlers::health_config)
            .service(
                web::scope("/api")
                    .configure(handlers::auth_config)
                    .configure(handlers::chat_config)
                    .configure(handlers::user_config)
                    .configure(handlers::subscription_config)
                    .configure(handlers::mobile_config)
                    .configure(handlers::admin_config)
                    .configure(handlers::webhook_config),
            )
    })
    .bind((config.server.host.as_str(), config.server.port))?
    .run()
    .await
}
