use actix_web::{App, HttpServer, middleware::Logger, web};
use anyhow::Context;
use chrono::Local; // timestamp in log lines
use env_logger::{Env, Target};
use std::io::Write; // for env_logger custom formatter
use std::sync::Arc;

use checkout_backend::{
    config::Config,
    database::{create_pool, run_migrations},
    events::{EventBus, EventHandler, LogEventHandler},
    external::build_processor,
    handlers,
    middlewares::{AuthMiddleware, create_cors},
    services::*,
    session::{MemorySessionStore, SessionStore},
    swagger::swagger_config,
    utils::JwtService,
};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
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
    let config = Config::from_toml()
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {e}"))?;

    // 创建数据库连接池
    let pool = create_pool(&config.database)
        .await
        .context("Failed to create database connection pool")?;

    // 运行数据库迁移
    run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;

    let jwt_service = JwtService::new(&config.jwt.secret);

    // 支付网关只在启动时选择一次
    let processor = build_processor(&config);
    log::info!("Payment processor: {}", processor.name());

    let handlers_for_events: Vec<Arc<dyn EventHandler>> = vec![
        Arc::new(LogEventHandler),
        Arc::new(ShippingAddressRecorder::new(pool.clone())),
    ];
    let events = EventBus::new(handlers_for_events);
    let sessions: Arc<dyn SessionStore> = Arc::new(MemorySessionStore::new());

    // 创建服务
    let order_service = OrderService::new(pool.clone(), sessions, config.checkout.shipping);
    let checkout_service = CheckoutService::new(
        pool.clone(),
        processor.clone(),
        order_service.clone(),
        events,
        config.checkout.clone(),
    );
    let discount_service = DiscountService::new(pool.clone());
    let payment_admin_service = PaymentAdminService::new(pool.clone(), processor);

    // 启动HTTP服务器
    log::info!(
        "Starting HTTP server at {}:{}",
        config.server.host,
        config.server.port
    );

    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .wrap(create_cors())
            .wrap(AuthMiddleware::new(jwt_service.clone()))
            .app_data(web::Data::new(order_service.clone()))
            .app_data(web::Data::new(checkout_service.clone()))
            .app_data(web::Data::new(discount_service.clone()))
            .app_data(web::Data::new(payment_admin_service.clone()))
            .configure(swagger_config)
            .service(
                web::scope("/api/v1")
                    .configure(handlers::checkout_config)
                    .configure(handlers::order_config)
                    .configure(handlers::discount_config)
                    .configure(handlers::admin_config),
            )
    })
    .bind((config.server.host.as_str(), config.server.port))?
    .run()
    .await?;

    Ok(())
}
