use actix_web::{middleware, web, App, HttpServer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rategate_backend::{handlers, AppState, Config};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rategate_backend=debug,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().expect("Failed to load configuration");

    info!(
        "Starting rategate arbiter on {}:{}",
        config.host, config.port
    );

    let state = AppState::new(config.clone()).expect("Failed to open counter store handle");
    info!(redis_url = %config.redis_url, "Counter store handle ready");

    let app_state = web::Data::new(state);
    let server_addr = (config.host.clone(), config.port);

    HttpServer::new(move || {
        App::new()
            .app_data(app_state.clone())
            .wrap(middleware::Logger::default())
            .route("/healthz", web::get().to(handlers::healthz))
            .route("/metrics", web::get().to(handlers::metrics))
            .configure(handlers::configure_permit_routes)
            .configure(handlers::configure_report_routes)
    })
    .bind(server_addr)?
    .run()
    .await
}
