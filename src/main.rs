use actix_cors::Cors;
use actix_web::{middleware, App, HttpServer};
use videorelay::api::{configure_app, AppState};
use videorelay::{banner, config::AppConfig};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    banner::print_banner();

    if let Err(e) = dotenvy::dotenv() {
        eprintln!("⚠️  No .env file loaded: {}", e);
    }

    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let app_config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            log::error!("{}", e);
            return Err(std::io::Error::other(e.to_string()));
        }
    };

    if !app_config.executable.exists() {
        log::warn!(
            "Executable {} not found; jobs will fail until it is installed",
            app_config.executable.display()
        );
    }
    std::fs::create_dir_all(&app_config.upload_dir)?;

    let bind = (app_config.host.clone(), app_config.port);
    let retention = app_config.job_retention();
    let state = AppState::new(app_config);

    match retention {
        Some(retention) => {
            state.jobs.spawn_sweeper(retention);
        }
        None => log::info!("Job retention disabled; finished jobs are kept"),
    }

    println!("🚀 Starting server...");
    println!("📼 Upload form available at http://{}:{}", bind.0, bind.1);

    HttpServer::new(move || {
        App::new()
            .wrap(Cors::permissive())
            .wrap(middleware::Logger::default())
            .configure(configure_app(state.clone()))
    })
    .bind(bind)?
    .run()
    .await
}
