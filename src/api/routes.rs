// src/api/routes.rs
use actix_files::Files;
use actix_web::web;
use super::handlers;
use super::AppState;

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/")
            .route(web::get().to(handlers::index_page))
            .route(web::post().to(handlers::upload_video))
    )
    .route("/output", web::get().to(handlers::output_page))
    .route("/ws", web::get().to(handlers::ws_handler))
    .service(
        web::scope("/api/v1")
            .route("/health", web::get().to(handlers::health_check))
            .route("/jobs/{id}", web::get().to(handlers::get_job))
    );
}

/// Shared state, routes and the upload file server for one app instance.
pub fn configure_app(state: AppState) -> impl FnOnce(&mut web::ServiceConfig) {
    move |cfg| {
        let upload_dir = state.config.upload_dir.clone();

        cfg.app_data(web::Data::new(state))
            .configure(configure_routes)
            .service(Files::new("/uploads", upload_dir));
    }
}
