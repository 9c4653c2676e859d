// src/api/handlers/jobs.rs
use actix_web::{web, HttpResponse};
use crate::api::AppState;
use crate::errors::RelayError;

pub async fn get_job(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, RelayError> {
    let job_id = path.into_inner();
    match state.jobs.get(&job_id).await {
        Some(job) => Ok(HttpResponse::Ok().json(job)),
        None => Err(RelayError::JobNotFound(job_id)),
    }
}
