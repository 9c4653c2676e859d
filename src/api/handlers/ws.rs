// src/api/handlers/ws.rs
use actix::{Actor, ActorContext, AsyncContext, Handler, StreamHandler};
use actix_web::{web, Error, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use serde::Deserialize;
use crate::api::AppState;
use crate::errors::RelayError;
use crate::models::JobEvent;

#[derive(Deserialize)]
pub struct WsQuery {
    pub job: Option<String>,
}

/// One browser listening to one job's output.
pub struct WsConnection {
    job_id: String,
    state: AppState,
}

impl WsConnection {
    pub fn new(job_id: String, state: AppState) -> Self {
        Self { job_id, state }
    }
}

impl Actor for WsConnection {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        let recipient = ctx.address().recipient();
        let job_id = self.job_id.clone();
        let jobs = self.state.jobs.clone();
        log::info!("Client connected to job {}", job_id);

        actix::spawn(async move {
            if let Err(e) = jobs.attach(&job_id, recipient).await {
                log::error!("Could not start job {}: {}", job_id, e);
            }
        });
    }

    fn stopped(&mut self, ctx: &mut Self::Context) {
        let recipient = ctx.address().recipient();
        let job_id = self.job_id.clone();
        let jobs = self.state.jobs.clone();
        log::info!("Client disconnected from job {}", job_id);

        actix::spawn(async move {
            jobs.detach(&job_id, &recipient).await;
        });
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for WsConnection {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(msg)) => ctx.pong(&msg),
            Ok(ws::Message::Close(reason)) => {
                ctx.close(reason);
                ctx.stop();
            }
            Err(e) => {
                log::warn!("WebSocket protocol error on job {}: {}", self.job_id, e);
                ctx.stop();
            }
            _ => (),
        }
    }
}

impl Handler<JobEvent> for WsConnection {
    type Result = ();

    fn handle(&mut self, msg: JobEvent, ctx: &mut Self::Context) {
        if let Ok(json) = serde_json::to_string(&msg) {
            ctx.text(json);
        }
    }
}

pub async fn ws_handler(
    req: HttpRequest,
    stream: web::Payload,
    query: web::Query<WsQuery>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let job_id = query
        .into_inner()
        .job
        .ok_or_else(|| RelayError::MissingField("job".to_string()))?;
    if !state.jobs.contains(&job_id).await {
        return Err(RelayError::JobNotFound(job_id).into());
    }

    let conn = WsConnection::new(job_id, state.get_ref().clone());
    ws::start(conn, &req, stream)
}
