// src/api/handlers/mod.rs
mod health;
mod jobs;
mod pages;
mod upload;
pub mod ws;

pub use health::health_check;
pub use jobs::get_job;
pub use pages::{index_page, output_page};
pub use upload::upload_video;
pub use ws::{ws_handler, WsConnection};
