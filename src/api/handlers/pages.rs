// src/api/handlers/pages.rs
use actix_web::HttpResponse;
use rust_embed::RustEmbed;
use std::borrow::Cow;

#[derive(RustEmbed)]
#[folder = "static/"]
struct StaticAssets;

fn embedded_page(path: &str) -> HttpResponse {
    match StaticAssets::get(path) {
        Some(content) => {
            let mime = mime_guess::from_path(path).first_or_octet_stream();
            HttpResponse::Ok().content_type(mime.as_ref()).body(Cow::into_owned(content.data))
        }
        None => HttpResponse::NotFound().body("404 Not Found"),
    }
}

/// The upload form.
pub async fn index_page() -> HttpResponse {
    embedded_page("index.html")
}

/// The results page. It reads the job id from its own query string.
pub async fn output_page() -> HttpResponse {
    embedded_page("output.html")
}
