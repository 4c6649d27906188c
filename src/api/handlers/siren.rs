use actix_web::{web, HttpResponse, Responder};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::engine::Engine;
use crate::models::siren::SirenLevel;

/// Request for forcing the siren level
#[derive(Deserialize, Default)]
pub struct SetModeRequest {
    mode: Option<String>,
}

#[derive(Serialize)]
struct ModeResponse {
    mode: SirenLevel,
}

#[derive(Serialize)]
struct SetModeResponse {
    ok: bool,
    mode: SirenLevel,
}

/// Current siren level
pub async fn get_siren(engine: web::Data<Arc<Engine>>) -> impl Responder {
    HttpResponse::Ok().json(ModeResponse {
        mode: engine.siren_level(),
    })
}

/// Force the siren level.
///
/// Accepts any body: a missing or unreadable `mode` means safe.
pub async fn set_siren(engine: web::Data<Arc<Engine>>, body: web::Bytes) -> impl Responder {
    let request: SetModeRequest = serde_json::from_slice(&body).unwrap_or_default();
    let level = request
        .mode
        .as_deref()
        .map(SirenLevel::parse_lenient)
        .unwrap_or_default();

    let mode = engine.set_siren_level(level);

    HttpResponse::Ok().json(SetModeResponse { ok: true, mode })
}
