use actix_web::{web, HttpResponse, Responder};
use std::sync::Arc;

use crate::engine::Engine;

/// Per-second series and running totals
pub async fn get_stats(engine: web::Data<Arc<Engine>>) -> impl Responder {
    HttpResponse::Ok().json(engine.stats_snapshot())
}
