use actix_web::{web, HttpResponse, Responder};
use log::debug;
use serde::Deserialize;
use std::sync::Arc;

use crate::engine::Engine;
use crate::models::packet::Label;

/// Query parameters for listing packets
#[derive(Deserialize)]
pub struct PacketsQuery {
    /// all | safe | suspicious | malicious; anything else means all
    filter: Option<String>,
}

impl PacketsQuery {
    fn label(&self) -> Option<Label> {
        self.filter
            .as_deref()
            .and_then(|filter| filter.trim().to_ascii_lowercase().parse().ok())
    }
}

/// Get retained packets, oldest first
pub async fn get_packets(engine: web::Data<Arc<Engine>>, query: web::Query<PacketsQuery>) -> impl Responder {
    let packets = match query.label() {
        Some(label) => engine.packets_with_label(label),
        None => engine.packets(),
    };

    debug!("Returning {} packets (filter: {:?})", packets.len(), query.filter);

    HttpResponse::Ok().json(packets)
}

/// Get the alert log, oldest first
pub async fn get_alerts(engine: web::Data<Arc<Engine>>) -> impl Responder {
    HttpResponse::Ok().json(engine.alerts())
}
