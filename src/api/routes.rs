use actix_web::{web, HttpResponse, Responder};
use serde_json::json;

use crate::api::handlers::{
    geo::get_geo,
    inject::inject_packet,
    packets::{get_alerts, get_packets},
    siren::{get_siren, set_siren},
    stats::get_stats,
};
use crate::api::websocket::ws_index;
use crate::models::config::AppConfig;

/// Root endpoint to provide information about the API
async fn index(config: web::Data<AppConfig>) -> impl Responder {
    HttpResponse::Ok().json(json!({
        "name": "SharkWatch API",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Live packet classification with a debounced siren",
        "capture": {
            "interface": config.capture.interface,
            "filter": config.capture.filter,
        },
        "endpoints": [
            {
                "path": "/api/inject",
                "method": "POST",
                "description": "Inject a synthetic packet with a label"
            },
            {
                "path": "/api/packets",
                "method": "GET",
                "description": "Recent packets, optionally ?filter=safe|suspicious|malicious"
            },
            {
                "path": "/api/alerts",
                "method": "GET",
                "description": "Recent suspicious and malicious packets"
            },
            {
                "path": "/api/stats",
                "method": "GET",
                "description": "Per-second series and running totals"
            },
            {
                "path": "/api/siren",
                "method": "GET",
                "description": "Current siren level"
            },
            {
                "path": "/api/siren",
                "method": "POST",
                "description": "Force the siren level"
            },
            {
                "path": "/api/geo/{ip}",
                "method": "GET",
                "description": "Geolocation of an address"
            },
            {
                "path": "/api/ws",
                "method": "GET",
                "description": "WebSocket endpoint for real-time updates"
            }
        ]
    }))
}

/// Configure API routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg
        // Root endpoint
        .route("/", web::get().to(index))
        .service(
            web::scope("/api")
                // WebSocket route for real-time updates
                .route("/ws", web::get().to(ws_index))
                // Traffic
                .route("/inject", web::post().to(inject_packet))
                .route("/packets", web::get().to(get_packets))
                .route("/alerts", web::get().to(get_alerts))
                .route("/stats", web::get().to(get_stats))
                // Siren
                .service(
                    web::scope("/siren")
                        .route("", web::get().to(get_siren))
                        .route("", web::post().to(set_siren)),
                )
                // Enrichment
                .route("/geo/{ip}", web::get().to(get_geo)),
        );
}
