use actix_web::{web, HttpResponse, Responder};
use serde_json::json;
use std::net::IpAddr;
use std::sync::Arc;

use crate::geo::GeoLocator;

/// Geolocation for one address; `geo` is null when unavailable
pub async fn get_geo(locator: web::Data<Arc<GeoLocator>>, path: web::Path<String>) -> impl Responder {
    let raw = path.into_inner();
    let ip: IpAddr = match raw.trim().parse() {
        Ok(ip) => ip,
        Err(_) => {
            return HttpResponse::BadRequest().json(json!({
                "status": "error",
                "message": format!("'{}' is not an IP address", raw)
            }))
        }
    };

    let geo = locator.lookup(ip).await;

    HttpResponse::Ok().json(json!({ "ip": ip, "geo": geo }))
}
