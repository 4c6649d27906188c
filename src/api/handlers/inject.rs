use actix_web::{web, HttpResponse, Responder};
use log::debug;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use crate::engine::Engine;
use crate::models::config::AppConfig;
use crate::models::packet::RawPacket;

/// Destination ports synthetic traffic is drawn from
const SERVICE_PORTS: [u16; 6] = [22, 53, 80, 443, 3389, 8080];

const PROTOCOLS: [&str; 3] = ["TCP", "UDP", "ICMP"];

/// Request for injecting a synthetic packet
#[derive(Deserialize, Default)]
pub struct InjectRequest {
    label: Option<String>,
}

/// Random port above 1023, avoiding `blacklist` when it can
fn ephemeral_port<R: Rng + ?Sized>(blacklist: &[u16], rng: &mut R) -> u16 {
    let mut port = rng.gen_range(1024..=65535);
    for _ in 0..32 {
        if !blacklist.contains(&port) {
            break;
        }
        port = rng.gen_range(1024..=65535);
    }
    port
}

/// Build a random packet on private addresses carrying `label`.
///
/// Blacklisted ports are never chosen so the asserted label is not
/// overridden by the port rule.
pub fn synthetic_packet<R: Rng + ?Sized>(label: &str, blacklist_ports: &[u16], rng: &mut R) -> RawPacket {
    let ports: Vec<u16> = SERVICE_PORTS
        .iter()
        .copied()
        .filter(|port| !blacklist_ports.contains(port))
        .collect();
    let dport = ports
        .choose(rng)
        .copied()
        .unwrap_or_else(|| ephemeral_port(blacklist_ports, rng));

    RawPacket {
        timestamp: None,
        src: Some(format!("10.0.{}.{}", rng.gen_range(0..=255), rng.gen_range(1..=254))),
        dst: Some(format!("172.16.{}.{}", rng.gen_range(0..=31), rng.gen_range(1..=254))),
        proto: PROTOCOLS.choose(rng).map(|proto| proto.to_string()),
        sport: Some(ephemeral_port(blacklist_ports, rng)),
        dport: Some(dport),
        length: Some(rng.gen_range(60..=1500)),
        tcp_flags: None,
        label: Some(label.to_string()),
    }
}

/// Push one synthetic packet through the engine
pub async fn inject_packet(
    engine: web::Data<Arc<Engine>>,
    config: web::Data<AppConfig>,
    body: web::Bytes,
) -> impl Responder {
    let request: InjectRequest = serde_json::from_slice(&body).unwrap_or_default();
    let label = request.label.unwrap_or_else(|| "safe".to_string());

    let raw = synthetic_packet(&label, &config.detection.blacklist_ports, &mut rand::thread_rng());
    let record = engine.ingest(raw);
    debug!("Injected {} packet with score {:.2}", record.label, record.score);

    HttpResponse::Ok().json(json!({ "ok": true }))
}
