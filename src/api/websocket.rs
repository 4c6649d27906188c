use actix_web::{web, Error, HttpRequest, Responder};
use actix_ws::{self, Message};
use futures_util::StreamExt;
use log::{debug, info, warn};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::interval;

use crate::engine::Engine;
use crate::models::siren::SirenLevel;
use crate::models::stats::StatsSnapshot;

// How often heartbeat pings are sent
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);

// Clients that stay silent this long are dropped
const CLIENT_TIMEOUT: Duration = Duration::from_secs(15);

// How often stats and siren level are pushed
const UPDATE_INTERVAL: Duration = Duration::from_secs(1);

/// WebSocket message types that can be sent to clients
#[derive(Serialize)]
#[serde(tag = "type")]
enum WsOutMessage {
    #[serde(rename = "stats")]
    Stats { stats: StatsSnapshot },

    #[serde(rename = "siren")]
    Siren { mode: SirenLevel },

    #[serde(rename = "ping")]
    Ping { timestamp: i64 },
}

/// Handle WebSocket connections
pub async fn ws_index(
    req: HttpRequest,
    body: web::Payload,
    engine: web::Data<Arc<Engine>>,
) -> Result<impl Responder, Error> {
    let addr = req
        .peer_addr()
        .map(|peer| peer.to_string())
        .unwrap_or_else(|| "unknown".to_string());
    info!("WebSocket connection from: {}", addr);

    let (response, session, mut msg_stream) = actix_ws::handle(&req, body)?;

    let engine = engine.get_ref().clone();
    let last_seen = Arc::new(Mutex::new(Instant::now()));

    actix_web::rt::spawn(async move {
        // Initial state so the dashboard does not wait a full interval
        let mut session_initial = session.clone();
        if let Err(e) = send_state(&mut session_initial, &engine).await {
            warn!("Failed to send initial state: {}", e);
            return;
        }

        // Completes when the client closes or disconnects
        let ws_msg_task = {
            let mut session = session.clone();
            let engine = engine.clone();
            let last_seen = last_seen.clone();

            async move {
                while let Some(Ok(msg)) = msg_stream.next().await {
                    *last_seen.lock() = Instant::now();
                    match msg {
                        Message::Ping(bytes) => {
                            if session.pong(&bytes).await.is_err() {
                                break;
                            }
                        }
                        Message::Text(text) => {
                            debug!("Received text message: {}", text);

                            // Clients may ask for a refresh out of band
                            if matches!(text.trim(), "stats" | "siren")
                                && send_state(&mut session, &engine).await.is_err()
                            {
                                break;
                            }
                        }
                        Message::Close(_) => {
                            info!("Client requested close");
                            break;
                        }
                        _ => {}
                    }
                }
            }
        };

        // Periodic stats and siren pushes
        let updates_task = {
            let mut session = session.clone();
            let engine = engine.clone();

            async move {
                let mut ticker = interval(UPDATE_INTERVAL);
                // The first tick completes immediately and the initial state is already out
                ticker.tick().await;
                loop {
                    ticker.tick().await;
                    if send_state(&mut session, &engine).await.is_err() {
                        break;
                    }
                }
            }
        };

        let heartbeat_task = {
            let mut session = session.clone();

            async move {
                let mut heartbeat = interval(HEARTBEAT_INTERVAL);
                loop {
                    heartbeat.tick().await;

                    if last_seen.lock().elapsed() > CLIENT_TIMEOUT {
                        warn!("WebSocket client heartbeat timed out");
                        let _ = session.close(None).await;
                        break;
                    }

                    if session.ping(b"").await.is_err() {
                        break;
                    }

                    let ping_msg = WsOutMessage::Ping {
                        timestamp: chrono::Utc::now().timestamp(),
                    };
                    if send(&mut session, &ping_msg).await.is_err() {
                        break;
                    }
                }
            }
        };

        // Wait for any task to complete
        tokio::select! {
            _ = ws_msg_task => {},
            _ = updates_task => {},
            _ = heartbeat_task => {},
        }

        info!("WebSocket connection from {} closed", addr);
    });

    Ok(response)
}

/// Send the current stats and siren level
async fn send_state(session: &mut actix_ws::Session, engine: &Engine) -> Result<(), actix_ws::Closed> {
    send(session, &WsOutMessage::Stats {
        stats: engine.stats_snapshot(),
    })
    .await?;
    send(session, &WsOutMessage::Siren {
        mode: engine.siren_level(),
    })
    .await
}

async fn send(session: &mut actix_ws::Session, msg: &WsOutMessage) -> Result<(), actix_ws::Closed> {
    match serde_json::to_string(msg) {
        Ok(json) => session.text(json).await,
        Err(e) => {
            warn!("Failed to serialize WebSocket message: {}", e);
            Ok(())
        }
    }
}
