//! Streams synthetic labelled traffic into a running SharkWatch server.

use anyhow::Result;
use clap::Parser;
use log::{info, warn};
use rand::seq::SliceRandom;
use std::time::Duration;

/// Skewed towards safe traffic, 3:1:1
const LABELS: [&str; 5] = ["safe", "safe", "safe", "suspicious", "malicious"];

const MAX_BACKOFF: Duration = Duration::from_secs(5);

#[derive(Parser, Debug)]
#[clap(author, version, about = "Send synthetic traffic to a SharkWatch server")]
struct Args {
    /// Base URL of the server
    #[clap(long, env = "LPA_BASE_URL", default_value = "http://127.0.0.1:5000")]
    base_url: String,

    /// Packets injected per second
    #[clap(long, default_value = "6")]
    rate: u32,

    /// Stop after this many seconds (runs until interrupted when absent)
    #[clap(long)]
    duration: Option<u64>,
}

struct Streamer {
    client: reqwest::Client,
    base_url: String,
    rate: u32,
}

impl Streamer {
    async fn wait_for_server(&self) -> Result<()> {
        self.client
            .get(format!("{}/api/stats", self.base_url))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    /// One second worth of injections
    async fn burst(&self) -> Result<()> {
        for _ in 0..self.rate {
            let label = LABELS.choose(&mut rand::thread_rng()).copied().unwrap_or("safe");
            self.client
                .post(format!("{}/api/inject", self.base_url))
                .json(&serde_json::json!({ "label": label }))
                .send()
                .await?
                .error_for_status()?;
        }
        Ok(())
    }
}

fn next_backoff(current: Duration) -> Duration {
    (current * 2).min(MAX_BACKOFF)
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let streamer = Streamer {
        client: reqwest::Client::builder().timeout(Duration::from_secs(3)).build()?,
        base_url: args.base_url.trim_end_matches('/').to_string(),
        rate: args.rate,
    };
    let deadline = args
        .duration
        .map(|secs| tokio::time::Instant::now() + Duration::from_secs(secs));

    info!("Streaming mixed traffic to {} at {}/s, Ctrl+C to stop", streamer.base_url, streamer.rate);

    let stream = async {
        let mut backoff = Duration::from_secs(1);
        let mut connected = false;
        loop {
            if deadline.map_or(false, |deadline| tokio::time::Instant::now() >= deadline) {
                break;
            }

            let attempt = async {
                if !connected {
                    streamer.wait_for_server().await?;
                }
                streamer.burst().await
            };

            match attempt.await {
                Ok(()) => {
                    if !connected {
                        info!("Connected to {}", streamer.base_url);
                        connected = true;
                    }
                    backoff = Duration::from_secs(1);
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
                Err(e) => {
                    if connected {
                        warn!("Lost connection, retrying in {:?}: {}", backoff, e);
                    } else {
                        info!("Waiting for server...");
                    }
                    tokio::time::sleep(backoff).await;
                    backoff = next_backoff(backoff);
                }
            }
        }
    };

    tokio::select! {
        _ = stream => info!("Done"),
        _ = tokio::signal::ctrl_c() => info!("Stopped stream"),
    }

    Ok(())
}
