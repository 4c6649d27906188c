mod api;
mod engine;
mod geo;
mod models;
mod siren;
mod utils;

use actix_web::{web, App, HttpServer};
use anyhow::Result;
use clap::Parser;
use log::{info, warn};
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;

use crate::api::routes;
use crate::engine::model::ModelPipeline;
use crate::engine::Engine;
use crate::geo::GeoLocator;
use crate::models::config::{
    AlarmConfig, AppConfig, CaptureConfig, DetectionConfig, GeoConfig, RetentionConfig,
};
use crate::models::siren::SirenLevel;
use crate::utils::logging;

#[derive(Parser, Debug)]
#[clap(author, version, about = "Live packet classification backend with a debounced siren")]
struct Args {
    /// Port for the REST API server
    #[clap(short, long, env = "LPA_PORT", default_value = "5000")]
    port: u16,

    /// Address the REST API binds to
    #[clap(long, env = "LPA_BIND", default_value = "0.0.0.0")]
    bind: String,

    /// Packets kept in memory
    #[clap(long, env = "LPA_MAX_PACKETS", default_value = "1200")]
    max_packets: usize,

    /// Alerts kept in memory
    #[clap(long, env = "LPA_MAX_ALERTS", default_value = "500")]
    max_alerts: usize,

    /// Seconds of per-second statistics kept
    #[clap(long, env = "LPA_SERIES_WINDOW", default_value = "180")]
    series_window: usize,

    /// Model probability for a malicious verdict
    #[clap(long, env = "LPA_ALERT_THRESHOLD", default_value = "0.85")]
    alert_threshold: f64,

    /// Model probability for a suspicious verdict
    #[clap(long, env = "LPA_SUSPICIOUS_THRESHOLD", default_value = "0.6")]
    suspicious_threshold: f64,

    /// Network interface used by the capture producer
    #[clap(short, long, env = "LPA_IFACE")]
    interface: Option<String>,

    /// BPF filter expression used by the capture producer
    #[clap(long, env = "LPA_BPF", default_value = "ip")]
    filter: String,

    /// Siren level before any traffic (safe, suspicious, high)
    #[clap(long, env = "LPA_DEFAULT_MODE", default_value = "safe")]
    default_mode: String,

    /// Minimum seconds between high alarms
    #[clap(long, env = "LPA_THROTTLE_HIGH", default_value = "3.0")]
    throttle_high: f64,

    /// Minimum seconds between suspicious alarms
    #[clap(long, env = "LPA_THROTTLE_SUSPICIOUS", default_value = "2.0")]
    throttle_suspicious: f64,

    /// Minimum seconds between all-clear signals
    #[clap(long, env = "LPA_THROTTLE_SAFE", default_value = "1.0")]
    throttle_safe: f64,

    /// SYN-only segments per source tolerated per reset window
    #[clap(long, env = "LPA_SYN_THRESHOLD", default_value = "100")]
    syn_threshold: u32,

    /// Seconds between SYN counter resets
    #[clap(long, env = "LPA_SYN_RESET_SECS", default_value = "30")]
    syn_reset_secs: u64,

    /// Ports that make traffic suspicious
    #[clap(long, env = "LPA_BLACKLIST_PORTS", value_delimiter = ',', default_value = "23,2323,3389,4444,5900")]
    blacklist_ports: Vec<u16>,

    /// Source addresses that make traffic malicious
    #[clap(long, env = "LPA_BLACKLIST_IPS", value_delimiter = ',')]
    blacklist_ips: Vec<IpAddr>,

    /// Logistic model weights (JSON)
    #[clap(long, env = "LPA_MODEL_PATH")]
    model_path: Option<PathBuf>,

    /// Feature scaler for the model (JSON)
    #[clap(long, env = "LPA_SCALER_PATH")]
    scaler_path: Option<PathBuf>,

    /// Audio player command, e.g. "mpg123 -q"
    #[clap(long, env = "LPA_SIREN_PLAYER")]
    siren_player: Option<String>,

    /// Sound file for the high siren
    #[clap(long, env = "LPA_SIREN_HIGH_MP3")]
    siren_high: Option<PathBuf>,

    /// Sound file for the suspicious siren
    #[clap(long, env = "LPA_SIREN_SUSPICIOUS_MP3")]
    siren_suspicious: Option<PathBuf>,

    /// Do not print siren banners on the terminal
    #[clap(long)]
    no_console_siren: bool,

    /// Enable IP geolocation lookups
    #[clap(long, env = "LPA_GEOIP_ENABLED")]
    geoip: bool,

    /// Geolocation service URL prefix
    #[clap(long, env = "LPA_GEOIP_ENDPOINT", default_value = "http://ip-api.com/json/")]
    geoip_endpoint: String,

    /// Log level (trace, debug, info, warn, error, off)
    #[clap(long, env = "LPA_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

impl Args {
    fn into_config(self) -> AppConfig {
        AppConfig {
            bind: self.bind,
            port: self.port,
            retention: RetentionConfig {
                max_packets: self.max_packets,
                max_alerts: self.max_alerts,
                series_window: self.series_window,
            },
            detection: DetectionConfig {
                alert_threshold: self.alert_threshold,
                suspicious_threshold: self.suspicious_threshold,
                syn_threshold: self.syn_threshold,
                syn_reset_secs: self.syn_reset_secs,
                blacklist_ports: self.blacklist_ports,
                blacklist_ips: self.blacklist_ips,
                model_path: self.model_path,
                scaler_path: self.scaler_path,
            },
            alarm: AlarmConfig {
                default_mode: SirenLevel::parse_lenient(&self.default_mode),
                throttle_high: self.throttle_high,
                throttle_suspicious: self.throttle_suspicious,
                throttle_safe: self.throttle_safe,
                console: !self.no_console_siren,
                player: self.siren_player,
                high_sound: self.siren_high,
                suspicious_sound: self.siren_suspicious,
            },
            capture: CaptureConfig {
                interface: self.interface,
                filter: Some(self.filter),
            },
            geo: GeoConfig {
                enabled: self.geoip,
                endpoint: self.geoip_endpoint,
                ..Default::default()
            },
        }
    }
}

#[actix_web::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize logger with specified level
    logging::init_logger(logging::get_log_level(&args.log_level));

    info!("Starting SharkWatch v{}", env!("CARGO_PKG_VERSION"));

    let config = args.into_config();
    config.validate()?;

    let model = ModelPipeline::load(
        config.detection.model_path.as_deref(),
        config.detection.scaler_path.as_deref(),
    );
    if model.is_none() && config.detection.model_path.is_some() {
        warn!("Continuing with heuristic classification only");
    }

    let sink = siren::build_sink(&config.alarm);
    if sink.is_none() {
        info!("No siren sink configured, alarms are logged only");
    }

    let engine = Arc::new(Engine::new(&config, model, sink));
    let locator = Arc::new(GeoLocator::new(&config.geo)?);
    if locator.is_enabled() {
        info!("Geolocation enabled via {}", config.geo.endpoint);
    }

    if let Some(interface) = &config.capture.interface {
        info!(
            "Capture producers should use interface {} with filter {:?}",
            interface, config.capture.filter
        );
    }

    // Create a shared state for our application
    let engine_state = web::Data::new(engine);
    let geo_state = web::Data::new(locator);
    let config_state = web::Data::new(config.clone());

    info!("Starting SharkWatch API server on {}:{}", config.bind, config.port);

    // Start the HTTP server
    HttpServer::new(move || {
        App::new()
            .app_data(engine_state.clone())
            .app_data(geo_state.clone())
            .app_data(config_state.clone())
            .configure(routes::configure)
    })
    .bind((config.bind.as_str(), config.port))?
    .run()
    .await?;

    Ok(())
}
