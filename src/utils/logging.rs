use env_logger::Builder;
use log::LevelFilter;
use std::io::Write;

/// Crates whose per-request chatter is capped at warn
const NOISY_TARGETS: [&str; 4] = ["actix_server", "actix_http", "reqwest", "hyper"];

/// Initialize the logger with custom formatting
pub fn init_logger(level: LevelFilter) {
    let mut builder = Builder::new();
    builder
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{}] {} - {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .filter(None, level);

    for target in NOISY_TARGETS {
        builder.filter(Some(target), level.min(LevelFilter::Warn));
    }

    // A second init (tests, embedding) keeps the first logger
    let _ = builder.try_init();
}

/// Get log level from string
pub fn get_log_level(level: &str) -> LevelFilter {
    match level.to_lowercase().as_str() {
        "trace" => LevelFilter::Trace,
        "debug" => LevelFilter::Debug,
        "info" => LevelFilter::Info,
        "warn" => LevelFilter::Warn,
        "error" => LevelFilter::Error,
        "off" => LevelFilter::Off,
        _ => LevelFilter::Info,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_log_level() {
        assert_eq!(get_log_level("DEBUG"), LevelFilter::Debug);
        assert_eq!(get_log_level("verbose"), LevelFilter::Info);
    }
}
