pub mod aggregator;
pub mod alarm;
pub mod alert_log;
pub mod classifier;
pub mod clock;
pub mod model;
pub mod pipeline;
pub mod ring;

pub use pipeline::Engine;
