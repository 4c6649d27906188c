pub mod config;
pub mod packet;
pub mod siren;
pub mod stats;
