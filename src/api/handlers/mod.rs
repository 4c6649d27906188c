pub mod geo;
pub mod inject;
pub mod packets;
pub mod siren;
pub mod stats;
