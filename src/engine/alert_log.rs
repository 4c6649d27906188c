use crate::engine::ring::BoundedRing;
use crate::models::packet::{AlertEntry, PacketRecord};

/// Recent non-safe classifications, oldest evicted first
#[derive(Debug)]
pub struct AlertLog {
    entries: BoundedRing<AlertEntry>,
}

impl AlertLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: BoundedRing::new(capacity),
        }
    }

    /// Log the packet if its label warrants an alert
    pub fn record_if_alertable(&mut self, packet: &PacketRecord) -> bool {
        if !packet.label.is_alertable() {
            return false;
        }
        self.entries.push(AlertEntry::from(packet));
        true
    }

    pub fn snapshot(&self) -> Vec<AlertEntry> {
        self.entries.to_vec()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
