use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

/// Classification outcome for a packet, ordered by severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Label {
    Safe,
    Suspicious,
    Malicious,
}

impl Label {
    /// Normalize any label string a producer might send.
    ///
    /// Synonyms used by capture tools and simulators are folded in; anything
    /// unrecognized (including an empty string) is treated as safe traffic.
    pub fn parse_lenient(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "malicious" | "high" | "danger" | "attack" => Label::Malicious,
            "suspicious" | "anomalous" | "warning" => Label::Suspicious,
            _ => Label::Safe,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Label::Safe => "safe",
            Label::Suspicious => "suspicious",
            Label::Malicious => "malicious",
        }
    }

    /// Score attached to a packet that arrives already labelled (synthetic injection)
    pub fn nominal_score(&self) -> f64 {
        match self {
            Label::Safe => 0.01,
            Label::Suspicious => 0.62,
            Label::Malicious => 0.93,
        }
    }

    /// Whether packets with this label belong in the alert log
    pub fn is_alertable(&self) -> bool {
        *self != Label::Safe
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Strict parse, used for query filters where an unknown value means "no filter"
impl FromStr for Label {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "safe" => Ok(Label::Safe),
            "suspicious" => Ok(Label::Suspicious),
            "malicious" => Ok(Label::Malicious),
            other => Err(format!("unknown label '{}'", other)),
        }
    }
}

/// Transport protocol of a packet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Protocol {
    Tcp,
    Udp,
    Icmp,
    Other,
}

impl Protocol {
    pub fn parse_lenient(value: &str) -> Self {
        match value.trim().to_ascii_uppercase().as_str() {
            "TCP" => Protocol::Tcp,
            // DNS is reported by some capture tools as its own protocol
            "UDP" | "DNS" => Protocol::Udp,
            "ICMP" | "ICMPV6" => Protocol::Icmp,
            _ => Protocol::Other,
        }
    }

    /// Numeric encoding used in model feature vectors
    pub fn ordinal(&self) -> u8 {
        match self {
            Protocol::Tcp => 0,
            Protocol::Udp => 1,
            Protocol::Icmp => 2,
            Protocol::Other => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Tcp => "TCP",
            Protocol::Udp => "UDP",
            Protocol::Icmp => "ICMP",
            Protocol::Other => "OTHER",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Packet as handed to the ingest pipeline by a producer.
///
/// Every field is optional. Producers range from a capture process to a test
/// script posting `{"label": "malicious"}`, so nothing here is validated.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawPacket {
    /// Capture time; the engine clock is used when absent
    pub timestamp: Option<DateTime<Utc>>,

    /// Source IP address
    pub src: Option<String>,

    /// Destination IP address
    pub dst: Option<String>,

    /// Protocol name (TCP, UDP, ICMP, ...)
    pub proto: Option<String>,

    /// Source port
    pub sport: Option<u16>,

    /// Destination port
    pub dport: Option<u16>,

    /// Length of the packet in bytes
    pub length: Option<u64>,

    /// TCP flag code such as "S" or "SA"
    pub tcp_flags: Option<String>,

    /// Label asserted by the producer
    pub label: Option<String>,
}

impl RawPacket {
    /// A packet carrying nothing but an asserted label
    #[cfg(test)]
    pub fn with_label(label: &str) -> Self {
        Self {
            label: Some(label.to_string()),
            ..Default::default()
        }
    }
}

/// A normalized, classified packet.
///
/// Serializes to the flat shape the dashboard consumes:
/// `{ts, src, dst, proto, sport, dport, length, label, score}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PacketRecord {
    /// Time the packet was observed
    #[serde(rename = "ts", serialize_with = "serialize_clock_time")]
    pub timestamp: DateTime<Utc>,

    /// Source IP address
    #[serde(rename = "src", serialize_with = "serialize_address")]
    pub source_address: Option<IpAddr>,

    /// Destination IP address
    #[serde(rename = "dst", serialize_with = "serialize_address")]
    pub dest_address: Option<IpAddr>,

    /// Transport protocol
    #[serde(rename = "proto")]
    pub protocol: Protocol,

    /// Source port (0 when unknown)
    #[serde(rename = "sport")]
    pub source_port: u16,

    /// Destination port (0 when unknown)
    #[serde(rename = "dport")]
    pub dest_port: u16,

    /// Length of the packet in bytes
    #[serde(rename = "length")]
    pub length_bytes: u64,

    /// TCP flag code, only kept for TCP packets
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tcp_flags: Option<String>,

    /// Assigned classification
    pub label: Label,

    /// Confidence in [0, 1]
    pub score: f64,
}

impl PacketRecord {
    /// Normalize a raw packet. Missing or malformed fields fall back to
    /// zero/empty values; the result is labelled safe until classified.
    pub fn from_raw(raw: &RawPacket, now: DateTime<Utc>) -> Self {
        let protocol = raw
            .proto
            .as_deref()
            .map(Protocol::parse_lenient)
            .unwrap_or(Protocol::Other);

        let tcp_flags = match protocol {
            Protocol::Tcp => raw
                .tcp_flags
                .as_deref()
                .map(|flags| flags.trim().to_ascii_uppercase())
                .filter(|flags| !flags.is_empty()),
            _ => None,
        };

        Self {
            timestamp: raw.timestamp.unwrap_or(now),
            source_address: parse_address(raw.src.as_deref()),
            dest_address: parse_address(raw.dst.as_deref()),
            protocol,
            source_port: raw.sport.unwrap_or(0),
            dest_port: raw.dport.unwrap_or(0),
            length_bytes: raw.length.unwrap_or(0),
            tcp_flags,
            label: Label::Safe,
            score: 0.0,
        }
    }

    /// Connection attempt: SYN set with ACK, RST and FIN clear.
    ///
    /// The flag code must be a set of single-letter flags (`FSRPAUEC`), so
    /// long-form names like "RST" or "PSH" never match.
    pub fn is_syn_only(&self) -> bool {
        let flags = match (&self.protocol, &self.tcp_flags) {
            (Protocol::Tcp, Some(flags)) => flags,
            _ => return false,
        };
        flags.chars().all(|flag| TCP_FLAG_LETTERS.contains(flag))
            && flags.contains('S')
            && !flags.chars().any(|flag| matches!(flag, 'A' | 'R' | 'F'))
    }
}

/// Single-letter TCP flag codes: FIN SYN RST PSH ACK URG ECE CWR
const TCP_FLAG_LETTERS: &str = "FSRPAUEC";

/// Entry in the alert log
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertEntry {
    #[serde(rename = "ts", serialize_with = "serialize_clock_time")]
    pub timestamp: DateTime<Utc>,

    #[serde(rename = "src", serialize_with = "serialize_address")]
    pub source_address: Option<IpAddr>,

    pub label: Label,
}

impl From<&PacketRecord> for AlertEntry {
    fn from(packet: &PacketRecord) -> Self {
        Self {
            timestamp: packet.timestamp,
            source_address: packet.source_address,
            label: packet.label,
        }
    }
}

fn parse_address(value: Option<&str>) -> Option<IpAddr> {
    value.and_then(|s| s.trim().parse().ok())
}

/// Wall-clock display used throughout the dashboard
pub fn format_clock_time(ts: &DateTime<Utc>) -> String {
    ts.format("%H:%M:%S").to_string()
}

fn serialize_clock_time<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(&ts.format("%H:%M:%S"))
}

fn serialize_address<S: Serializer>(addr: &Option<IpAddr>, serializer: S) -> Result<S::Ok, S::Error> {
    match addr {
        Some(ip) => serializer.collect_str(ip),
        None => serializer.serialize_str(""),
    }
}
