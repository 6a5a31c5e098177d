// Connection models

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;

/// Transport protocol; serializes to uppercase JSON ("TCP", "UDP").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Protocol {
    Tcp,
    Udp,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Tcp => "TCP",
            Protocol::Udp => "UDP",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a connection across ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId {
    pub protocol: Protocol,
    pub local: SocketAddr,
    pub remote: SocketAddr,
    pub pid: u32,
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}_{}_{}_{}",
            self.protocol, self.local, self.remote, self.pid
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connection {
    pub id: String,
    pub local_addr: String,
    pub remote_addr: String,
    pub protocol: Protocol,
    /// OS state string, e.g. "ESTABLISHED"; UDP sockets report "NONE".
    pub state: String,
    pub process_name: String,
    pub pid: u32,
    /// Owning process upload rate (bytes/sec).
    pub upload_speed: f64,
    /// Owning process download rate (bytes/sec).
    pub download_speed: f64,
    /// Seconds since first observed.
    pub duration: f64,
    // Reserved; per-socket byte counts are not sampled.
    pub bytes_sent: u64,
    pub bytes_received: u64,
}
