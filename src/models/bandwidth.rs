// Bandwidth history point

use serde::{Deserialize, Serialize};

/// One host-wide rate sample; rates in bytes/sec, timestamp in unix seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BandwidthPoint {
    pub timestamp: f64,
    pub upload: f64,
    pub download: f64,
}
