// Domain models (wire shapes for REST and WebSocket)

mod bandwidth;
mod connection;
mod snapshot;

pub use bandwidth::BandwidthPoint;
pub use connection::{Connection, ConnectionId, Protocol};
pub use snapshot::{Snapshot, Stats};
