pub mod connection;
pub mod drain;
pub mod pool;
pub mod serialization;
pub mod stats;

pub use connection::{ConnectError, Connection, ConnectionState, SendError};
pub use drain::DrainReporter;
pub use pool::{
    DEFAULT_PORT, Endpoint, PickStrategy, PoolError, PoolSelector, PoolState, ServerPool,
    UniformPick,
};
pub use serialization::{SerializationError, WireFormat, encode};
pub use stats::{SenderStats, SenderStatsSnapshot};
