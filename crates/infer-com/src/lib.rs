pub mod connection;
pub mod error;
pub mod framing;
pub mod http1;
pub mod pool;

pub use connection::Connection;
pub use error::ComError;
pub use pool::{Pool, PooledConnection};
