//! Driver seam and connection wrapper

pub mod connection;
pub mod driver;

pub use connection::{Connection, ConnectionError, QueryResult, SqlClient};
pub use driver::{Driver, DriverError, RawHandle, RawResult, DUPLICATE_OBJECT_CODES};
