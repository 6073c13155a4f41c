//! Configuration-driven database topology routing and safe SQL composition.
//!
//! Given a logical database name, the router resolves the owning cluster
//! (consulting the control database for names missing from the static map),
//! picks a master or slave host, expands credentials through the layered
//! override maps, and connects through an injected driver, with weighted
//! random failover when a replica group is requested. On top of the
//! resulting connection sits a statement composer that builds parameterized
//! SELECT/INSERT/UPDATE/DELETE text from structured inputs while letting
//! raw SQL fragments be spliced in without breaking parameter safety.

pub mod executor;
pub mod logger;
pub mod router;
pub mod sql;
pub mod topology;

pub use executor::{
    Connection, ConnectionError, Driver, DriverError, QueryResult, RawHandle, RawResult, SqlClient,
};
pub use router::{ConnectRequest, DatabaseRouter, Role, RouterError, CONTROL_DATABASE};
pub use sql::{
    Conditions, LiteralArgs, LiteralFactory, SqlArgs, SqlError, SqlExpr, SqlValue, Statement,
};
pub use topology::{
    ConnectionDetails, HostSpec, TopologyConfig, TopologyDocument, TopologyError,
};
