use crate::sql::{SqlArgs, SqlValue};
use crate::topology::ConnectionDetails;

/// MySQL "already exists" codes: 1050 table, 1060 column, 1061 key.
pub const DUPLICATE_OBJECT_CODES: [u32; 3] = [1050, 1060, 1061];

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message}")]
pub struct DriverError {
    pub code: Option<u32>,
    pub message: String,
}

impl DriverError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
        }
    }

    pub fn with_code(code: u32, message: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            message: message.into(),
        }
    }

    /// Whether this error is on the "table/column/key already exists"
    /// whitelist that script execution may be asked to swallow.
    pub fn is_duplicate_object(&self) -> bool {
        self.code
            .map_or(false, |code| DUPLICATE_OBJECT_CODES.contains(&code))
    }
}

/// Raw outcome of one statement execution.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawResult {
    pub affected: u64,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<SqlValue>>,
}

/// A live driver handle: the raw execute/fetch primitives this crate
/// builds on. Timeouts and the wire protocol are the implementor's concern.
pub trait RawHandle {
    fn execute(&mut self, sql: &str, args: &SqlArgs) -> Result<RawResult, DriverError>;

    fn last_insert_id(&mut self) -> Result<u64, DriverError>;

    fn commit(&mut self) -> Result<(), DriverError>;

    fn close(&mut self) -> Result<(), DriverError> {
        Ok(())
    }
}

/// The injected connect collaborator: a real driver in production, a fake
/// in tests.
pub trait Driver {
    type Handle: RawHandle;

    fn connect(&self, details: &ConnectionDetails) -> Result<Self::Handle, DriverError>;
}
