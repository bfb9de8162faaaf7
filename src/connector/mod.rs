//! Backend connectors
//!
//! One uniform operation contract, three implementations:
//! - [`DuckdbConnector`]: embedded analytical engine, in-process
//! - [`TimescaleConnector`]: relational engine with time partitioning
//! - [`TimestreamConnector`]: managed cloud service with a dimension/measure
//!   data model
//!
//! A connector owns exactly one live backend connection for its lifetime and
//! executes synchronously on the calling thread. Callers needing parallel
//! throughput use independent connector instances.

mod error;

pub mod duckdb;
pub mod timescale;
pub mod timestream;

pub use error::{ConnectorError, ConnectorResult};

pub use self::duckdb::DuckdbConnector;
pub use self::timescale::TimescaleConnector;
pub use self::timestream::TimestreamConnector;

use crate::config::ConnectorConfig;
use crate::filter::Filters;
use crate::schema::{Record, Schema, Value};

/// The capability contract every backend implements
///
/// Backends that cannot express an operation return
/// [`ConnectorError::NotSupported`] rather than silently doing nothing.
pub trait Connector {
    /// The schema this connector was bound to
    fn schema(&self) -> &Schema;

    /// The configuration this connector was built with
    fn config(&self) -> &ConnectorConfig;

    /// Establish the backend connection; calling twice is a no-op
    fn connect(&mut self) -> ConnectorResult<()>;

    /// Drop the backend connection; calling on a disconnected instance is a
    /// no-op
    fn disconnect(&mut self) -> ConnectorResult<()>;

    /// Create the backing table if it does not already exist
    fn create_table(&mut self) -> ConnectorResult<()>;

    /// Insert one record, returning it with backend defaults applied
    /// (generated key, audit stamps)
    fn create(&mut self, record: &Record) -> ConnectorResult<Record>;

    /// Fetch one record by primary key
    fn get_by_id(&mut self, id: &Value) -> ConnectorResult<Option<Record>>;

    /// List records with optional filtering, ordering and pagination
    fn list(
        &mut self,
        limit: Option<usize>,
        offset: usize,
        filters: &Filters,
        order_by: Option<&str>,
        order_desc: bool,
    ) -> ConnectorResult<Vec<Record>>;

    /// Apply a partial update by primary key, returning the stored record,
    /// or `None` when the key does not match a live row
    fn update(&mut self, id: &Value, changes: &Record) -> ConnectorResult<Option<Record>>;

    /// Delete by primary key; returns whether a row was affected
    fn delete(&mut self, id: &Value, hard_delete: bool) -> ConnectorResult<bool>;

    /// Count records matching the filters
    fn count(&mut self, filters: &Filters) -> ConnectorResult<u64>;

    /// Insert many records efficiently, returning them with backend defaults
    /// applied
    fn bulk_insert(&mut self, records: &[Record]) -> ConnectorResult<Vec<Record>>;

    /// The k most recent records, ordered by the time column descending
    fn get_last_k_items(&mut self, k: usize) -> ConnectorResult<Vec<Record>>;
}
