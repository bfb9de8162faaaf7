//! Bulk I/O subsystem
//!
//! High-throughput transfer that bypasses the CRUD facade and talks to a
//! live backend connection directly:
//! - [`DuckdbBulkAdapter`]: columnar Arrow batches through the native
//!   appender, Arrow result sets on the way back
//! - [`PostgresBulkAdapter`]: CSV frames through `COPY ... FROM STDIN`,
//!   server-side portal fetches on the way back
//!
//! `write_bulk` materializes one bounded batch at a time and releases it
//! before pulling the next, so peak memory is O(batch_size) regardless of
//! how much data flows through — the source iterator may be unbounded.
//! `read_iter` yields records one row at a time and skips schema validation:
//! rows coming back from the backend are trusted as stored.

pub mod duckdb;
pub mod timescale;

pub use self::duckdb::{ColumnarRecordStream, DuckdbBulkAdapter};
pub use self::timescale::{PortalRecordStream, PostgresBulkAdapter};

use crate::connector::{ConnectorError, ConnectorResult};
use crate::schema::{Record, Schema};

/// Streaming bulk transfer against one live backend connection
///
/// One direction at a time per call; adapters hold no cross-call state
/// beyond the in-flight buffer.
pub trait BulkAdapter {
    /// Write everything the iterator yields in `batch_size`-bounded chunks,
    /// returning the number of rows written
    fn write_bulk(
        &mut self,
        table: &str,
        data: &mut dyn Iterator<Item = Record>,
        batch_size: usize,
    ) -> ConnectorResult<u64>;

    /// Stream the rows of an arbitrary query, fetching `itersize` rows per
    /// round trip where the backend supports it; the stream is forward-only
    /// and exactly-once-exhaustible
    fn read_iter(&mut self, query: &str, itersize: usize) -> ConnectorResult<RecordStream<'_>>;
}

/// A live connection handed to the dispatcher, by backend family
pub enum BulkSource<'a> {
    Duckdb(&'a ::duckdb::Connection),
    Postgres(&'a mut ::postgres::Client),
    /// Timestream has no bulk wire protocol; dispatching it fails fast
    Timestream,
}

/// Select the adapter matching the connection's backend family
pub fn bulk_adapter<'a>(
    source: BulkSource<'a>,
    schema: &'a Schema,
) -> ConnectorResult<Box<dyn BulkAdapter + 'a>> {
    match source {
        BulkSource::Duckdb(conn) => Ok(Box::new(DuckdbBulkAdapter::new(conn, schema))),
        BulkSource::Postgres(client) => Ok(Box::new(PostgresBulkAdapter::new(client, schema))),
        BulkSource::Timestream => Err(ConnectorError::NotSupported(
            "no bulk I/O adapter for this connection type",
        )),
    }
}

/// The record stream produced by [`BulkAdapter::read_iter`]
pub enum RecordStream<'a> {
    Columnar(ColumnarRecordStream),
    Portal(PortalRecordStream<'a>),
}

impl Iterator for RecordStream<'_> {
    type Item = ConnectorResult<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            RecordStream::Columnar(stream) => stream.next(),
            RecordStream::Portal(stream) => stream.next(),
        }
    }
}

/// Pull at most `batch_size` records from the source
pub(crate) fn next_chunk(
    data: &mut dyn Iterator<Item = Record>,
    batch_size: usize,
) -> Vec<Record> {
    let mut chunk = Vec::with_capacity(batch_size.min(4_096));
    while chunk.len() < batch_size {
        match data.next() {
            Some(record) => chunk.push(record),
            None => break,
        }
    }
    chunk
}

pub(crate) fn check_batch_size(batch_size: usize) -> ConnectorResult<()> {
    if batch_size == 0 {
        return Err(ConnectorError::Configuration(
            "batch_size must be greater than zero".to_string(),
        ));
    }
    Ok(())
}
