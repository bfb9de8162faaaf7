//! Bulk adapter for TimescaleDB/PostgreSQL
//!
//! Writes ride the backend's native bulk-load wire protocol: each chunk is
//! framed as CSV and pushed through `COPY ... FROM STDIN (FORMAT CSV)`, the
//! buffer released before the next chunk is pulled. Reads bind the query to
//! a server-side portal and fetch `itersize` rows per round trip.

use crate::bulk::{check_batch_size, next_chunk, BulkAdapter, RecordStream};
use crate::connector::timescale::row_to_record;
use crate::connector::{ConnectorError, ConnectorResult};
use crate::schema::{Record, Schema, Value};
use postgres::{Client, Portal, Row, Transaction};
use std::io::Write;

/// Bulk I/O adapter for TimescaleDB
pub struct PostgresBulkAdapter<'a> {
    client: &'a mut Client,
    schema: &'a Schema,
}

impl<'a> PostgresBulkAdapter<'a> {
    pub fn new(client: &'a mut Client, schema: &'a Schema) -> Self {
        Self { client, schema }
    }
}

impl BulkAdapter for PostgresBulkAdapter<'_> {
    fn write_bulk(
        &mut self,
        table: &str,
        data: &mut dyn Iterator<Item = Record>,
        batch_size: usize,
    ) -> ConnectorResult<u64> {
        check_batch_size(batch_size)?;
        let columns = self
            .schema
            .field_names()
            .map(|name| format!("\"{name}\""))
            .collect::<Vec<_>>()
            .join(",");
        let copy_sql = format!("COPY \"{table}\" ({columns}) FROM STDIN (FORMAT CSV)");

        let mut writer = self
            .client
            .copy_in(&copy_sql)
            .map_err(|e| ConnectorError::backend(format!("failed to start COPY into '{table}'"), e))?;

        let mut total = 0u64;
        loop {
            let chunk = next_chunk(data, batch_size);
            if chunk.is_empty() {
                break;
            }
            let frame = chunk_to_csv(self.schema, &chunk)?;
            writer
                .write_all(&frame)
                .map_err(|e| ConnectorError::backend("failed to stream COPY data", e))?;
            total += chunk.len() as u64;
            tracing::debug!("copied {} rows into '{}'", chunk.len(), table);
        }
        writer
            .finish()
            .map_err(|e| ConnectorError::backend("failed to finish COPY", e))?;
        Ok(total)
    }

    fn read_iter(&mut self, query: &str, itersize: usize) -> ConnectorResult<RecordStream<'_>> {
        let mut tx = self
            .client
            .transaction()
            .map_err(|e| ConnectorError::backend("failed to begin read transaction", e))?;
        let portal = tx
            .bind(query, &[])
            .map_err(|e| ConnectorError::backend("failed to bind bulk query", e))?;
        Ok(RecordStream::Portal(PortalRecordStream {
            tx,
            portal,
            itersize: itersize.max(1) as i32,
            buffer: Vec::new().into_iter(),
            done: false,
        }))
    }
}

/// Forward-only stream over a server-side portal
///
/// The enclosing read transaction lives as long as the stream and closes
/// when it is dropped.
pub struct PortalRecordStream<'a> {
    tx: Transaction<'a>,
    portal: Portal,
    itersize: i32,
    buffer: std::vec::IntoIter<Row>,
    done: bool,
}

impl Iterator for PortalRecordStream<'_> {
    type Item = ConnectorResult<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(row) = self.buffer.next() {
                return Some(row_to_record(&row));
            }
            if self.done {
                return None;
            }
            match self.tx.query_portal(&self.portal, self.itersize) {
                Ok(rows) => {
                    if rows.is_empty() {
                        self.done = true;
                        return None;
                    }
                    self.buffer = rows.into_iter();
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(ConnectorError::backend(
                        "failed to fetch from portal",
                        e,
                    )));
                }
            }
        }
    }
}

/// Frame one chunk as CSV bytes in schema column order
///
/// Nulls become empty unquoted fields, which is what COPY's CSV mode reads
/// as NULL.
fn chunk_to_csv(schema: &Schema, records: &[Record]) -> ConnectorResult<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    for record in records {
        let fields: Vec<String> = schema
            .field_names()
            .map(|name| csv_field(&record.get_or_null(name)))
            .collect();
        writer
            .write_record(&fields)
            .map_err(|e| ConnectorError::backend("failed to encode CSV row", e))?;
    }
    writer
        .into_inner()
        .map_err(|e| ConnectorError::backend("failed to flush CSV buffer", e))
}

fn csv_field(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Int(v) => v.to_string(),
        Value::Float(v) => v.to_string(),
        Value::Text(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Timestamp(ts) => ts.to_rfc3339(),
        // COPY reads bytea from the hex input form
        Value::Bytes(b) => {
            let hex: String = b.iter().map(|byte| format!("{byte:02x}")).collect();
            format!("\\x{hex}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldDef, FieldType};
    use chrono::{TimeZone, Utc};

    fn sample_schema() -> Schema {
        Schema::new(vec![
            FieldDef::required("id", FieldType::Int),
            FieldDef::required("device", FieldType::String),
            FieldDef::nullable("note", FieldType::String),
            FieldDef::required("at", FieldType::Timestamp),
        ])
        .unwrap()
    }

    #[test]
    fn test_chunk_to_csv_layout() {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let records = vec![
            Record::new()
                .with("id", 1i64)
                .with("device", "sensor-a")
                .with("note", "ok")
                .with("at", at),
            Record::new().with("id", 2i64).with("device", "sensor-b").with("at", at),
        ];
        let bytes = chunk_to_csv(&sample_schema(), &records).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "1,sensor-a,ok,2024-03-01T12:00:00+00:00");
        // Absent nullable field is an empty (NULL) slot
        assert_eq!(lines[1], "2,sensor-b,,2024-03-01T12:00:00+00:00");
    }

    #[test]
    fn test_csv_quotes_embedded_delimiters() {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let records = vec![Record::new()
            .with("id", 1i64)
            .with("device", "a,b")
            .with("note", "line\nbreak")
            .with("at", at)];
        let bytes = chunk_to_csv(&sample_schema(), &records).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.starts_with("1,\"a,b\",\"line\nbreak\","));
    }

    #[test]
    fn test_csv_field_scalars() {
        assert_eq!(csv_field(&Value::Null), "");
        assert_eq!(csv_field(&Value::Int(-3)), "-3");
        assert_eq!(csv_field(&Value::Float(0.5)), "0.5");
        assert_eq!(csv_field(&Value::Bool(false)), "false");
        assert_eq!(csv_field(&Value::Bytes(vec![0xab, 0x01])), "\\xab01");
    }
}
