//! Embedded engine connector (DuckDB)
//!
//! Stores records in a local or in-memory DuckDB database. Suitable for
//! local development, testing, or single-process analytical workloads.
//!
//! Narrower capability surface than the relational connector: equality-only
//! filters, no soft delete, no audit stamping. Primary keys are generated
//! from an explicit per-table sequence so inserts and the native bulk
//! appender share one key source.

use crate::config::ConnectorConfig;
use crate::connector::{Connector, ConnectorError, ConnectorResult};
use crate::filter::{FilterOp, Filters};
use crate::schema::{FieldType, Record, Schema, Value};
use chrono::{DateTime, Utc};
use duckdb::types::{TimeUnit, Value as DbValue, ValueRef};
use duckdb::{appender_params_from_iter, params, params_from_iter, Connection};

/// Connector for DuckDB
pub struct DuckdbConnector {
    schema: Schema,
    config: ConnectorConfig,
    conn: Option<Connection>,
}

impl DuckdbConnector {
    /// Build a connector; fails if the configured primary key is not an
    /// integer field of the schema
    pub fn new(schema: Schema, config: ConnectorConfig) -> ConnectorResult<Self> {
        match schema.field(&config.primary_key) {
            None => {
                return Err(ConnectorError::Configuration(format!(
                    "primary key '{}' is not a schema field",
                    config.primary_key
                )))
            }
            Some(field) if field.field_type != FieldType::Int => {
                return Err(ConnectorError::Configuration(format!(
                    "primary key '{}' must be an int field for sequence generation",
                    config.primary_key
                )))
            }
            Some(_) => {}
        }
        Ok(Self {
            schema,
            config,
            conn: None,
        })
    }

    fn conn(&self) -> ConnectorResult<&Connection> {
        self.conn.as_ref().ok_or_else(|| {
            ConnectorError::Connection("not connected to DuckDB; call connect() first".to_string())
        })
    }

    fn sequence_name(&self) -> String {
        format!("{}_{}_seq", self.config.table_name, self.config.primary_key)
    }

    /// Quoted column list in schema order, used by every SELECT/RETURNING
    fn select_columns(&self) -> String {
        self.schema
            .field_names()
            .map(quote_ident)
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Translate equality filters into a WHERE fragment; operator filters are
    /// rejected, unknown fields are skipped
    fn render_filters(&self, filters: &Filters) -> ConnectorResult<(String, Vec<DbValue>)> {
        let mut conditions = Vec::new();
        let mut values = Vec::new();
        for (field, op) in filters.clauses() {
            if !self.schema.contains(field) {
                tracing::warn!("ignoring unknown filter field: {}", field);
                continue;
            }
            match op {
                FilterOp::Eq(Value::Null) => conditions.push(format!("{} IS NULL", quote_ident(field))),
                FilterOp::Eq(value) => {
                    conditions.push(format!("{} = ?", quote_ident(field)));
                    values.push(to_db_value(value));
                }
                _ => {
                    return Err(ConnectorError::NotSupported(
                        "only equality filters are supported by the embedded backend",
                    ))
                }
            }
        }
        if conditions.is_empty() {
            Ok((String::new(), values))
        } else {
            Ok((format!(" WHERE {}", conditions.join(" AND ")), values))
        }
    }

    fn query_records(&self, sql: &str, values: Vec<DbValue>) -> ConnectorResult<Vec<Record>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(sql)
            .map_err(|e| ConnectorError::backend("failed to prepare query", e))?;
        let mut rows = stmt
            .query(params_from_iter(values))
            .map_err(|e| ConnectorError::backend("failed to execute query", e))?;

        let mut records = Vec::new();
        while let Some(row) = rows
            .next()
            .map_err(|e| ConnectorError::backend("failed to read row", e))?
        {
            records.push(row_to_record(row, &self.schema)?);
        }
        Ok(records)
    }
}

impl Connector for DuckdbConnector {
    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn config(&self) -> &ConnectorConfig {
        &self.config
    }

    fn connect(&mut self) -> ConnectorResult<()> {
        if self.conn.is_some() {
            return Ok(());
        }
        let conn = match self.config.db_path.as_deref() {
            None | Some(":memory:") => Connection::open_in_memory(),
            Some(path) => Connection::open(path),
        }
        .map_err(|e| ConnectorError::Connection(format!("failed to connect to DuckDB: {e}")))?;

        tracing::info!(
            "connected to DuckDB at '{}'",
            self.config.db_path.as_deref().unwrap_or(":memory:")
        );
        self.conn = Some(conn);
        Ok(())
    }

    fn disconnect(&mut self) -> ConnectorResult<()> {
        if let Some(conn) = self.conn.take() {
            conn.close()
                .map_err(|(_, e)| ConnectorError::backend("failed to close DuckDB connection", e))?;
            tracing::info!("DuckDB connection closed");
        }
        Ok(())
    }

    fn create_table(&mut self) -> ConnectorResult<()> {
        let table = self.config.table_name.clone();
        let sequence = self.sequence_name();
        let conn = self.conn()?;

        // The key sequence must exist before the table default references it
        conn.execute(
            &format!("CREATE SEQUENCE IF NOT EXISTS {}", quote_ident(&sequence)),
            [],
        )
        .map_err(|e| ConnectorError::backend("failed to create key sequence", e))?;

        let exists = {
            let mut stmt = conn
                .prepare("SELECT table_name FROM information_schema.tables WHERE table_name = ?")
                .map_err(|e| ConnectorError::backend("failed to inspect catalog", e))?;
            let mut rows = stmt
                .query(params![table])
                .map_err(|e| ConnectorError::backend("failed to inspect catalog", e))?;
            rows.next()
                .map_err(|e| ConnectorError::backend("failed to inspect catalog", e))?
                .is_some()
        };
        if exists {
            tracing::info!("table '{}' already exists in DuckDB", table);
            return Ok(());
        }

        let mut columns = Vec::new();
        for field in self.schema.fields() {
            if field.name == self.config.primary_key {
                columns.push(format!(
                    "{} BIGINT DEFAULT nextval('{}') PRIMARY KEY",
                    quote_ident(&field.name),
                    sequence
                ));
            } else {
                let null_clause = if field.nullable { "" } else { " NOT NULL" };
                columns.push(format!(
                    "{} {}{}",
                    quote_ident(&field.name),
                    column_type(field.field_type),
                    null_clause
                ));
            }
        }
        let ddl = format!("CREATE TABLE {} ({})", quote_ident(&table), columns.join(", "));
        conn.execute(&ddl, [])
            .map_err(|e| ConnectorError::backend(format!("failed to create table '{table}'"), e))?;
        tracing::info!("created table '{}' in DuckDB", table);
        Ok(())
    }

    fn create(&mut self, record: &Record) -> ConnectorResult<Record> {
        let mut columns = Vec::new();
        let mut values = Vec::new();
        for field in self.schema.fields() {
            let value = record.get_or_null(&field.name);
            // Absent key: let the sequence default assign it
            if field.name == self.config.primary_key && value.is_null() {
                continue;
            }
            columns.push(quote_ident(&field.name));
            values.push(to_db_value(&value));
        }
        let placeholders = vec!["?"; values.len()].join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({}) RETURNING {}",
            quote_ident(&self.config.table_name),
            columns.join(", "),
            placeholders,
            self.select_columns()
        );

        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| ConnectorError::backend("failed to create record", e))?;
        let mut rows = stmt
            .query(params_from_iter(values))
            .map_err(|e| ConnectorError::backend("failed to create record", e))?;
        let row = rows
            .next()
            .map_err(|e| ConnectorError::backend("failed to create record", e))?
            .ok_or_else(|| {
                ConnectorError::Connection("INSERT returned no row".to_string())
            })?;
        row_to_record(row, &self.schema)
    }

    fn get_by_id(&mut self, id: &Value) -> ConnectorResult<Option<Record>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE {} = ?",
            self.select_columns(),
            quote_ident(&self.config.table_name),
            quote_ident(&self.config.primary_key)
        );
        let records = self.query_records(&sql, vec![to_db_value(id)])?;
        Ok(records.into_iter().next())
    }

    fn list(
        &mut self,
        limit: Option<usize>,
        offset: usize,
        filters: &Filters,
        order_by: Option<&str>,
        order_desc: bool,
    ) -> ConnectorResult<Vec<Record>> {
        let (where_clause, values) = self.render_filters(filters)?;
        let mut sql = format!(
            "SELECT {} FROM {}{}",
            self.select_columns(),
            quote_ident(&self.config.table_name),
            where_clause
        );
        // Clause application order: filter, order, offset, limit
        if let Some(column) = order_by {
            if self.schema.contains(column) {
                sql.push_str(&format!(
                    " ORDER BY {}{}",
                    quote_ident(column),
                    if order_desc { " DESC" } else { "" }
                ));
            } else {
                tracing::warn!("ignoring unknown order_by column: {}", column);
            }
        }
        if let Some(n) = limit {
            sql.push_str(&format!(" LIMIT {n}"));
        }
        if offset > 0 {
            sql.push_str(&format!(" OFFSET {offset}"));
        }
        self.query_records(&sql, values)
    }

    fn update(&mut self, id: &Value, changes: &Record) -> ConnectorResult<Option<Record>> {
        let mut assignments = Vec::new();
        let mut values = Vec::new();
        for (field, value) in changes.entries() {
            if field == &self.config.primary_key || !self.schema.contains(field) {
                continue;
            }
            assignments.push(format!("{} = ?", quote_ident(field)));
            values.push(to_db_value(value));
        }
        if assignments.is_empty() {
            return self.get_by_id(id);
        }
        values.push(to_db_value(id));
        let sql = format!(
            "UPDATE {} SET {} WHERE {} = ?",
            quote_ident(&self.config.table_name),
            assignments.join(", "),
            quote_ident(&self.config.primary_key)
        );
        self.conn()?
            .execute(&sql, params_from_iter(values))
            .map_err(|e| ConnectorError::backend("failed to update record", e))?;
        // No reliance on UPDATE returning the row: re-fetch
        self.get_by_id(id)
    }

    /// Deletes are always physical; this backend has no soft-delete column,
    /// so `hard_delete` is accepted for contract parity
    fn delete(&mut self, id: &Value, _hard_delete: bool) -> ConnectorResult<bool> {
        let sql = format!(
            "DELETE FROM {} WHERE {} = ?",
            quote_ident(&self.config.table_name),
            quote_ident(&self.config.primary_key)
        );
        let affected = self
            .conn()?
            .execute(&sql, params![to_db_value(id)])
            .map_err(|e| ConnectorError::backend("failed to delete record", e))?;
        Ok(affected > 0)
    }

    fn count(&mut self, filters: &Filters) -> ConnectorResult<u64> {
        let (where_clause, values) = self.render_filters(filters)?;
        let sql = format!(
            "SELECT COUNT(*) FROM {}{}",
            quote_ident(&self.config.table_name),
            where_clause
        );
        let conn = self.conn()?;
        let count: i64 = conn
            .query_row(&sql, params_from_iter(values), |row| row.get(0))
            .map_err(|e| ConnectorError::backend("failed to count records", e))?;
        Ok(count as u64)
    }

    fn bulk_insert(&mut self, records: &[Record]) -> ConnectorResult<Vec<Record>> {
        if records.is_empty() {
            return Ok(Vec::new());
        }
        let pk = self.config.primary_key.clone();
        let conn = self.conn()?;

        // Pre-assign keys for records that do not carry one, one round trip
        let missing = records
            .iter()
            .filter(|r| r.get_or_null(&pk).is_null())
            .count();
        let mut fresh_ids = Vec::with_capacity(missing);
        if missing > 0 {
            let sql = format!(
                "SELECT nextval('{}') FROM range(?)",
                self.sequence_name()
            );
            let mut stmt = conn
                .prepare(&sql)
                .map_err(|e| ConnectorError::backend("failed to reserve keys", e))?;
            let mut rows = stmt
                .query(params![missing as i64])
                .map_err(|e| ConnectorError::backend("failed to reserve keys", e))?;
            while let Some(row) = rows
                .next()
                .map_err(|e| ConnectorError::backend("failed to reserve keys", e))?
            {
                let id: i64 = row
                    .get(0)
                    .map_err(|e| ConnectorError::backend("failed to reserve keys", e))?;
                fresh_ids.push(id);
            }
        }

        let mut fresh = fresh_ids.into_iter();
        let mut stored = Vec::with_capacity(records.len());
        let mut appender = conn
            .appender(&self.config.table_name)
            .map_err(|e| ConnectorError::backend("failed to open appender", e))?;
        for record in records {
            let mut record = record.clone();
            if record.get_or_null(&pk).is_null() {
                // Guaranteed by the reservation above
                let id = fresh.next().expect("reserved key available");
                record.set(pk.clone(), id);
            }
            let row: Vec<DbValue> = self
                .schema
                .fields()
                .iter()
                .map(|f| to_db_value(&record.get_or_null(&f.name)))
                .collect();
            appender
                .append_row(appender_params_from_iter(row))
                .map_err(|e| ConnectorError::backend("failed to append row", e))?;
            stored.push(record);
        }
        appender
            .flush()
            .map_err(|e| ConnectorError::backend("failed to flush appender", e))?;
        tracing::debug!("bulk inserted {} records into DuckDB", stored.len());
        Ok(stored)
    }

    fn get_last_k_items(&mut self, k: usize) -> ConnectorResult<Vec<Record>> {
        let time_column = self.config.time_column.clone();
        if !self.schema.contains(&time_column) {
            return Err(ConnectorError::Configuration(format!(
                "time column '{time_column}' is not a schema field"
            )));
        }
        let sql = format!(
            "SELECT {} FROM {} ORDER BY {} DESC LIMIT ?",
            self.select_columns(),
            quote_ident(&self.config.table_name),
            quote_ident(&time_column)
        );
        self.query_records(&sql, vec![DbValue::BigInt(k as i64)])
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{name}\"")
}

fn column_type(field_type: FieldType) -> &'static str {
    match field_type {
        FieldType::Int => "BIGINT",
        FieldType::Float => "DOUBLE",
        FieldType::String => "VARCHAR",
        FieldType::Bool => "BOOLEAN",
        FieldType::Timestamp => "TIMESTAMP",
        FieldType::Bytes => "BLOB",
    }
}

fn to_db_value(value: &Value) -> DbValue {
    match value {
        Value::Null => DbValue::Null,
        Value::Int(v) => DbValue::BigInt(*v),
        Value::Float(v) => DbValue::Double(*v),
        Value::Text(s) => DbValue::Text(s.clone()),
        Value::Bool(b) => DbValue::Boolean(*b),
        Value::Timestamp(ts) => DbValue::Timestamp(TimeUnit::Microsecond, ts.timestamp_micros()),
        Value::Bytes(b) => DbValue::Blob(b.clone()),
    }
}

fn from_db_value(value: ValueRef<'_>) -> ConnectorResult<Value> {
    Ok(match value {
        ValueRef::Null => Value::Null,
        ValueRef::Boolean(b) => Value::Bool(b),
        ValueRef::TinyInt(v) => Value::Int(v as i64),
        ValueRef::SmallInt(v) => Value::Int(v as i64),
        ValueRef::Int(v) => Value::Int(v as i64),
        ValueRef::BigInt(v) => Value::Int(v),
        ValueRef::HugeInt(v) => Value::Int(v as i64),
        ValueRef::UTinyInt(v) => Value::Int(v as i64),
        ValueRef::USmallInt(v) => Value::Int(v as i64),
        ValueRef::UInt(v) => Value::Int(v as i64),
        ValueRef::UBigInt(v) => Value::Int(v as i64),
        ValueRef::Float(v) => Value::Float(v as f64),
        ValueRef::Double(v) => Value::Float(v),
        ValueRef::Text(bytes) => Value::Text(
            std::str::from_utf8(bytes)
                .map_err(|e| ConnectorError::backend("invalid UTF-8 in text column", e))?
                .to_string(),
        ),
        ValueRef::Blob(bytes) => Value::Bytes(bytes.to_vec()),
        ValueRef::Timestamp(unit, v) => Value::Timestamp(timestamp_from_unit(unit, v)?),
        other => {
            return Err(ConnectorError::Configuration(format!(
                "unsupported DuckDB value type: {other:?}"
            )))
        }
    })
}

fn timestamp_from_unit(unit: TimeUnit, value: i64) -> ConnectorResult<DateTime<Utc>> {
    let micros = match unit {
        TimeUnit::Second => value * 1_000_000,
        TimeUnit::Millisecond => value * 1_000,
        TimeUnit::Microsecond => value,
        TimeUnit::Nanosecond => value / 1_000,
    };
    DateTime::from_timestamp_micros(micros).ok_or_else(|| {
        ConnectorError::Configuration(format!("timestamp out of range: {value} ({unit:?})"))
    })
}

fn row_to_record(row: &duckdb::Row<'_>, schema: &Schema) -> ConnectorResult<Record> {
    let mut record = Record::new();
    for (idx, field) in schema.fields().iter().enumerate() {
        let value = row
            .get_ref(idx)
            .map_err(|e| ConnectorError::backend("failed to read column", e))?;
        record.set(field.name.clone(), from_db_value(value)?);
    }
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldDef;
    use chrono::{Duration, TimeZone};

    fn reading_schema() -> Schema {
        Schema::new(vec![
            FieldDef::nullable("id", FieldType::Int),
            FieldDef::required("device", FieldType::String),
            FieldDef::required("temperature", FieldType::Float),
            FieldDef::required("active", FieldType::Bool),
            FieldDef::required("created_at", FieldType::Timestamp),
        ])
        .unwrap()
    }

    fn base_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn reading(device: &str, temperature: f64, minutes: i64) -> Record {
        Record::new()
            .with("device", device)
            .with("temperature", temperature)
            .with("active", true)
            .with("created_at", base_time() + Duration::minutes(minutes))
    }

    fn connected() -> DuckdbConnector {
        let mut connector =
            DuckdbConnector::new(reading_schema(), ConnectorConfig::new("readings")).unwrap();
        connector.connect().unwrap();
        connector.create_table().unwrap();
        connector
    }

    #[test]
    fn test_rejects_non_int_primary_key() {
        let mut config = ConnectorConfig::new("readings");
        config.primary_key = "device".to_string();
        let err = DuckdbConnector::new(reading_schema(), config).unwrap_err();
        assert!(matches!(err, ConnectorError::Configuration(_)));
    }

    #[test]
    fn test_operations_require_connect() {
        let mut connector =
            DuckdbConnector::new(reading_schema(), ConnectorConfig::new("readings")).unwrap();
        let err = connector.create(&reading("a", 1.0, 0)).unwrap_err();
        assert!(matches!(err, ConnectorError::Connection(_)));
    }

    #[test]
    fn test_create_table_is_idempotent() {
        let mut connector = connected();
        connector.create_table().unwrap();
        connector.create_table().unwrap();
    }

    #[test]
    fn test_create_assigns_key_and_roundtrips() {
        let mut connector = connected();
        let input = reading("sensor-a", 21.5, 0);
        let created = connector.create(&input).unwrap();

        let id = created.get("id").cloned().unwrap();
        assert!(matches!(id, Value::Int(_)));
        // All caller-supplied fields survive unchanged
        assert_eq!(created.get("device"), input.get("device"));
        assert_eq!(created.get("temperature"), input.get("temperature"));
        assert_eq!(created.get("active"), input.get("active"));
        assert_eq!(created.get("created_at"), input.get("created_at"));

        let fetched = connector.get_by_id(&id).unwrap().unwrap();
        assert_eq!(fetched, created);
    }

    #[test]
    fn test_explicit_key_is_respected() {
        let mut connector = connected();
        let created = connector
            .create(&reading("sensor-a", 21.5, 0).with("id", 42i64))
            .unwrap();
        assert_eq!(created.get("id"), Some(&Value::Int(42)));
    }

    #[test]
    fn test_get_by_id_absent() {
        let mut connector = connected();
        assert!(connector.get_by_id(&Value::Int(999)).unwrap().is_none());
    }

    #[test]
    fn test_update_refetches_and_is_idempotent() {
        let mut connector = connected();
        let created = connector.create(&reading("sensor-a", 21.5, 0)).unwrap();
        let id = created.get("id").cloned().unwrap();

        let changes = Record::new().with("temperature", 25.0);
        let first = connector.update(&id, &changes).unwrap().unwrap();
        assert_eq!(first.get("temperature"), Some(&Value::Float(25.0)));
        assert_eq!(first.get("device"), created.get("device"));

        let second = connector.update(&id, &changes).unwrap().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_update_absent_returns_none() {
        let mut connector = connected();
        let changes = Record::new().with("temperature", 25.0);
        assert!(connector.update(&Value::Int(1), &changes).unwrap().is_none());
    }

    #[test]
    fn test_delete() {
        let mut connector = connected();
        let created = connector.create(&reading("sensor-a", 21.5, 0)).unwrap();
        let id = created.get("id").cloned().unwrap();

        assert!(connector.delete(&id, true).unwrap());
        assert!(connector.get_by_id(&id).unwrap().is_none());
        assert!(!connector.delete(&id, true).unwrap());
    }

    #[test]
    fn test_list_filters_order_and_pagination() {
        let mut connector = connected();
        for i in 0..5 {
            connector
                .create(&reading("sensor-a", 20.0 + i as f64, i))
                .unwrap();
        }
        connector.create(&reading("sensor-b", 30.0, 10)).unwrap();

        let filters = Filters::new().eq("device", "sensor-a");
        let all = connector.list(None, 0, &filters, None, false).unwrap();
        assert_eq!(all.len(), 5);
        assert!(all
            .iter()
            .all(|r| r.get("device") == Some(&Value::Text("sensor-a".into()))));

        let limited = connector.list(Some(2), 0, &filters, None, false).unwrap();
        assert_eq!(limited.len(), 2);

        let ordered = connector
            .list(Some(2), 1, &filters, Some("temperature"), true)
            .unwrap();
        assert_eq!(ordered.len(), 2);
        assert_eq!(ordered[0].get("temperature"), Some(&Value::Float(23.0)));
        assert_eq!(ordered[1].get("temperature"), Some(&Value::Float(22.0)));
    }

    #[test]
    fn test_operator_filters_are_rejected() {
        let mut connector = connected();
        let filters = Filters::new().gt("temperature", 20.0);
        let err = connector.list(None, 0, &filters, None, false).unwrap_err();
        assert!(matches!(err, ConnectorError::NotSupported(_)));
        let err = connector.count(&filters).unwrap_err();
        assert!(matches!(err, ConnectorError::NotSupported(_)));
    }

    #[test]
    fn test_count() {
        let mut connector = connected();
        for i in 0..3 {
            connector.create(&reading("sensor-a", 20.0, i)).unwrap();
        }
        connector.create(&reading("sensor-b", 30.0, 5)).unwrap();

        assert_eq!(connector.count(&Filters::new()).unwrap(), 4);
        assert_eq!(
            connector
                .count(&Filters::new().eq("device", "sensor-b"))
                .unwrap(),
            1
        );
    }

    #[test]
    fn test_bulk_insert_assigns_missing_keys() {
        let mut connector = connected();
        let records: Vec<Record> = (0..10).map(|i| reading("sensor-a", i as f64, i)).collect();
        let stored = connector.bulk_insert(&records).unwrap();

        assert_eq!(stored.len(), 10);
        let mut ids: Vec<i64> = stored
            .iter()
            .map(|r| match r.get("id") {
                Some(Value::Int(v)) => *v,
                other => panic!("missing key: {other:?}"),
            })
            .collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 10);
        assert_eq!(connector.count(&Filters::new()).unwrap(), 10);

        // Stored records are readable by their assigned keys
        let fetched = connector
            .get_by_id(stored[0].get("id").unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(fetched, stored[0]);
    }

    #[test]
    fn test_bulk_insert_empty_is_noop() {
        let mut connector = connected();
        assert!(connector.bulk_insert(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_get_last_k_items() {
        let mut connector = connected();
        for i in 0..5 {
            connector.create(&reading("sensor-a", i as f64, i)).unwrap();
        }

        let last = connector.get_last_k_items(2).unwrap();
        assert_eq!(last.len(), 2);
        assert_eq!(
            last[0].get("created_at"),
            Some(&Value::Timestamp(base_time() + Duration::minutes(4)))
        );
        assert_eq!(
            last[1].get("created_at"),
            Some(&Value::Timestamp(base_time() + Duration::minutes(3)))
        );

        // Fewer than k rows: all of them come back
        assert_eq!(connector.get_last_k_items(50).unwrap().len(), 5);
    }

    #[test]
    fn test_on_disk_persistence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("readings.duckdb");
        let mut config = ConnectorConfig::new("readings");
        config.db_path = Some(path.to_string_lossy().to_string());

        let id = {
            let mut connector =
                DuckdbConnector::new(reading_schema(), config.clone()).unwrap();
            connector.connect().unwrap();
            connector.create_table().unwrap();
            let created = connector.create(&reading("sensor-a", 21.5, 0)).unwrap();
            connector.disconnect().unwrap();
            created.get("id").cloned().unwrap()
        };

        let mut connector = DuckdbConnector::new(reading_schema(), config).unwrap();
        connector.connect().unwrap();
        let fetched = connector.get_by_id(&id).unwrap().unwrap();
        assert_eq!(
            fetched.get("device"),
            Some(&Value::Text("sensor-a".into()))
        );
    }
}
