//! Cloud connector (AWS Timestream)
//!
//! Timestream stores one physical row per measure: a record with three
//! scalar fields becomes three rows sharing the same time and dimension set.
//! The write path performs that split; the read path inverts it with a
//! streaming group-by keyed on `(time, dimension-tuple)`, accumulated across
//! every response page and flushed once the last page is consumed, so peak
//! memory is bounded by the number of distinct keys seen.
//!
//! The SDK is async; the connector owns a private current-thread runtime and
//! blocks on every call, keeping the public surface synchronous like the
//! other backends. Updates and deletes are not expressible in Timestream and
//! always fail with `NotSupported`.

use crate::config::ConnectorConfig;
use crate::connector::{Connector, ConnectorError, ConnectorResult};
use crate::filter::{FilterOp, Filters};
use crate::schema::{FieldType, Record, Schema, Value};
use aws_config::BehaviorVersion;
use aws_sdk_timestreamwrite::types::{
    Dimension, MeasureValueType, Record as WriteRecord, TimeUnit as WriteTimeUnit,
};
use chrono::{DateTime, NaiveDateTime, Utc};
use std::collections::HashMap;

struct Clients {
    write: aws_sdk_timestreamwrite::Client,
    query: aws_sdk_timestreamquery::Client,
    // Keep the endpoint-discovery reloaders alive with the clients
    _write_endpoints: aws_sdk_timestreamwrite::endpoint_discovery::ReloadEndpoint,
    _query_endpoints: aws_sdk_timestreamquery::endpoint_discovery::ReloadEndpoint,
}

/// Connector for AWS Timestream
pub struct TimestreamConnector {
    schema: Schema,
    config: ConnectorConfig,
    runtime: tokio::runtime::Runtime,
    clients: Option<Clients>,
}

impl std::fmt::Debug for TimestreamConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimestreamConnector")
            .field("schema", &self.schema)
            .field("config", &self.config)
            .field("connected", &self.clients.is_some())
            .finish()
    }
}

impl TimestreamConnector {
    /// Build a connector; fails when region, database name or the dimension
    /// tag list is missing, or when a tag or the time column is not a schema
    /// field
    pub fn new(schema: Schema, config: ConnectorConfig) -> ConnectorResult<Self> {
        if config.aws_region.is_none() {
            return Err(ConnectorError::Configuration(
                "aws_region is required for the Timestream connector".to_string(),
            ));
        }
        if config.database_name.is_none() {
            return Err(ConnectorError::Configuration(
                "database_name is required for the Timestream connector".to_string(),
            ));
        }
        if config.tags.is_empty() {
            return Err(ConnectorError::Configuration(
                "at least one dimension (tag) must be configured for Timestream".to_string(),
            ));
        }
        for tag in &config.tags {
            if !schema.contains(tag) {
                return Err(ConnectorError::Configuration(format!(
                    "dimension tag '{tag}' is not a schema field"
                )));
            }
        }
        if !schema.contains(&config.time_column) {
            return Err(ConnectorError::Configuration(format!(
                "time column '{}' is not a schema field",
                config.time_column
            )));
        }
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| ConnectorError::backend("failed to start Timestream runtime", e))?;
        Ok(Self {
            schema,
            config,
            runtime,
            clients: None,
        })
    }

    fn clients(&self) -> ConnectorResult<&Clients> {
        self.clients.as_ref().ok_or_else(|| {
            ConnectorError::Connection(
                "not connected to AWS Timestream; call connect() first".to_string(),
            )
        })
    }

    fn database_name(&self) -> &str {
        self.config.database_name.as_deref().expect("validated in new()")
    }

    /// Run a pivot query through every response page, grouping as pages
    /// arrive and flushing once at the end
    fn run_pivot_query(&self, sql: &str) -> ConnectorResult<Vec<Record>> {
        let clients = self.clients()?;
        let mut accumulator =
            PivotAccumulator::new(&self.schema, &self.config.time_column, &self.config.tags);

        self.runtime.block_on(async {
            let mut next_token: Option<String> = None;
            loop {
                let mut request = clients.query.query().query_string(sql);
                if let Some(token) = &next_token {
                    request = request.next_token(token);
                }
                let response = request
                    .send()
                    .await
                    .map_err(|e| ConnectorError::backend("failed to query Timestream", e))?;

                let columns: Vec<String> = response
                    .column_info()
                    .iter()
                    .map(|c| c.name().unwrap_or_default().to_string())
                    .collect();
                let rows: Vec<Vec<Option<String>>> = response
                    .rows()
                    .iter()
                    .map(|row| {
                        row.data()
                            .iter()
                            .map(|d| d.scalar_value().map(str::to_string))
                            .collect()
                    })
                    .collect();
                accumulator.absorb_page(&columns, &rows);

                next_token = response.next_token().map(str::to_string);
                if next_token.is_none() {
                    break;
                }
            }
            Ok::<(), ConnectorError>(())
        })?;
        Ok(accumulator.finish())
    }

    fn run_scalar_query(&self, sql: &str) -> ConnectorResult<Option<String>> {
        let clients = self.clients()?;
        self.runtime.block_on(async {
            let response = clients
                .query
                .query()
                .query_string(sql)
                .send()
                .await
                .map_err(|e| ConnectorError::backend("failed to query Timestream", e))?;
            Ok(response
                .rows()
                .first()
                .and_then(|row| row.data().first())
                .and_then(|d| d.scalar_value().map(str::to_string)))
        })
    }
}

impl Connector for TimestreamConnector {
    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn config(&self) -> &ConnectorConfig {
        &self.config
    }

    fn connect(&mut self) -> ConnectorResult<()> {
        if self.clients.is_some() {
            return Ok(());
        }
        let region = self.config.aws_region.clone().expect("validated in new()");
        let clients = self.runtime.block_on(async {
            let shared = aws_config::defaults(BehaviorVersion::latest())
                .region(aws_config::Region::new(region.clone()))
                .load()
                .await;
            let (write, write_endpoints) = aws_sdk_timestreamwrite::Client::new(&shared)
                .with_endpoint_discovery_enabled()
                .await
                .map_err(|e| {
                    ConnectorError::Connection(format!("failed to connect to Timestream: {e}"))
                })?;
            let (query, query_endpoints) = aws_sdk_timestreamquery::Client::new(&shared)
                .with_endpoint_discovery_enabled()
                .await
                .map_err(|e| {
                    ConnectorError::Connection(format!("failed to connect to Timestream: {e}"))
                })?;
            Ok::<Clients, ConnectorError>(Clients {
                write,
                query,
                _write_endpoints: write_endpoints,
                _query_endpoints: query_endpoints,
            })
        })?;
        tracing::info!("connected to AWS Timestream in region '{}'", region);
        self.clients = Some(clients);
        Ok(())
    }

    fn disconnect(&mut self) -> ConnectorResult<()> {
        if self.clients.take().is_some() {
            tracing::info!("AWS Timestream clients cleared");
        }
        Ok(())
    }

    /// The database itself is a region-level resource assumed to exist; the
    /// table is checked and created on demand
    fn create_table(&mut self) -> ConnectorResult<()> {
        let database = self.database_name().to_string();
        let table = self.config.table_name.clone();
        let clients = self.clients()?;

        self.runtime.block_on(async {
            let described = clients
                .write
                .describe_table()
                .database_name(&database)
                .table_name(&table)
                .send()
                .await;
            match described {
                Ok(_) => {
                    tracing::info!("table '{}.{}' already exists in Timestream", database, table);
                    Ok(())
                }
                Err(err) => {
                    let service = err.into_service_error();
                    if !service.is_resource_not_found_exception() {
                        return Err(ConnectorError::backend(
                            "failed to describe Timestream table",
                            service,
                        ));
                    }
                    clients
                        .write
                        .create_table()
                        .database_name(&database)
                        .table_name(&table)
                        .send()
                        .await
                        .map_err(|e| {
                            ConnectorError::backend("failed to create Timestream table", e)
                        })?;
                    tracing::info!("created table '{}.{}' in Timestream", database, table);
                    Ok(())
                }
            }
        })
    }

    fn create(&mut self, record: &Record) -> ConnectorResult<Record> {
        let payload = build_write_payload(&self.schema, &self.config, record)?;
        let database = self.database_name().to_string();
        let table = self.config.table_name.clone();
        let clients = self.clients()?;

        let common = WriteRecord::builder()
            .set_dimensions(Some(payload.dimensions))
            .time(payload.time_millis)
            .time_unit(WriteTimeUnit::Milliseconds)
            .build();
        let measures = payload.measures.len();

        self.runtime.block_on(async {
            clients
                .write
                .write_records()
                .database_name(&database)
                .table_name(&table)
                .common_attributes(common)
                .set_records(Some(payload.measures))
                .send()
                .await
                .map_err(|e| ConnectorError::backend("failed to write records to Timestream", e))?;
            Ok::<(), ConnectorError>(())
        })?;
        tracing::debug!("wrote {} measures to Timestream", measures);
        Ok(record.clone())
    }

    /// Requires the primary key to be a declared dimension: only dimensions
    /// are addressable in the pivoted model
    fn get_by_id(&mut self, id: &Value) -> ConnectorResult<Option<Record>> {
        let pk = self.config.primary_key.clone();
        if !self.config.tags.contains(&pk) {
            return Err(ConnectorError::Configuration(format!(
                "primary key '{pk}' must be a dimension (tag) for get_by_id on Timestream"
            )));
        }
        let mut filters = Filters::new();
        filters.push(pk, FilterOp::Eq(id.clone()));
        let records = self.list(None, 0, &filters, None, false)?;
        Ok(records.into_iter().next())
    }

    /// Results are always ordered by time descending; `order_by` is ignored
    /// and pagination is applied to the reconstructed records
    fn list(
        &mut self,
        limit: Option<usize>,
        offset: usize,
        filters: &Filters,
        order_by: Option<&str>,
        _order_desc: bool,
    ) -> ConnectorResult<Vec<Record>> {
        if let Some(column) = order_by {
            if column != self.config.time_column {
                tracing::warn!(
                    "Timestream results are ordered by '{}'; ignoring order_by '{}'",
                    self.config.time_column,
                    column
                );
            }
        }
        let sql = build_select_sql(&self.schema, &self.config, filters)?;
        let mut records = self.run_pivot_query(&sql)?;
        if offset > 0 {
            records.drain(..offset.min(records.len()));
        }
        if let Some(n) = limit {
            records.truncate(n);
        }
        Ok(records)
    }

    fn update(&mut self, _id: &Value, _changes: &Record) -> ConnectorResult<Option<Record>> {
        Err(ConnectorError::NotSupported(
            "AWS Timestream does not support updates",
        ))
    }

    fn delete(&mut self, _id: &Value, _hard_delete: bool) -> ConnectorResult<bool> {
        Err(ConnectorError::NotSupported(
            "AWS Timestream does not support deletes",
        ))
    }

    /// Counts distinct time values, not distinct logical records; records
    /// sharing a timestamp are undercounted
    fn count(&mut self, filters: &Filters) -> ConnectorResult<u64> {
        let sql = build_count_sql(&self.schema, &self.config, filters)?;
        let scalar = self.run_scalar_query(&sql)?;
        let raw = scalar.ok_or_else(|| {
            ConnectorError::Connection("Timestream count query returned no rows".to_string())
        })?;
        raw.parse::<u64>().map_err(|e| {
            ConnectorError::backend(format!("invalid count value '{raw}'"), e)
        })
    }

    /// One write per record; Timestream has no returning bulk path beyond the
    /// shared common-attributes call used by `create`
    fn bulk_insert(&mut self, records: &[Record]) -> ConnectorResult<Vec<Record>> {
        let mut stored = Vec::with_capacity(records.len());
        for record in records {
            stored.push(self.create(record)?);
        }
        Ok(stored)
    }

    fn get_last_k_items(&mut self, k: usize) -> ConnectorResult<Vec<Record>> {
        let sql = build_last_k_sql(&self.config, k);
        let mut records = self.run_pivot_query(&sql)?;
        // k distinct times can carry more than k logical records when
        // dimension tuples overlap in time
        records.truncate(k);
        Ok(records)
    }
}

#[derive(Debug)]
struct WritePayload {
    dimensions: Vec<Dimension>,
    time_millis: String,
    measures: Vec<WriteRecord>,
}

/// Split a record into dimensions, time and one measure row per remaining
/// scalar field
fn build_write_payload(
    schema: &Schema,
    config: &ConnectorConfig,
    record: &Record,
) -> ConnectorResult<WritePayload> {
    let mut dimensions = Vec::new();
    for tag in &config.tags {
        let value = record.get_or_null(tag);
        if value.is_null() {
            continue;
        }
        let dimension = Dimension::builder()
            .name(tag)
            .value(scalar_string(&value))
            .build()
            .map_err(|e| ConnectorError::backend("failed to build dimension", e))?;
        dimensions.push(dimension);
    }
    if dimensions.is_empty() {
        return Err(ConnectorError::Configuration(
            "at least one dimension (tag) value is required for a Timestream record".to_string(),
        ));
    }

    let time_millis = match record.get(&config.time_column) {
        Some(Value::Timestamp(ts)) => ts.timestamp_millis().to_string(),
        Some(Value::Null) | None => {
            return Err(ConnectorError::Configuration(format!(
                "record is missing the time column '{}'",
                config.time_column
            )))
        }
        Some(other) => {
            return Err(ConnectorError::Configuration(format!(
                "time column '{}' must hold a timestamp, got {other:?}",
                config.time_column
            )))
        }
    };

    let mut measures = Vec::new();
    for field in schema.fields() {
        if config.tags.contains(&field.name) || field.name == config.time_column {
            continue;
        }
        let value = record.get_or_null(&field.name);
        if value.is_null() {
            continue;
        }
        measures.push(
            WriteRecord::builder()
                .measure_name(&field.name)
                .measure_value(scalar_string(&value))
                .measure_value_type(measure_value_type(&value))
                .build(),
        );
    }
    if measures.is_empty() {
        return Err(ConnectorError::Configuration(
            "no measure values found in the record to write".to_string(),
        ));
    }

    Ok(WritePayload {
        dimensions,
        time_millis,
        measures,
    })
}

/// Value-type classification happens at write time, per measure
fn measure_value_type(value: &Value) -> MeasureValueType {
    match value {
        Value::Bool(_) => MeasureValueType::Boolean,
        Value::Int(_) | Value::Float(_) => MeasureValueType::Double,
        _ => MeasureValueType::Varchar,
    }
}

fn scalar_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Int(v) => v.to_string(),
        Value::Float(v) => v.to_string(),
        Value::Text(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Timestamp(ts) => ts.to_rfc3339(),
        Value::Bytes(b) => b.iter().map(|byte| format!("{byte:02x}")).collect(),
    }
}

fn table_ref(config: &ConnectorConfig) -> String {
    format!(
        "\"{}\".\"{}\"",
        config.database_name.as_deref().unwrap_or_default(),
        config.table_name
    )
}

fn projection(config: &ConnectorConfig) -> String {
    let mut columns = vec![config.time_column.clone()];
    columns.extend(config.tags.iter().cloned());
    columns.push("measure_name".to_string());
    columns.push("measure_value".to_string());
    columns.join(", ")
}

fn sql_literal(value: &Value) -> ConnectorResult<String> {
    Ok(match value {
        Value::Int(v) => v.to_string(),
        Value::Float(v) => v.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Text(s) => format!("'{}'", s.replace('\'', "''")),
        Value::Timestamp(ts) => format!("from_milliseconds({})", ts.timestamp_millis()),
        Value::Null | Value::Bytes(_) => {
            return Err(ConnectorError::NotSupported(
                "unsupported filter literal for the Timestream backend",
            ))
        }
    })
}

fn render_where(schema: &Schema, filters: &Filters) -> ConnectorResult<String> {
    let mut clauses = Vec::new();
    for (field, op) in filters.clauses() {
        if !schema.contains(field) {
            tracing::warn!("ignoring unknown filter field: {}", field);
            continue;
        }
        match op {
            FilterOp::Eq(value) => {
                clauses.push(format!("\"{}\" = {}", field, sql_literal(value)?));
            }
            _ => {
                return Err(ConnectorError::NotSupported(
                    "only equality filters are supported by the Timestream backend",
                ))
            }
        }
    }
    Ok(if clauses.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", clauses.join(" AND "))
    })
}

fn build_select_sql(
    schema: &Schema,
    config: &ConnectorConfig,
    filters: &Filters,
) -> ConnectorResult<String> {
    Ok(format!(
        "SELECT {} FROM {}{} ORDER BY {} DESC",
        projection(config),
        table_ref(config),
        render_where(schema, filters)?,
        config.time_column
    ))
}

fn build_count_sql(
    schema: &Schema,
    config: &ConnectorConfig,
    filters: &Filters,
) -> ConnectorResult<String> {
    Ok(format!(
        "SELECT COUNT(DISTINCT {}) FROM {}{}",
        config.time_column,
        table_ref(config),
        render_where(schema, filters)?
    ))
}

/// Resolve the k most recent distinct time values, then fetch every measure
/// row at those times
fn build_last_k_sql(config: &ConnectorConfig, k: usize) -> String {
    let subquery = format!(
        "SELECT DISTINCT {} FROM {} ORDER BY {} DESC LIMIT {}",
        config.time_column,
        table_ref(config),
        config.time_column,
        k
    );
    format!(
        "SELECT {} FROM {} WHERE {} IN ({}) ORDER BY {} DESC",
        projection(config),
        table_ref(config),
        config.time_column,
        subquery,
        config.time_column
    )
}

/// Streaming group-by over pivoted rows
///
/// Rows sharing `(time, dimension-tuple)` accumulate into one logical record
/// in first-seen order; each measure lands under its field name with the
/// value cast back to the schema's declared type.
struct PivotAccumulator<'a> {
    schema: &'a Schema,
    time_column: &'a str,
    tags: &'a [String],
    order: Vec<PivotKey>,
    groups: HashMap<PivotKey, Record>,
}

type PivotKey = (String, Vec<String>);

impl<'a> PivotAccumulator<'a> {
    fn new(schema: &'a Schema, time_column: &'a str, tags: &'a [String]) -> Self {
        Self {
            schema,
            time_column,
            tags,
            order: Vec::new(),
            groups: HashMap::new(),
        }
    }

    fn absorb_page(&mut self, columns: &[String], rows: &[Vec<Option<String>>]) {
        for row in rows {
            let cell = |name: &str| -> Option<&str> {
                columns
                    .iter()
                    .position(|c| c == name)
                    .and_then(|i| row.get(i))
                    .and_then(|v| v.as_deref())
            };

            let time_raw = match cell(self.time_column) {
                Some(v) => v.to_string(),
                None => continue,
            };
            let dim_raw: Vec<String> = self
                .tags
                .iter()
                .map(|tag| cell(tag).unwrap_or_default().to_string())
                .collect();
            let key: PivotKey = (time_raw.clone(), dim_raw.clone());

            if !self.groups.contains_key(&key) {
                let mut record = Record::new();
                record.set(
                    self.time_column.to_string(),
                    self.cast_field(self.time_column, &time_raw),
                );
                for (tag, raw) in self.tags.iter().zip(&dim_raw) {
                    record.set(tag.clone(), self.cast_field(tag, raw));
                }
                self.order.push(key.clone());
                self.groups.insert(key.clone(), record);
            }

            let (measure_name, measure_value) = match (cell("measure_name"), cell("measure_value"))
            {
                (Some(name), Some(value)) => (name.to_string(), value.to_string()),
                _ => continue,
            };
            let value = self.cast_field(&measure_name, &measure_value);
            if let Some(record) = self.groups.get_mut(&key) {
                record.set(measure_name, value);
            }
        }
    }

    /// Cast a raw scalar to the schema's declared type; on failure keep the
    /// raw string — a recoverable condition, never an aborted read
    fn cast_field(&self, field: &str, raw: &str) -> Value {
        let field_type = match self.schema.field(field) {
            Some(def) => def.field_type,
            None => return Value::Text(raw.to_string()),
        };
        match cast_scalar(raw, field_type) {
            Ok(value) => value,
            Err(reason) => {
                tracing::warn!(
                    "could not cast '{}' to {} for field '{}': {}; keeping raw value",
                    raw,
                    field_type,
                    field,
                    reason
                );
                Value::Text(raw.to_string())
            }
        }
    }

    fn finish(self) -> Vec<Record> {
        let mut groups = self.groups;
        self.order
            .iter()
            .filter_map(|key| groups.remove(key))
            .collect()
    }
}

fn cast_scalar(raw: &str, field_type: FieldType) -> Result<Value, String> {
    match field_type {
        FieldType::Int => raw.parse::<i64>().map(Value::Int).map_err(|e| e.to_string()),
        FieldType::Float => raw.parse::<f64>().map(Value::Float).map_err(|e| e.to_string()),
        FieldType::Bool => raw.parse::<bool>().map(Value::Bool).map_err(|e| e.to_string()),
        FieldType::String => Ok(Value::Text(raw.to_string())),
        FieldType::Timestamp => parse_timestream_time(raw),
        FieldType::Bytes => Ok(Value::Bytes(raw.as_bytes().to_vec())),
    }
}

/// Timestream renders timestamps as `2024-03-01 12:00:00.000000000`
fn parse_timestream_time(raw: &str) -> Result<Value, String> {
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f") {
        return Ok(Value::Timestamp(DateTime::from_naive_utc_and_offset(
            naive, Utc,
        )));
    }
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| Value::Timestamp(dt.with_timezone(&Utc)))
        .map_err(|e| e.to_string())
}
