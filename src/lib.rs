//! # Polystore
//!
//! One CRUD and bulk-transfer vocabulary for typed records across three
//! structurally different backends: an embedded analytical engine (DuckDB),
//! a relational time-partitioned engine (TimescaleDB) and a managed cloud
//! time-series service (AWS Timestream).
//!
//! ## Modules
//!
//! - [`schema`]: field declarations, dynamic values and records
//! - [`config`]: immutable per-binding connector settings
//! - [`connector`]: the capability contract and the three backends
//! - [`filter`]: the equality/operator filter DSL
//! - [`crud`]: the facade binding one schema to one connector
//! - [`bulk`]: batched writes and streaming reads with bounded memory
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use polystore::{
//!     ConnectorConfig, CrudStore, DuckdbConnector, FieldDef, FieldType, Filters, Record, Schema,
//! };
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let schema = Schema::new(vec![
//!         FieldDef::nullable("id", FieldType::Int),
//!         FieldDef::required("device", FieldType::String),
//!         FieldDef::required("temperature", FieldType::Float),
//!         FieldDef::required("created_at", FieldType::Timestamp),
//!     ])?;
//!
//!     let mut store = CrudStore::new();
//!     store.bind(Box::new(DuckdbConnector::new(
//!         schema,
//!         ConnectorConfig::new("readings"),
//!     )?));
//!     store.connect()?;
//!     store.create_table()?;
//!
//!     let created = store.create(
//!         &Record::new()
//!             .with("device", "sensor-a")
//!             .with("temperature", 21.5)
//!             .with("created_at", chrono::Utc::now()),
//!     )?;
//!     println!("stored with key {:?}", created.get("id"));
//!
//!     let warm = store.list(
//!         Some(10),
//!         0,
//!         &Filters::new().eq("device", "sensor-a"),
//!         Some("created_at"),
//!         true,
//!     )?;
//!     println!("found {} readings", warm.len());
//!     Ok(())
//! }
//! ```

pub mod bulk;
pub mod config;
pub mod connector;
pub mod crud;
pub mod filter;
pub mod schema;

// Re-export top-level types for convenience
pub use config::{AuditColumns, ConnectorConfig};

pub use connector::{
    Connector, ConnectorError, ConnectorResult, DuckdbConnector, TimescaleConnector,
    TimestreamConnector,
};

pub use crud::CrudStore;

pub use filter::{FilterOp, Filters};

pub use schema::{FieldDef, FieldType, Record, Schema, Value};

pub use bulk::{
    bulk_adapter, BulkAdapter, BulkSource, DuckdbBulkAdapter, PostgresBulkAdapter, RecordStream,
};
