//! CRUD facade
//!
//! Binds exactly one connector and exposes its operations 1:1. The facade
//! adds no caching and no validation; its entire value is vocabulary
//! uniformity, so application code reads identically no matter which backend
//! is behind it. Any operation before [`CrudStore::bind`] fails with
//! `NotBound`.

use crate::connector::{Connector, ConnectorError, ConnectorResult};
use crate::filter::Filters;
use crate::schema::{Record, Schema, Value};

/// One schema, one connector, one uniform vocabulary
#[derive(Default)]
pub struct CrudStore {
    connector: Option<Box<dyn Connector>>,
}

impl CrudStore {
    /// An unbound store; attach a connector with [`bind`](Self::bind)
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach the connector this store delegates to
    pub fn bind(&mut self, connector: Box<dyn Connector>) {
        self.connector = Some(connector);
    }

    pub fn is_bound(&self) -> bool {
        self.connector.is_some()
    }

    /// The bound connector's schema
    pub fn schema(&self) -> ConnectorResult<&Schema> {
        self.connector
            .as_deref()
            .map(|c| c.schema())
            .ok_or(ConnectorError::NotBound)
    }

    fn connector(&mut self) -> ConnectorResult<&mut dyn Connector> {
        match self.connector.as_deref_mut() {
            Some(connector) => Ok(connector),
            None => Err(ConnectorError::NotBound),
        }
    }

    pub fn connect(&mut self) -> ConnectorResult<()> {
        self.connector()?.connect()
    }

    pub fn disconnect(&mut self) -> ConnectorResult<()> {
        self.connector()?.disconnect()
    }

    pub fn create_table(&mut self) -> ConnectorResult<()> {
        self.connector()?.create_table()
    }

    pub fn create(&mut self, record: &Record) -> ConnectorResult<Record> {
        self.connector()?.create(record)
    }

    pub fn get_by_id(&mut self, id: &Value) -> ConnectorResult<Option<Record>> {
        self.connector()?.get_by_id(id)
    }

    pub fn list(
        &mut self,
        limit: Option<usize>,
        offset: usize,
        filters: &Filters,
        order_by: Option<&str>,
        order_desc: bool,
    ) -> ConnectorResult<Vec<Record>> {
        self.connector()?.list(limit, offset, filters, order_by, order_desc)
    }

    /// Sugar for [`list`](Self::list) without a limit, preserving filter and
    /// order arguments
    pub fn list_all(
        &mut self,
        filters: &Filters,
        order_by: Option<&str>,
        order_desc: bool,
    ) -> ConnectorResult<Vec<Record>> {
        self.connector()?.list(None, 0, filters, order_by, order_desc)
    }

    pub fn update(&mut self, id: &Value, changes: &Record) -> ConnectorResult<Option<Record>> {
        self.connector()?.update(id, changes)
    }

    pub fn delete(&mut self, id: &Value, hard_delete: bool) -> ConnectorResult<bool> {
        self.connector()?.delete(id, hard_delete)
    }

    pub fn count(&mut self, filters: &Filters) -> ConnectorResult<u64> {
        self.connector()?.count(filters)
    }

    pub fn bulk_insert(&mut self, records: &[Record]) -> ConnectorResult<Vec<Record>> {
        self.connector()?.bulk_insert(records)
    }

    pub fn get_last_k_items(&mut self, k: usize) -> ConnectorResult<Vec<Record>> {
        self.connector()?.get_last_k_items(k)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConnectorConfig;
    use crate::connector::DuckdbConnector;
    use crate::schema::{FieldDef, FieldType};
    use chrono::{TimeZone, Utc};

    fn reading_schema() -> Schema {
        Schema::new(vec![
            FieldDef::nullable("id", FieldType::Int),
            FieldDef::required("device", FieldType::String),
            FieldDef::required("temperature", FieldType::Float),
            FieldDef::required("created_at", FieldType::Timestamp),
        ])
        .unwrap()
    }

    fn bound_store() -> CrudStore {
        let connector =
            DuckdbConnector::new(reading_schema(), ConnectorConfig::new("readings")).unwrap();
        let mut store = CrudStore::new();
        store.bind(Box::new(connector));
        store.connect().unwrap();
        store.create_table().unwrap();
        store
    }

    fn reading(device: &str, temperature: f64) -> Record {
        Record::new()
            .with("device", device)
            .with("temperature", temperature)
            .with("created_at", Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap())
    }

    #[test]
    fn test_unbound_store_raises_not_bound() {
        let mut store = CrudStore::new();
        assert!(!store.is_bound());

        assert!(matches!(store.connect(), Err(ConnectorError::NotBound)));
        assert!(matches!(store.create_table(), Err(ConnectorError::NotBound)));
        assert!(matches!(
            store.create(&Record::new()),
            Err(ConnectorError::NotBound)
        ));
        assert!(matches!(
            store.get_by_id(&Value::Int(1)),
            Err(ConnectorError::NotBound)
        ));
        assert!(matches!(
            store.list(None, 0, &Filters::new(), None, false),
            Err(ConnectorError::NotBound)
        ));
        assert!(matches!(
            store.update(&Value::Int(1), &Record::new()),
            Err(ConnectorError::NotBound)
        ));
        assert!(matches!(
            store.delete(&Value::Int(1), true),
            Err(ConnectorError::NotBound)
        ));
        assert!(matches!(
            store.count(&Filters::new()),
            Err(ConnectorError::NotBound)
        ));
        assert!(matches!(
            store.bulk_insert(&[]),
            Err(ConnectorError::NotBound)
        ));
        assert!(matches!(
            store.get_last_k_items(3),
            Err(ConnectorError::NotBound)
        ));
        assert!(matches!(store.schema(), Err(ConnectorError::NotBound)));
    }

    #[test]
    fn test_delegated_roundtrip() {
        let mut store = bound_store();

        let created = store.create(&reading("sensor-a", 21.5)).unwrap();
        let id = created.get("id").cloned().unwrap();
        let fetched = store.get_by_id(&id).unwrap().unwrap();
        assert_eq!(fetched, created);

        let updated = store
            .update(&id, &Record::new().with("temperature", 23.0))
            .unwrap()
            .unwrap();
        assert_eq!(updated.get("temperature"), Some(&Value::Float(23.0)));

        assert_eq!(store.count(&Filters::new()).unwrap(), 1);
        assert!(store.delete(&id, true).unwrap());
        assert_eq!(store.count(&Filters::new()).unwrap(), 0);
    }

    #[test]
    fn test_list_all_preserves_filters_and_order() {
        let mut store = bound_store();
        for i in 0..150 {
            store.create(&reading("sensor-a", i as f64)).unwrap();
        }
        store.create(&reading("sensor-b", 999.0)).unwrap();

        let filters = Filters::new().eq("device", "sensor-a");
        let all = store
            .list_all(&filters, Some("temperature"), true)
            .unwrap();
        // No implicit limit
        assert_eq!(all.len(), 150);
        assert_eq!(all[0].get("temperature"), Some(&Value::Float(149.0)));
    }

    #[test]
    fn test_schema_accessor() {
        let store = {
            let mut store = CrudStore::new();
            store.bind(Box::new(
                DuckdbConnector::new(reading_schema(), ConnectorConfig::new("readings")).unwrap(),
            ));
            store
        };
        assert!(store.schema().unwrap().contains("device"));
    }
}
