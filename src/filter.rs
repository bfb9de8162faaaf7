//! Filter expressions for list/count operations
//!
//! A filter is a set of (field, operation) clauses combined with AND.
//! Equality is understood by every backend; the comparison/membership/pattern
//! operators are translated to native predicates by the relational connector
//! only — the embedded and cloud connectors reject them with `NotSupported`.

use crate::schema::Value;

/// One filter operation applied to a single field
#[derive(Debug, Clone, PartialEq)]
pub enum FilterOp {
    /// Exact match (`IS NULL` when the value is `Null`)
    Eq(Value),
    Gt(Value),
    Gte(Value),
    Lt(Value),
    Lte(Value),
    /// Membership in a literal set
    In(Vec<Value>),
    /// Substring match, translated to `LIKE '%…%'`
    Like(String),
}

impl FilterOp {
    /// Whether this operation is plain equality
    pub fn is_equality(&self) -> bool {
        matches!(self, FilterOp::Eq(_))
    }
}

/// An AND-combined set of filter clauses
///
/// Built with chained methods, matching how callers assemble them inline:
///
/// ```
/// use polystore::Filters;
///
/// let filters = Filters::new()
///     .eq("device", "sensor-a")
///     .gte("temperature", 20.0);
/// assert_eq!(filters.clauses().len(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filters {
    clauses: Vec<(String, FilterOp)>,
}

impl Filters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: add an equality clause
    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.clauses.push((field.into(), FilterOp::Eq(value.into())));
        self
    }

    pub fn gt(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.clauses.push((field.into(), FilterOp::Gt(value.into())));
        self
    }

    pub fn gte(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.clauses.push((field.into(), FilterOp::Gte(value.into())));
        self
    }

    pub fn lt(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.clauses.push((field.into(), FilterOp::Lt(value.into())));
        self
    }

    pub fn lte(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.clauses.push((field.into(), FilterOp::Lte(value.into())));
        self
    }

    /// Builder method: add a membership clause
    pub fn is_in(
        mut self,
        field: impl Into<String>,
        values: impl IntoIterator<Item = impl Into<Value>>,
    ) -> Self {
        self.clauses.push((
            field.into(),
            FilterOp::In(values.into_iter().map(Into::into).collect()),
        ));
        self
    }

    /// Builder method: add a substring-match clause
    pub fn like(mut self, field: impl Into<String>, pattern: impl Into<String>) -> Self {
        self.clauses
            .push((field.into(), FilterOp::Like(pattern.into())));
        self
    }

    pub fn push(&mut self, field: impl Into<String>, op: FilterOp) {
        self.clauses.push((field.into(), op));
    }

    pub fn clauses(&self) -> &[(String, FilterOp)] {
        &self.clauses
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// Whether every clause is plain equality
    pub fn equality_only(&self) -> bool {
        self.clauses.iter().all(|(_, op)| op.is_equality())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_collects_clauses() {
        let filters = Filters::new()
            .eq("device", "sensor-a")
            .gt("temperature", 20.0)
            .is_in("id", [1i64, 2, 3])
            .like("name", "abc");

        assert_eq!(filters.clauses().len(), 4);
        assert!(!filters.equality_only());
        assert_eq!(
            filters.clauses()[0],
            ("device".to_string(), FilterOp::Eq(Value::Text("sensor-a".into())))
        );
        match &filters.clauses()[2].1 {
            FilterOp::In(values) => assert_eq!(values.len(), 3),
            other => panic!("unexpected op: {other:?}"),
        }
    }

    #[test]
    fn test_equality_only() {
        let filters = Filters::new().eq("a", 1i64).eq("b", true);
        assert!(filters.equality_only());
        assert!(Filters::new().equality_only());
        assert!(Filters::new().is_empty());
    }
}
