//! Remote entity metadata and query types.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// One row as returned by the service: field name to JSON value.
pub type Record = serde_json::Map<String, serde_json::Value>;

/// A declared property of an entity collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteProperty {
    /// Property name as it appears in query results.
    pub name: String,

    /// OData Edm type name (e.g. "Edm.Int32").
    pub edm_type: String,

    /// Whether the property is (part of) the primary key.
    pub is_primary_key: bool,
}

impl RemoteProperty {
    /// Create a property descriptor.
    pub fn new(name: impl Into<String>, edm_type: impl Into<String>, is_primary_key: bool) -> Self {
        Self {
            name: name.into(),
            edm_type: edm_type.into(),
            is_primary_key,
        }
    }
}

/// A single code/label pair of an option set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionLabel {
    /// Raw integer code stored on the record.
    pub value: i64,

    /// Human-readable label.
    pub label: String,
}

/// Enumerated-attribute metadata for one pick list field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PicklistAttribute {
    /// Attribute logical name.
    pub logical_name: String,

    /// Options defined locally on the entity.
    pub options: Vec<OptionLabel>,

    /// Options inherited from a global option set.
    pub global_options: Vec<OptionLabel>,
}

/// Comparison operator for a timestamp filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    /// Greater than or equal.
    Ge,
    /// Less than or equal.
    Le,
}

impl FilterOp {
    fn as_odata(&self) -> &'static str {
        match self {
            FilterOp::Ge => "ge",
            FilterOp::Le => "le",
        }
    }
}

/// `field op timestamp` predicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldFilter {
    pub field: String,
    pub op: FilterOp,
    pub value: DateTime<Utc>,
}

/// Query against one entity collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityQuery {
    /// Entity collection (entity set) name.
    pub collection: String,

    /// Conjunction of timestamp predicates.
    pub filters: Vec<FieldFilter>,

    /// Field to sort ascending by.
    pub order_by: Option<String>,
}

impl EntityQuery {
    /// Unfiltered, unordered query over a collection.
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            filters: Vec::new(),
            order_by: None,
        }
    }

    /// Keep rows whose `field` is at or after `value`.
    pub fn filter_ge(mut self, field: &str, value: DateTime<Utc>) -> Self {
        self.filters.push(FieldFilter {
            field: field.to_string(),
            op: FilterOp::Ge,
            value,
        });
        self
    }

    /// Keep rows whose `field` is at or before `value`.
    pub fn filter_le(mut self, field: &str, value: DateTime<Utc>) -> Self {
        self.filters.push(FieldFilter {
            field: field.to_string(),
            op: FilterOp::Le,
            value,
        });
        self
    }

    /// Sort ascending by `field`.
    pub fn order_by_asc(mut self, field: &str) -> Self {
        self.order_by = Some(field.to_string());
        self
    }

    /// OData `$filter` expression, if any filters are set.
    pub fn filter_expression(&self) -> Option<String> {
        if self.filters.is_empty() {
            return None;
        }
        let clauses: Vec<String> = self
            .filters
            .iter()
            .map(|f| {
                format!(
                    "{} {} {}",
                    f.field,
                    f.op.as_odata(),
                    f.value.to_rfc3339_opts(SecondsFormat::Millis, true)
                )
            })
            .collect();
        Some(clauses.join(" and "))
    }

    /// OData `$orderby` expression, if ordering is set.
    pub fn order_expression(&self) -> Option<String> {
        self.order_by.as_ref().map(|f| format!("{} asc", f))
    }
}

/// One page of query results.
#[derive(Debug, Clone, Default)]
pub struct RecordPage {
    /// Rows in service order.
    pub records: Vec<Record>,

    /// Continuation link for the next page, if more rows remain.
    pub next_link: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_unfiltered_query_has_no_expressions() {
        let query = EntityQuery::new("accounts");
        assert_eq!(query.filter_expression(), None);
        assert_eq!(query.order_expression(), None);
    }

    #[test]
    fn test_window_query_expressions() {
        let from = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
        let to = Utc.with_ymd_and_hms(2023, 1, 31, 0, 0, 0).unwrap();
        let query = EntityQuery::new("accounts")
            .filter_ge("modifiedon", from)
            .filter_le("modifiedon", to)
            .order_by_asc("modifiedon");

        assert_eq!(
            query.filter_expression().unwrap(),
            "modifiedon ge 2023-01-01T00:00:00.000Z and modifiedon le 2023-01-31T00:00:00.000Z"
        );
        assert_eq!(query.order_expression().unwrap(), "modifiedon asc");
    }
}
