//! Stream discovery: remote entity metadata to portable stream descriptors.
//!
//! For every selected collection, [`SchemaDiscoverer`] maps each declared
//! property through [`map_type`], marks primary keys, and adds a derived
//! `<field>_label` string column next to every pick list field. A stream is
//! replicated incrementally when its schema carries the [`MODIFIED_FIELD`]
//! column, and as a full table otherwise.

mod optionset;
mod picklist;

pub use optionset::{FieldOptions, OptionSetCache, OptionSetMap};
pub use picklist::{pick_list_descriptor, pick_list_rows, PICK_LISTS_STREAM};

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use crate::error::{ExtractError, Result};
use crate::source::{EntityMetadataService, RemoteProperty};
use crate::typemap::{map_type, JsonFormat, JsonType};

/// Column holding the last-modified timestamp of a record.
pub const MODIFIED_FIELD: &str = "modifiedon";

/// Suffix of derived pick list label columns.
pub const LABEL_SUFFIX: &str = "_label";

/// Name of the derived label column for a pick list field.
pub fn label_field_name(field: &str) -> String {
    format!("{}{}", field, LABEL_SUFFIX)
}

/// How a stream is extracted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReplicationStrategy {
    /// Unfiltered snapshot on every run.
    #[serde(rename = "FULL_TABLE")]
    Full,
    /// Time-windowed extraction from the stream's bookmark.
    #[serde(rename = "INCREMENTAL")]
    Incremental,
}

impl ReplicationStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReplicationStrategy::Full => "FULL_TABLE",
            ReplicationStrategy::Incremental => "INCREMENTAL",
        }
    }
}

/// One output column. Every column is nullable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSchema {
    pub name: String,
    pub json_type: JsonType,
    pub format: Option<JsonFormat>,
    /// For a derived label column, the raw pick list field it expands.
    pub label_of: Option<String>,
}

impl ColumnSchema {
    pub fn is_derived(&self) -> bool {
        self.label_of.is_some()
    }

    fn to_json(&self) -> Value {
        let mut column = Map::new();
        column.insert(
            "type".to_string(),
            json!(["null", self.json_type.as_str()]),
        );
        if let Some(format) = self.format {
            column.insert("format".to_string(), json!(format.as_str()));
        }
        Value::Object(column)
    }
}

/// Ordered set of output columns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schema {
    columns: Vec<ColumnSchema>,
}

impl Schema {
    pub fn columns(&self) -> &[ColumnSchema] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&ColumnSchema> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    fn push(&mut self, column: ColumnSchema) -> Result<()> {
        if self.contains(&column.name) {
            return Err(ExtractError::Discovery(format!(
                "duplicate column {}",
                column.name
            )));
        }
        self.columns.push(column);
        Ok(())
    }

    /// JSON schema document for the output protocol.
    pub fn to_json(&self) -> Value {
        let properties: Map<String, Value> = self
            .columns
            .iter()
            .map(|c| (c.name.clone(), c.to_json()))
            .collect();
        json!({
            "type": "object",
            "additionalProperties": false,
            "properties": properties,
        })
    }
}

/// Whether a field is always emitted or may be deselected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Inclusion {
    Automatic,
    Available,
}

/// Catalog metadata attached to one field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMetadata {
    pub breadcrumb: Vec<String>,
    pub inclusion: Inclusion,
}

impl FieldMetadata {
    fn property(name: &str, inclusion: Inclusion) -> Self {
        Self {
            breadcrumb: vec!["properties".to_string(), name.to_string()],
            inclusion,
        }
    }
}

/// Immutable description of one discovered stream.
#[derive(Debug, Clone)]
pub struct StreamDescriptor {
    /// Stream id (the entity collection name).
    pub id: String,

    /// Primary-key columns, in declaration order.
    pub key_properties: Vec<String>,

    pub schema: Schema,

    pub replication_strategy: ReplicationStrategy,

    pub metadata: Vec<FieldMetadata>,

    /// Pick list labels used to populate derived columns.
    pub option_sets: Arc<OptionSetMap>,
}

impl StreamDescriptor {
    /// Column that orders incremental extraction, if any.
    pub fn replication_key(&self) -> Option<&str> {
        match self.replication_strategy {
            ReplicationStrategy::Incremental => Some(MODIFIED_FIELD),
            ReplicationStrategy::Full => None,
        }
    }

    /// Catalog entry as emitted by the `discover` command.
    pub fn to_catalog_entry(&self) -> Value {
        let metadata: Vec<Value> = self
            .metadata
            .iter()
            .map(|m| {
                json!({
                    "breadcrumb": m.breadcrumb,
                    "metadata": { "inclusion": m.inclusion },
                })
            })
            .collect();
        json!({
            "tap_stream_id": self.id,
            "stream": self.id,
            "key_properties": self.key_properties,
            "replication_method": self.replication_strategy.as_str(),
            "schema": self.schema.to_json(),
            "metadata": metadata,
        })
    }
}

/// All streams produced by one discovery run.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    pub streams: Vec<StreamDescriptor>,
}

impl Catalog {
    pub fn get(&self, id: &str) -> Option<&StreamDescriptor> {
        self.streams.iter().find(|s| s.id == id)
    }

    pub fn to_json(&self) -> Value {
        let streams: Vec<Value> = self.streams.iter().map(|s| s.to_catalog_entry()).collect();
        json!({ "streams": streams })
    }
}

/// Build a stream descriptor from declared properties and resolved pick lists.
pub fn build_descriptor(
    collection: &str,
    properties: &[RemoteProperty],
    option_sets: Arc<OptionSetMap>,
) -> Result<StreamDescriptor> {
    let raw_names: HashSet<&str> = properties.iter().map(|p| p.name.as_str()).collect();
    let mut schema = Schema::default();
    let mut metadata = Vec::new();
    let mut key_properties = Vec::new();

    for property in properties {
        let (json_type, format) = map_type(&property.edm_type);
        let inclusion = if property.is_primary_key {
            key_properties.push(property.name.clone());
            Inclusion::Automatic
        } else {
            Inclusion::Available
        };
        schema.push(ColumnSchema {
            name: property.name.clone(),
            json_type,
            format,
            label_of: None,
        })?;
        metadata.push(FieldMetadata::property(&property.name, inclusion));

        if option_sets.contains_key(&property.name) {
            let label_name = label_field_name(&property.name);
            if raw_names.contains(label_name.as_str()) {
                return Err(ExtractError::Discovery(format!(
                    "{}: label column {} collides with a declared property",
                    collection, label_name
                )));
            }
            schema.push(ColumnSchema {
                name: label_name.clone(),
                json_type: JsonType::String,
                format: None,
                label_of: Some(property.name.clone()),
            })?;
            metadata.push(FieldMetadata::property(&label_name, Inclusion::Available));
        }
    }

    let replication_strategy = if schema.contains(MODIFIED_FIELD) {
        ReplicationStrategy::Incremental
    } else {
        ReplicationStrategy::Full
    };

    Ok(StreamDescriptor {
        id: collection.to_string(),
        key_properties,
        schema,
        replication_strategy,
        metadata,
        option_sets,
    })
}

/// Discovers stream descriptors for entity collections.
pub struct SchemaDiscoverer<'a> {
    metadata: &'a dyn EntityMetadataService,
    option_sets: &'a mut OptionSetCache,
}

impl<'a> SchemaDiscoverer<'a> {
    /// Create a discoverer that resolves pick lists through `option_sets`.
    pub fn new(
        metadata: &'a dyn EntityMetadataService,
        option_sets: &'a mut OptionSetCache,
    ) -> Self {
        Self {
            metadata,
            option_sets,
        }
    }

    /// Discover every collection accepted by `is_selected`.
    pub async fn discover<F>(&mut self, is_selected: F) -> Result<Catalog>
    where
        F: Fn(&str) -> bool,
    {
        let collections = self.metadata.list_collections().await?;
        info!("Found {} entity collections", collections.len());

        let mut catalog = Catalog::default();
        for collection in collections.iter().filter(|c| is_selected(c.as_str())) {
            if let Some(stream) = self.discover_collection(collection).await? {
                catalog.streams.push(stream);
            }
        }

        info!("Discovered {} streams", catalog.streams.len());
        Ok(catalog)
    }

    /// Discover a single collection.
    ///
    /// Returns `None` for a collection whose logical entity name cannot be
    /// resolved, since its attributes cannot be described.
    pub async fn discover_collection(
        &mut self,
        collection: &str,
    ) -> Result<Option<StreamDescriptor>> {
        let option_sets = self.option_sets.resolve(self.metadata, collection).await?;
        let Some(logical_name) = self.option_sets.logical_name(collection) else {
            warn!("{}: no entity definition, skipping stream", collection);
            return Ok(None);
        };
        let properties = self.metadata.describe_entity(logical_name).await?;
        let descriptor = build_descriptor(collection, &properties, option_sets)?;

        debug!(
            "{}: {} columns, keys {:?}, {}",
            collection,
            descriptor.schema.len(),
            descriptor.key_properties,
            descriptor.replication_strategy.as_str()
        );
        Ok(Some(descriptor))
    }
}

#[cfg(test)]
mod tests {
    use super::optionset::tests::{label, FakeMetadata};
    use super::*;
    use crate::source::PicklistAttribute;
    use std::sync::atomic::Ordering;

    fn account_properties() -> Vec<RemoteProperty> {
        vec![
            RemoteProperty::new("accountid", "Edm.Guid", true),
            RemoteProperty::new("name", "Edm.String", false),
            RemoteProperty::new("industrycode", "Edm.Int32", false),
            RemoteProperty::new("revenue", "Edm.Decimal", false),
            RemoteProperty::new("statuscode", "Edm.Int32", false),
            RemoteProperty::new("modifiedon", "Edm.DateTimeOffset", false),
        ]
    }

    fn fake_service() -> FakeMetadata {
        let mut fake = FakeMetadata::default();
        fake.collections.push((
            "accounts".into(),
            Some("account".into()),
            account_properties(),
        ));
        fake.collections.push((
            "systemforms".into(),
            Some("systemform".into()),
            vec![
                RemoteProperty::new("formid", "Edm.Guid", true),
                RemoteProperty::new("name", "Edm.String", false),
            ],
        ));
        fake.picklists.insert(
            "account".into(),
            Some(vec![
                PicklistAttribute {
                    logical_name: "industrycode".into(),
                    options: vec![label(1, "Accounting")],
                    global_options: Vec::new(),
                },
                PicklistAttribute {
                    logical_name: "statuscode".into(),
                    options: vec![label(1, "Active")],
                    global_options: Vec::new(),
                },
            ]),
        );
        fake
    }

    #[tokio::test]
    async fn test_discover_adds_label_columns() {
        let fake = fake_service();
        let mut cache = OptionSetCache::new();
        let mut discoverer = SchemaDiscoverer::new(&fake, &mut cache);

        let stream = discoverer
            .discover_collection("accounts")
            .await
            .unwrap()
            .unwrap();

        // N raw properties + K pick list labels
        assert_eq!(stream.schema.len(), 6 + 2);
        let names: Vec<&str> = stream.schema.columns().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "accountid",
                "name",
                "industrycode",
                "industrycode_label",
                "revenue",
                "statuscode",
                "statuscode_label",
                "modifiedon",
            ]
        );

        let label_column = stream.schema.column("industrycode_label").unwrap();
        assert_eq!(label_column.json_type, JsonType::String);
        assert_eq!(label_column.label_of.as_deref(), Some("industrycode"));

        let raw = stream.schema.column("industrycode").unwrap();
        assert_eq!(raw.json_type, JsonType::Integer);
        assert!(!raw.is_derived());

        assert_eq!(stream.key_properties, vec!["accountid".to_string()]);
        assert_eq!(stream.replication_strategy, ReplicationStrategy::Incremental);
        assert_eq!(stream.replication_key(), Some(MODIFIED_FIELD));
    }

    #[tokio::test]
    async fn test_stream_without_modified_column_is_full_table() {
        let fake = fake_service();
        let mut cache = OptionSetCache::new();
        let mut discoverer = SchemaDiscoverer::new(&fake, &mut cache);

        let stream = discoverer
            .discover_collection("systemforms")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stream.replication_strategy, ReplicationStrategy::Full);
        assert_eq!(stream.replication_key(), None);
        assert_eq!(stream.schema.len(), 2);
    }

    #[tokio::test]
    async fn test_discover_applies_selection_and_caches() {
        let fake = fake_service();
        let mut cache = OptionSetCache::new();
        {
            let mut discoverer = SchemaDiscoverer::new(&fake, &mut cache);
            let catalog = discoverer.discover(|name| name == "accounts").await.unwrap();
            assert_eq!(catalog.streams.len(), 1);
            assert!(catalog.get("accounts").is_some());

            // Rediscovering within the same cache lifetime does not refetch.
            discoverer.discover_collection("accounts").await.unwrap();
        }
        assert_eq!(fake.lookups.load(Ordering::SeqCst), 1);
        assert_eq!(fake.picklist_fetches.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_collection_without_logical_name_is_skipped() {
        let mut fake = fake_service();
        fake.collections.push(("orphans".into(), None, Vec::new()));
        let mut cache = OptionSetCache::new();
        let mut discoverer = SchemaDiscoverer::new(&fake, &mut cache);

        assert!(discoverer.discover_collection("orphans").await.unwrap().is_none());

        let catalog = discoverer.discover(|_| true).await.unwrap();
        let ids: Vec<&str> = catalog.streams.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["accounts", "systemforms"]);
        // One lookup per collection, shared by pick lists and attributes
        assert_eq!(fake.lookups.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_label_collision_is_rejected() {
        let properties = vec![
            RemoteProperty::new("industrycode", "Edm.Int32", false),
            RemoteProperty::new("industrycode_label", "Edm.String", false),
        ];
        let mut options = OptionSetMap::new();
        options.insert("industrycode".into(), FieldOptions::new());

        let err = build_descriptor("accounts", &properties, Arc::new(options)).unwrap_err();
        assert!(matches!(err, ExtractError::Discovery(_)));
    }

    #[test]
    fn test_keys_are_automatic_and_never_derived() {
        let descriptor = build_descriptor(
            "accounts",
            &account_properties(),
            Arc::new(OptionSetMap::new()),
        )
        .unwrap();

        for key in &descriptor.key_properties {
            let column = descriptor.schema.column(key).unwrap();
            assert!(!column.is_derived());
        }
        let key_metadata = descriptor
            .metadata
            .iter()
            .find(|m| m.breadcrumb[1] == "accountid")
            .unwrap();
        assert_eq!(key_metadata.inclusion, Inclusion::Automatic);
    }

    #[test]
    fn test_catalog_entry_json() {
        let descriptor = build_descriptor(
            "accounts",
            &account_properties(),
            Arc::new(OptionSetMap::new()),
        )
        .unwrap();
        let entry = descriptor.to_catalog_entry();

        assert_eq!(entry["tap_stream_id"], "accounts");
        assert_eq!(entry["replication_method"], "INCREMENTAL");
        assert_eq!(
            entry["schema"]["properties"]["modifiedon"],
            json!({"type": ["null", "string"], "format": "date-time"})
        );
        assert_eq!(
            entry["schema"]["properties"]["revenue"],
            json!({"type": ["null", "number"]})
        );
        assert_eq!(entry["metadata"][0]["metadata"]["inclusion"], "automatic");
    }
}
