//! Pick list items as a stream of their own.
//!
//! Option labels are not queryable through the entity collections, so every
//! resolved option of every discovered stream is emitted as one
//! `(collection, field, value, label)` row.

use std::sync::Arc;

use serde_json::Value;

use super::{build_descriptor, OptionSetMap, StreamDescriptor};
use crate::error::Result;
use crate::source::{Record, RemoteProperty};

/// Stream id of the pick list stream.
pub const PICK_LISTS_STREAM: &str = "pick_lists";

/// Descriptor of the pick list stream, keyed by collection, field and value.
pub fn pick_list_descriptor() -> Result<StreamDescriptor> {
    build_descriptor(
        PICK_LISTS_STREAM,
        &[
            RemoteProperty::new("collection", "Edm.String", true),
            RemoteProperty::new("field", "Edm.String", true),
            RemoteProperty::new("value", "Edm.Int64", true),
            RemoteProperty::new("label", "Edm.String", false),
        ],
        Arc::new(OptionSetMap::new()),
    )
}

/// One row per option, ordered by collection, field and value.
pub fn pick_list_rows(streams: &[StreamDescriptor]) -> Vec<Record> {
    let mut collections: Vec<&StreamDescriptor> = streams.iter().collect();
    collections.sort_by(|a, b| a.id.cmp(&b.id));

    let mut rows = Vec::new();
    for stream in collections {
        let mut fields: Vec<_> = stream.option_sets.iter().collect();
        fields.sort_by(|a, b| a.0.cmp(b.0));

        for (field, options) in fields {
            for (value, label) in options {
                let mut row = Record::new();
                row.insert("collection".into(), Value::from(stream.id.as_str()));
                row.insert("field".into(), Value::from(field.as_str()));
                row.insert("value".into(), Value::from(*value));
                row.insert("label".into(), Value::from(label.as_str()));
                rows.push(row);
            }
        }
    }
    rows
}
