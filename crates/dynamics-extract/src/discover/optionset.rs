//! Pick list label resolution with a per-run cache.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tracing::debug;

use crate::error::Result;
use crate::source::EntityMetadataService;

/// Raw option code to label for one field.
pub type FieldOptions = BTreeMap<i64, String>;

/// Field name to its option labels, for one entity collection.
pub type OptionSetMap = HashMap<String, FieldOptions>;

/// Memoized entity metadata, keyed by collection name.
///
/// Holds the logical entity name and pick list labels of every resolved
/// collection. One cache belongs to one discovery run. It is never global:
/// build a new one (or call [`OptionSetCache::invalidate`]) before the next
/// run.
#[derive(Debug, Default)]
pub struct OptionSetCache {
    entries: HashMap<String, CachedEntity>,
}

#[derive(Debug)]
struct CachedEntity {
    logical_name: Option<String>,
    option_sets: Arc<OptionSetMap>,
}

impl OptionSetCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the option sets of `collection`, fetching them on first use.
    ///
    /// A collection without a reflectable logical name, or whose entity has
    /// no pick list metadata (HTTP 404), resolves to an empty map. Any other
    /// metadata failure is returned as-is and nothing is cached.
    pub async fn resolve(
        &mut self,
        service: &dyn EntityMetadataService,
        collection: &str,
    ) -> Result<Arc<OptionSetMap>> {
        if let Some(cached) = self.entries.get(collection) {
            return Ok(Arc::clone(&cached.option_sets));
        }

        let entity = Self::fetch(service, collection).await?;
        let option_sets = Arc::clone(&entity.option_sets);
        self.entries.insert(collection.to_string(), entity);
        Ok(option_sets)
    }

    /// Logical entity name found while resolving `collection`.
    ///
    /// `None` when the collection is unresolved or has no logical name.
    pub fn logical_name(&self, collection: &str) -> Option<&str> {
        self.entries
            .get(collection)
            .and_then(|e| e.logical_name.as_deref())
    }

    async fn fetch(service: &dyn EntityMetadataService, collection: &str) -> Result<CachedEntity> {
        let mut map = OptionSetMap::new();

        let Some(logical_name) = service.lookup_logical_name(collection).await? else {
            debug!("{}: no logical entity name, skipping pick lists", collection);
            return Ok(CachedEntity {
                logical_name: None,
                option_sets: Arc::new(map),
            });
        };

        if let Some(attributes) = service.fetch_picklist_attributes(&logical_name).await? {
            for attribute in attributes {
                // Global labels win when both sets define a code.
                let options: FieldOptions = attribute
                    .options
                    .into_iter()
                    .chain(attribute.global_options)
                    .map(|o| (o.value, o.label))
                    .collect();
                map.insert(attribute.logical_name, options);
            }
        }

        debug!("{}: resolved {} pick list fields", collection, map.len());
        Ok(CachedEntity {
            logical_name: Some(logical_name),
            option_sets: Arc::new(map),
        })
    }

    /// Whether `collection` has already been resolved.
    pub fn contains(&self, collection: &str) -> bool {
        self.entries.contains_key(collection)
    }

    /// Number of cached collections.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every cached entry.
    pub fn invalidate(&mut self) {
        self.entries.clear();
    }
}
