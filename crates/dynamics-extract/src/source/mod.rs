//! Remote service capabilities consumed by discovery and sync.
//!
//! - [`EntityMetadataService`]: collection listing, logical-name lookup,
//!   declared schemas and pick list metadata
//! - [`QueryService`]: paged row retrieval
//!
//! The OData client in [`crate::client`] implements both; tests substitute
//! in-memory fakes.

mod types;

pub use types::*;

use async_trait::async_trait;

use crate::error::Result;

/// Entity metadata lookups.
#[async_trait]
pub trait EntityMetadataService: Send + Sync {
    /// List the names of all queryable entity collections.
    async fn list_collections(&self) -> Result<Vec<String>>;

    /// Declared properties of a logical entity, in declaration order.
    async fn describe_entity(&self, logical_name: &str) -> Result<Vec<RemoteProperty>>;

    /// Resolve a collection name to its logical entity name.
    ///
    /// Returns `None` when the metadata lookup yields no rows.
    async fn lookup_logical_name(&self, collection: &str) -> Result<Option<String>>;

    /// Enumerated-attribute metadata for a logical entity.
    ///
    /// Returns `None` when the service answers "not found".
    async fn fetch_picklist_attributes(
        &self,
        logical_name: &str,
    ) -> Result<Option<Vec<PicklistAttribute>>>;
}

/// Paged row retrieval.
#[async_trait]
pub trait QueryService: Send + Sync {
    /// Fetch one page of `query`.
    ///
    /// `next_link` is `None` for the first page and the continuation link
    /// returned by the previous page otherwise. A response above the
    /// service's size ceiling fails with
    /// [`ExtractError::OversizedResponse`](crate::error::ExtractError::OversizedResponse).
    async fn fetch_page(&self, query: &EntityQuery, next_link: Option<&str>)
        -> Result<RecordPage>;
}
