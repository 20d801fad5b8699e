//! # dynamics-extract
//!
//! Incremental extraction library for the Dynamics 365 Web API.
//!
//! This library discovers entity collections, turns their metadata into
//! portable stream schemas and emits their rows as schema-tagged records
//! with resumable bookmarks:
//!
//! - **Schema discovery** with derived `_label` columns for pick list fields
//! - **Windowed incremental reads** ordered by `modifiedon`, bisecting any
//!   window whose response exceeds the service's size ceiling
//! - **Full-table reads** for collections without a modification timestamp
//! - **Resume capability** via JSON state files
//! - **Type mapping** between OData Edm types and JSON schema types
//!
//! ## Example
//!
//! ```rust,no_run
//! use dynamics_extract::{Config, Extractor, JsonLinesSink};
//!
//! #[tokio::main]
//! async fn main() -> dynamics_extract::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let mut extractor = Extractor::new(config)
//!         .await?
//!         .with_state_file("state.json".into())
//!         .resume()?;
//!     let mut sink = JsonLinesSink::new(std::io::stdout());
//!     let result = extractor.sync(&mut sink).await?;
//!     eprintln!("Extracted {} records", result.records_emitted);
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod client;
pub mod config;
pub mod discover;
pub mod error;
pub mod fetch;
pub mod orchestrator;
pub mod output;
pub mod source;
pub mod state;
pub mod sync;
pub mod typemap;

// Re-exports for convenient access
pub use auth::{Authenticator, OAuthAuthenticator, StaticTokenAuthenticator};
pub use client::ODataClient;
pub use config::{Config, StreamFilter, SyncConfig};
pub use discover::{Catalog, OptionSetCache, SchemaDiscoverer, StreamDescriptor, PICK_LISTS_STREAM};
pub use error::{ExtractError, Result};
pub use fetch::{TableScan, Window, WindowedFetcher};
pub use orchestrator::{ExtractionResult, Extractor};
pub use output::{JsonLinesSink, MemorySink, Message, RecordSink};
pub use source::{EntityMetadataService, QueryService, Record};
pub use state::{BookmarkState, BookmarkStore, FileStateSink, MemoryStateSink, StateSink};
pub use sync::{StreamStatus, SyncEngine, SyncOptions, SyncSummary};
pub use typemap::{map_type, JsonFormat, JsonType};
