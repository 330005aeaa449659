//! Dapp Sources - External Collaborators for the Dapp Directory
//!
//! Async clients for the three upstreams the sync passes talk to:
//!
//! - [`RecordStore`]: the curated, read-write record store
//! - [`DirectoryProvider`]: the paginated third-party dapp directory
//! - [`AnalyticsProvider`]: the DeFi analytics provider
//!
//! Each trait has a reqwest-backed implementation and an in-memory one in
//! [`mock`] for tests and dry runs.

pub mod analytics;
pub mod directory;
mod http;
pub mod mock;
pub mod store;
pub mod traits;

pub use analytics::HttpAnalytics;
pub use directory::HttpDirectory;
pub use http::DEFAULT_TIMEOUT;
pub use mock::{InMemoryRecordStore, StaticAnalytics, StaticDirectory, StoreCall};
pub use store::{HttpRecordStore, DEFAULT_STORE_PAGE_SIZE};
pub use traits::*;
