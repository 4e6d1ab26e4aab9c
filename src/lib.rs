//! Remora: Transparent Result Caching for Database Drivers
//!
//! A caching shim that sits between an application and a relational
//! database driver. Incoming statements are normalized and matched against
//! a precomputed cache plan; cacheable SELECTs are memoized per
//! bound-argument fingerprint, and writes trigger targeted invalidation so
//! reads stay consistent with the committed state.
//!
//! # Features
//!
//! - **Plan-Driven Classification**: every known query carries a structured
//!   body describing its table, conditions and targets
//! - **Single-Flight Loading**: concurrent misses for one key share a
//!   single backend query
//! - **Targeted Invalidation**: unique-keyed writes forget one fingerprint;
//!   everything else purges only the caches that could be affected
//! - **IN Fanout**: `col IN (…)` queries are served as per-element point
//!   lookups against the companion equality cache
//! - **TTL Expiration**: entries expire after a configurable time to live
//!   and idle timeout
//! - **Defensive Purge**: writes the plan does not know clear every cache,
//!   so unplanned writes can never produce stale reads
//!
//! # Example
//!
//! ```no_run
//! use remora::cache::CacheConfig;
//! use remora::plan::{CachePlan, Schema};
//! use remora::registry::Registry;
//! use std::sync::Arc;
//!
//! let plan = CachePlan::from_path("remora.yaml").unwrap();
//! let schema = Schema::from_path("schema.sql").unwrap();
//! let registry = Arc::new(Registry::new(plan, schema, CacheConfig::from_env()).unwrap());
//!
//! // wrap a driver connection; the application talks to `conn` as usual
//! // let conn = remora::driver::CachingConnection::new(inner, registry.clone());
//!
//! println!("{}", remora::metrics::render_report(&registry));
//! ```

pub mod cache;
pub mod data;
pub mod driver;
pub mod invalidate;
pub mod metrics;
pub mod plan;
pub mod query;
pub mod registry;

// Re-export commonly used types
pub use cache::{CacheConfig, CacheStats, Fingerprint, ResultCache, RowSnapshot};
pub use data::Cell;
pub use driver::{CachingConnection, CachingStatement, CancelToken, DriverError};
pub use plan::{CachePlan, PlanError, Schema, SchemaError};
pub use registry::Registry;
