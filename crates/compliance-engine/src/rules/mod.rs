//! Region-keyed rules store
//!
//! The store is built offline (crawl → extract → merge → persist) and is
//! read-only while analyzing. Layout:
//!
//! ```yaml
//! geo:
//!   North America: { ... }
//!   US: { laws: [...], obligations: [...], citations: [...] }
//!   US-CA: { ... }
//! sources:
//!   US-CA: https://...
//! ```

pub mod ingest;
pub mod store;

pub use ingest::{strip_yaml_fences, RulesError};
pub use store::{probe_keys, ApplicableRules, RulesStore};
