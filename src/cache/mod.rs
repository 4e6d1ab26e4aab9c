pub mod key;
pub mod result;
pub mod rows;

pub use key::Fingerprint;
pub use result::{CacheConfig, CacheStats, ResultCache};
pub use rows::{Replay, RowSnapshot};
