pub mod classify;
pub mod normalize;

pub use classify::{classify, Action, Classified};
pub use normalize::{normalize, ExtraArg, NormalizeError, NormalizedQuery};
