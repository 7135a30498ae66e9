//! Signal extraction: scoring drafts along the routing dimensions.

mod extractor;
pub mod lexical;

pub use extractor::SignalExtractor;
