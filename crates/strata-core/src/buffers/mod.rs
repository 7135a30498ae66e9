//! In-process buffers for the focus and fresh tiers.
//!
//! Both are single-writer structures; the engine guards each with its own lock.

mod focus;
mod fresh;

pub use focus::FocusBuffer;
pub use fresh::FreshBuffer;
