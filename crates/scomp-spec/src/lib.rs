//! Spec tree model for scomp.
//!
//! A [`Spec`] is a deferred, data-only description of how to build or supply
//! a value: a literal, a keyed or ordered container of specs, a construction
//! request naming a target factory, an already-built instance, or a
//! reference to another path in the same tree.

mod error;
mod merge;
mod path;
mod spec;
mod value;

pub use error::SpecError;
pub use merge::{deep_merge, merge_all, merge_documents};
pub use path::ConfigPath;
pub use spec::{Instance, Spec, SpecMap, SpecRef, TargetSpec};
pub use value::{REF_PATTERN, TARGET_KEY};
