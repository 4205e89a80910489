//! Ready-made document classes.
//!
//! - [`CaseInsensitive`] keeps a lowercase copy of selected fields in
//!   `_ci_<field>`, for case-insensitive lookups and sorting.
//! - [`FullText`] additionally maintains a `_keywords` list built from the
//!   words of selected fields, and searches it.
//!
//! Both declare indexes for the fields they maintain so that
//! [`Registry::provision_indexes`](crate::Registry::provision_indexes) creates them.

mod case_insensitive;
mod full_text;

pub use case_insensitive::CaseInsensitive;
pub use full_text::{FullText, keywords};
