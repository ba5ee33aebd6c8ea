//! Version compatibility: downgrading payloads for older data planes.
//!
//! The [`ChangeRegistry`] holds the catalog of known changes. The
//! [`CompatProcessor`] applies the ones a data-plane version needs and
//! reports what it touched, and the [`VersionCache`] memoizes the result per
//! version until the payload changes.

mod cache;
mod change;
pub(crate) mod path;
mod predicate;
mod processor;
mod registry;
mod report;
mod version;

pub use cache::*;
pub use change::*;
pub use predicate::*;
pub use processor::*;
pub use registry::*;
pub use report::*;
pub use version::*;

#[cfg(test)]
mod processor_test;
