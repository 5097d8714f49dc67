//! Built-in format plugins
//!
//! - **maven**: group/artifact/version path layout, JSON index documents
//! - **raw**: permissive fallback for opaque blobs

mod maven;
mod raw;

pub use maven::MavenFormat;
pub use raw::RawFormat;

use semver::Version;

/// Order version strings: semver first, lexicographic fallback
pub(crate) fn compare_versions(a: &str, b: &str) -> std::cmp::Ordering {
    let va = Version::parse(a).ok();
    let vb = Version::parse(b).ok();
    match (va, vb) {
        (Some(va), Some(vb)) => va.cmp(&vb),
        (Some(_), None) => std::cmp::Ordering::Greater,
        (None, Some(_)) => std::cmp::Ordering::Less,
        (None, None) => a.cmp(b),
    }
}
