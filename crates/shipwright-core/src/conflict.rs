//! Version-conflict checker.
//!
//! Pure decision function over an already-fetched tag set. The network
//! listing lives in [`crate::host`]; keeping the decision separate makes it
//! testable without a host.

use std::collections::BTreeSet;

use crate::error::{ReleaseError, Result};
use crate::manifest::Version;

/// Return `version` unchanged unless `"v" + version` is in `existing_tags`.
pub fn check_version_conflict(
    version: Version,
    existing_tags: &BTreeSet<String>,
) -> Result<Version> {
    let tag = version.tag();
    if existing_tags.contains(&tag) {
        return Err(ReleaseError::VersionConflict {
            tag,
            version: version.to_string(),
        });
    }
    Ok(version)
}
