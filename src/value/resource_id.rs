//! PingOne resource identifiers.

use std::sync::LazyLock;

use regex::Regex;

use crate::diag::Diagnostics;

use super::Path;

/// Anchored pattern every PingOne resource identifier must match.
pub const RESOURCE_ID_PATTERN: &str =
    r"^[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}$";

#[allow(clippy::expect_used)]
static RESOURCE_ID_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(RESOURCE_ID_PATTERN).expect("resource id pattern is valid"));

/// Returns true if `s` is a well-formed resource identifier.
#[must_use]
pub fn is_resource_id(s: &str) -> bool {
    RESOURCE_ID_REGEX.is_match(s)
}

/// Appends an error diagnostic at `path` if `s` is not a resource identifier.
pub fn validate_resource_id(path: &Path, s: &str, diags: &mut Diagnostics) {
    if !is_resource_id(s) {
        diags.error(
            path.clone(),
            "PingOne Resource ID Type Validation Error",
            format!("The PingOne resource ID is malformed. Must match regex {RESOURCE_ID_PATTERN:?}"),
        );
    }
}
