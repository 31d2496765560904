//! County name normalization
//!
//! One canonical form is used everywhere a county name is compared: when
//! artifacts are named at training time and when requests are looked up.
//! Matching stays case-sensitive.

/// Canonical county name: trimmed, underscores read as spaces, runs of
/// whitespace collapsed to a single space
pub fn canonical_county(name: &str) -> String {
    name.replace('_', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// File-name stem used for a county's artifact, e.g. `Santa_Clara`
pub fn artifact_stem(name: &str) -> String {
    canonical_county(name).replace(',', "").replace(' ', "_")
}
