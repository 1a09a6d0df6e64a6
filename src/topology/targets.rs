//! Block device target naming
//!
//! Targets are a two-letter bus prefix followed by a suffix enumerated the
//! way Linux names disks: `a`..`z`, then `aa`..`az`, `ba`..`zz`.

use std::collections::BTreeSet;

/// Bus prefixes whose suffixes occupy the shared suffix space
pub const TRACKED_BUS_PREFIXES: [&str; 2] = ["sd", "vd"];

/// Prefix given to newly allocated targets
pub const ALLOCATED_BUS_PREFIX: &str = "vd";

/// Size of the suffix space: 26 single letters plus 26 * 26 pairs
pub const SUFFIX_SPACE: usize = 27 * 26;

const LETTERS: std::ops::RangeInclusive<char> = 'a'..='z';

/// All suffixes in allocation order
pub fn suffix_candidates() -> impl Iterator<Item = String> {
    std::iter::once(None)
        .chain(LETTERS.map(Some))
        .flat_map(|first| {
            LETTERS.map(move |second| match first {
                Some(first) => format!("{}{}", first, second),
                None => second.to_string(),
            })
        })
}

/// Suffix of a tracked target (`vdb` -> `b`, `sdaa` -> `aa`)
pub fn target_suffix(target: &str) -> Option<&str> {
    TRACKED_BUS_PREFIXES
        .iter()
        .find_map(|prefix| target.strip_prefix(prefix))
}

/// Lowest suffix not in `used`, or `None` once all 702 are taken
pub fn next_free_suffix(used: &BTreeSet<String>) -> Option<String> {
    suffix_candidates().find(|candidate| !used.contains(candidate))
}

/// Full target name for a suffix
pub fn target_name(suffix: &str) -> String {
    format!("{}{}", ALLOCATED_BUS_PREFIX, suffix)
}
