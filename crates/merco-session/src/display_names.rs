//! Collision-free tab labels.
//!
//! Tabs are labelled by basename. When two or more open tabs share a basename
//! (a *collision group*), each grows its label with parent directory names,
//! closest first, until no other member of the group ends with the same
//! suffix:
//!
//! ```text
//! strategies/alpha/lib.rs   ->  alpha/lib.rs
//! strategies/beta/lib.rs    ->  beta/lib.rs
//! strategies/README.md      ->  README.md
//! ```
//!
//! The result depends only on the set of open paths, never on the order they
//! were opened in.

use std::collections::HashMap;

/// Compute a display name for every path in `paths`.
///
/// Keys of the returned map are the paths as given. Empty segments (leading,
/// trailing or doubled `/`) are ignored when building labels.
pub fn resolve_display_names<'a, I>(paths: I) -> HashMap<String, String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut groups: HashMap<&'a str, Vec<(&'a str, Vec<&'a str>)>> = HashMap::new();
    for full in paths {
        let segments: Vec<&str> = full.split('/').filter(|s| !s.is_empty()).collect();
        let Some(base) = segments.last().copied() else {
            continue;
        };
        let group = groups.entry(base).or_default();
        if !group.iter().any(|(existing, _)| *existing == full) {
            group.push((full, segments));
        }
    }

    let mut names = HashMap::new();
    for (base, group) in groups {
        if let [(full, _)] = group.as_slice() {
            names.insert(full.to_string(), base.to_string());
            continue;
        }
        for (i, (full, segments)) in group.iter().enumerate() {
            let others: Vec<&[&str]> = group
                .iter()
                .enumerate()
                .filter(|(j, _)| *j != i)
                .map(|(_, (_, other))| other.as_slice())
                .collect();
            names.insert(full.to_string(), disambiguate(segments, &others));
        }
    }
    names
}

/// Shortest suffix of `segments` that no path in `others` also ends with.
fn disambiguate(segments: &[&str], others: &[&[&str]]) -> String {
    for len in 1..=segments.len() {
        let ours = suffix(segments, len);
        if !others.iter().any(|other| suffix(other, len) == ours) {
            return ours.join("/");
        }
    }
    // Distinct paths always differ in some suffix; keep the full path.
    segments.join("/")
}

fn suffix<'a, 'b>(segments: &'a [&'b str], len: usize) -> &'a [&'b str] {
    &segments[segments.len().saturating_sub(len)..]
}
