//! Version reconciliation across heterogeneous runner versions.
//!
//! The gateway reports the lowest version any runner is running, as a
//! conservative capability floor. Comparison is numeric per component,
//! never lexical ("1.10.0" is newer than "1.2.0").

/// Leniently parse a version string into integer components.
///
/// Strips a leading `v` and anything from the first `-` (pre-release
/// suffix), then splits on `.`. Returns `None` when any component is not
/// an integer.
#[must_use]
pub fn parse_components(version: &str) -> Option<Vec<u64>> {
    let trimmed = version.trim();
    let trimmed = trimmed.strip_prefix('v').unwrap_or(trimmed);
    let trimmed = trimmed.split('-').next().unwrap_or(trimmed);
    if trimmed.is_empty() {
        return None;
    }

    let mut components = Vec::new();
    for part in trimmed.split('.') {
        components.push(part.parse().ok()?);
    }
    Some(components)
}

/// Pick the lowest version by component-wise comparison, returning the
/// original string form. Unparseable entries are skipped.
#[must_use]
pub fn lowest<'a, I>(versions: I) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    versions
        .into_iter()
        .filter_map(|version| parse_components(version).map(|components| (components, version)))
        .min_by(|a, b| a.0.cmp(&b.0))
        .map(|(_, version)| version)
}
