//! OpenConfig path decoding.
//!
//! Paths look like `/interfaces/interface[name='xe-0/0/0']/state/counters/`.
//! A segment may carry a bracketed key predicate, and predicate values may
//! themselves contain `/`, so segments are split on `/` only at bracket
//! depth zero.

/// One decoded path segment: the segment name plus the verbatim bracket
/// content (possibly empty).
///
/// Equality and ordering compare the raw predicate text. Two predicates
/// with the same keys written in a different literal order are therefore
/// distinct identifiers; devices emit predicates in a stable order, so in
/// practice this never splits a series.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Identifier {
    pub name: String,
    pub labels: String,
}

impl Identifier {
    pub fn new(name: impl Into<String>, labels: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            labels: labels.into(),
        }
    }
}

/// Decode a raw path into its ordered segment identifiers.
///
/// Decoding is total: malformed input never fails. An unterminated bracket
/// swallows the rest of the segment into the labels string, and an empty
/// path decodes to an empty sequence.
pub fn decode(path: &str) -> Vec<Identifier> {
    let mut trimmed = path;
    if let Some(rest) = trimmed.strip_prefix('/') {
        trimmed = rest;
    }
    if let Some(rest) = trimmed.strip_suffix('/') {
        trimmed = rest;
    }

    let mut ids = Vec::with_capacity(trimmed.bytes().filter(|b| *b == b'/').count() + 1);
    let mut depth = 0usize;
    let mut start = 0usize;

    for (i, c) in trimmed.char_indices() {
        match c {
            '[' => depth += 1,
            ']' => depth = depth.saturating_sub(1),
            '/' if depth == 0 => {
                ids.push(decode_segment(&trimmed[start..i]));
                start = i + 1;
            }
            _ => {}
        }
    }

    if start < trimmed.len() {
        ids.push(decode_segment(&trimmed[start..]));
    }

    ids
}

/// Split one segment into name and raw predicate.
fn decode_segment(segment: &str) -> Identifier {
    let mut name = String::new();
    let mut labels = String::new();
    let mut current = String::new();
    let mut in_brackets = false;

    for c in segment.chars() {
        if !in_brackets {
            if c == '[' {
                in_brackets = true;
            } else {
                name.push(c);
            }
            continue;
        }

        if c == ']' {
            labels = std::mem::take(&mut current);
            in_brackets = false;
        } else {
            current.push(c);
        }
    }

    // Unterminated bracket: keep whatever accumulated.
    if in_brackets && !current.is_empty() {
        labels = current;
    }

    Identifier { name, labels }
}
