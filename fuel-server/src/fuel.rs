//! Fuel kind canonicalization.
//!
//! The publisher's fuel column is free text ("Benzina", "Blue Diesel",
//! "Gasolio Premium", ...). Matching is approximate, not exact: the text is
//! searched for a fixed list of substrings in priority order, and anything
//! that matches none of them is kept as normalized text so that it can still
//! be requested verbatim.

/// Canonical kinds, used as keys in merged station records.
pub const BENZINA: &str = "benzina";
pub const GASOLIO: &str = "gasolio";
pub const GPL: &str = "gpl";
pub const METANO: &str = "metano";

/// Substring → canonical kind, evaluated in order. First hit wins.
const SUBSTRING_RULES: &[(&str, &str)] = &[
    ("benzina", BENZINA),
    ("gasolio", GASOLIO),
    ("diesel", GASOLIO),
    ("gpl", GPL),
    ("metano", METANO),
];

/// Whole-name synonyms accepted from users and from the publisher.
const SYNONYMS: &[(&str, &str)] = &[
    ("benzina", BENZINA),
    ("gasoline", BENZINA),
    ("petrol", BENZINA),
    ("gasolio", GASOLIO),
    ("diesel", GASOLIO),
    ("gpl", GPL),
    ("lpg", GPL),
    ("metano", METANO),
    ("cng", METANO),
];

/// Normalize a whole fuel name via the synonym table.
///
/// Unknown names are returned trimmed and lower-cased.
pub fn normalize(name: &str) -> String {
    let lowered = name.trim().to_lowercase();
    SYNONYMS
        .iter()
        .find(|(synonym, _)| *synonym == lowered)
        .map(|(_, canonical)| (*canonical).to_string())
        .unwrap_or(lowered)
}

/// Canonicalize free-text fuel descriptions.
///
/// Tries the substring rules first, then falls back to [`normalize`].
pub fn canonicalize(raw: &str) -> String {
    let lowered = raw.trim().to_lowercase();
    SUBSTRING_RULES
        .iter()
        .find(|(needle, _)| lowered.contains(needle))
        .map(|(_, canonical)| (*canonical).to_string())
        .unwrap_or_else(|| normalize(&lowered))
}
