// Tier 1: Name Standardization
//
// Concept: Bring host, planet and alias names from different catalogs into
// one spelling so that exact comparisons and lookup queries line up.
//
// All functions here are pure string transforms.

use once_cell::sync::Lazy;
use regex::Regex;

static TWO_MASS: Lazy<Regex> = Lazy::new(|| Regex::new(r"^2M[\d ]").expect("valid regex"));
static VHS: Lazy<Regex> = Lazy::new(|| Regex::new(r"^VHS \d").expect("valid regex"));
static GL: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bGl ").expect("valid regex"));
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));
static PLANET_SUFFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(.*\S)\s+([b-z])$").expect("valid regex"));
static KOI_SUFFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(.*\d)(\.0\d)$").expect("valid regex"));
static RESOLVED_PLANET: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(.*[\s\d])([b-j])$").expect("valid regex"));
static RESOLVED_BINARY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(.*?)\s*(\(AB\)|AB|[\s\d][ABCNS])$").expect("valid regex"));
static TIC_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bTIC[\s-]?(\d+)\b").expect("valid regex"));
static PARENTHETICAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"\([^)]*\)").expect("valid regex"));
static KOI_LETTER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\.0\d$").expect("valid regex"));

/// Standardize a star or planet name
///
/// Fixes the spelling differences seen between catalogs: quoting, KOI/TOI
/// prefixes, 2MASS and VHS designations, Gliese abbreviations and the
/// microlensing survey event names.
pub fn standardize_name(name: &str) -> String {
    let mut name = name.replace(['\'', '"'], "");
    name = WHITESPACE.replace_all(name.trim(), " ").into_owned();

    if name.starts_with("K0") {
        name = format!("KOI-{}", name.trim_start_matches('K').trim_start_matches('0'));
    }
    if let Some(rest) = name.strip_prefix("TOI ") {
        name = format!("TOI-{}", rest.trim_start());
    }
    if TWO_MASS.is_match(&name) {
        name = format!("2MASS J{}", name[2..].trim_start())
            .replace("JJ", "J")
            .replace("J ", "J");
    }
    name = name.replace("Gliese ", "GJ ");
    if VHS.is_match(&name) {
        name = name.replace("VHS ", "VHS J");
    }
    name = GL.replace_all(&name, "GJ ").into_owned();
    if name.contains("KMT-") {
        name = name.trim_end_matches('L').replace(':', "-");
        name = name.split('/').next().unwrap_or_default().to_string();
    }
    if name.contains("MOA-") {
        name = name.replace("MOA-", "MOA ").trim_end_matches('L').to_string();
    }
    if name.contains("OGLE-") {
        name = name
            .replace("OGLE--", "OGLE ")
            .replace("OGLE-", "OGLE ")
            .trim_end_matches('L')
            .to_string();
    }
    if name.contains("2MASS") {
        name = name.trim_end_matches([' ', 'a']).to_string();
    }

    name.trim().to_string()
}

/// Split a catalog planet name into host and letter
///
/// `"HD 1 b"` -> `("HD 1", "b")`, `"KOI-12.01"` -> `("KOI-12", ".01")`.
/// Names without a recognizable suffix are returned as host with an empty letter.
pub fn split_planet_name(name: &str) -> (String, String) {
    if let Some(caps) = KOI_SUFFIX.captures(name) {
        return (caps[1].to_string(), caps[2].to_string());
    }
    if let Some(caps) = PLANET_SUFFIX.captures(name) {
        return (caps[1].to_string(), caps[2].to_string());
    }
    (name.to_string(), String::new())
}

/// Planet letters that identify a planet on their own
///
/// Single letters `b`..`z` and `BD` (brown dwarf companion). Empty letters
/// and KOI-style `.01` numbering are not proper letters.
pub fn is_proper_letter(letter: &str) -> bool {
    letter == "BD"
        || (letter.len() == 1 && letter.chars().all(|c| ('b'..='z').contains(&c)))
}

pub fn is_koi_letter(letter: &str) -> bool {
    KOI_LETTER.is_match(letter)
}

/// Identifier of the star when a lookup returned the planet itself
///
/// `"HD 189733 b"` -> `Some("HD 189733")`
pub fn strip_planet_letter(main_id: &str) -> Option<String> {
    RESOLVED_PLANET
        .captures(main_id)
        .map(|caps| caps[1].trim_end().to_string())
}

/// Split a trailing stellar component label off a resolved identifier
///
/// `"Kepler-13 A"` -> `("Kepler-13", "A")`, `"GJ 65 (AB)"` -> `("GJ 65", "AB")`
pub fn strip_binary_suffix(main_id: &str) -> Option<(String, String)> {
    let caps = RESOLVED_BINARY.captures(main_id)?;
    let suffix = &caps[2];
    let (stem, label) = match suffix {
        "(AB)" | "AB" => (caps[1].to_string(), "AB".to_string()),
        other => {
            // Keep a digit that was part of the designation
            let mut chars = other.chars();
            let first = chars.next()?;
            let label: String = chars.collect();
            let stem = if first.is_ascii_digit() {
                format!("{}{}", &caps[1], first)
            } else {
                caps[1].to_string()
            };
            (stem, label)
        }
    };
    let stem = stem.trim_end().to_string();
    if stem.is_empty() {
        None
    } else {
        Some((stem, label))
    }
}

/// TIC number mentioned in a name, if any
pub fn tic_id(name: &str) -> Option<u64> {
    TIC_ID.captures(name).and_then(|caps| caps[1].parse().ok())
}

/// Comparison key for "same star, different spelling"
///
/// Case-folded alphanumerics with parenthetical qualifiers removed, so
/// `"Star A"` and `"Star A (alt)"` share a key.
pub fn name_key(name: &str) -> String {
    PARENTHETICAL
        .replace_all(name, "")
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(|c| c.to_lowercase())
        .collect()
}

/// Split a comma separated alias cell into standardized names
pub fn split_aliases(cell: &str) -> impl Iterator<Item = String> + '_ {
    cell.split(',')
        .map(standardize_name)
        .filter(|a| !a.is_empty() && a != "A" && a != "B")
}
