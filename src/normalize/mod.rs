mod gazetteer;

pub use gazetteer::Gazetteer;

use crate::models::{PropertyType, Source, TransactionType};

/// Strip every non-digit and parse the rest. `0` means "no usable price".
pub fn parse_price(text: &str) -> i64 {
    let digits: String = text.chars().filter(|c| c.is_ascii_digit()).collect();
    digits.parse().unwrap_or(0)
}

/// First `<digits> m` occurrence, e.g. "120 m²" or "85m2". `0` when absent.
pub fn parse_surface(text: &str) -> i64 {
    let chars: Vec<char> = text.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        if !chars[i].is_ascii_digit() {
            i += 1;
            continue;
        }
        let start = i;
        while i < chars.len() && chars[i].is_ascii_digit() {
            i += 1;
        }
        let end = i;
        let mut j = end;
        while j < chars.len() && chars[j].is_whitespace() {
            j += 1;
        }
        if j < chars.len() && chars[j].eq_ignore_ascii_case(&'m') {
            let digits: String = chars[start..end].iter().collect();
            return digits.parse().unwrap_or(0);
        }
    }

    0
}

/// Best-effort neighborhood for a free-text location.
///
/// Gazetteer hit first, then the text before the first comma once the city
/// name is removed, then the gazetteer's fallback name.
pub fn infer_neighborhood(gazetteer: &Gazetteer, location: &str, city: &str) -> String {
    if let Some(name) = gazetteer.lookup(location) {
        return name.to_string();
    }

    let stripped = if city.trim().is_empty() {
        location.to_string()
    } else {
        remove_ci(location, city.trim())
    };
    let head = stripped
        .split(',')
        .next()
        .unwrap_or("")
        .trim_matches(|c: char| c.is_whitespace() || c == '-' || c == '|' || c == '·');

    if head.is_empty() {
        gazetteer.fallback().to_string()
    } else {
        head.to_string()
    }
}

const PROPERTY_KEYWORDS: &[(&str, PropertyType)] = &[
    ("riad", PropertyType::Riad),
    ("dar", PropertyType::Dar),
    ("maison", PropertyType::Dar),
    ("appartement", PropertyType::Apartment),
    ("appart", PropertyType::Apartment),
    ("villa", PropertyType::Villa),
    ("terrain", PropertyType::Terrain),
    ("commerce", PropertyType::Commerce),
    ("bureau", PropertyType::Commerce),
    ("local", PropertyType::Commerce),
    ("locaux", PropertyType::Commerce),
    ("magasin", PropertyType::Commerce),
];

/// Keyword classification of a title; the first keyword in declaration order wins.
///
/// Keywords match the start of a word, so "appartements" counts but "calendar"
/// does not count as "dar".
pub fn classify_property_type(title: &str) -> PropertyType {
    let lower = title.to_lowercase();
    let words: Vec<&str> = lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();

    PROPERTY_KEYWORDS
        .iter()
        .find(|(keyword, _)| words.iter().any(|w| w.starts_with(keyword)))
        .map(|(_, kind)| *kind)
        .unwrap_or(PropertyType::Other)
}

const RENT_MARKERS: &[&str] = &["louer", "location", "/mois", "mensuel"];

pub fn classify_transaction_type(title: &str, price_text: &str) -> TransactionType {
    let haystack = format!("{} {}", title, price_text).to_lowercase();
    if RENT_MARKERS.iter().any(|m| haystack.contains(m)) {
        TransactionType::Rent
    } else {
        TransactionType::Sale
    }
}

/// Stable listing id: `<source>_<base36 hash of identifier>`.
///
/// The identifier should be the source-native id when one is known, else the
/// canonical URL. See [`listing_identifier`].
pub fn derive_id(source: Source, identifier: &str) -> String {
    // 31-based rolling hash over UTF-16 units, wrapped to i32
    let mut hash: i32 = 0;
    for unit in identifier.encode_utf16() {
        hash = hash.wrapping_mul(31).wrapping_add(unit as i32);
    }
    format!("{}_{}", source.as_str(), to_base36(hash.unsigned_abs()))
}

fn to_base36(mut n: u32) -> String {
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}

/// Numeric id embedded in a listing URL: the last run of at least five digits
/// in the path. Query string and fragment are ignored.
pub fn source_native_id(url: &str) -> Option<String> {
    let canonical = canonical_url(url);
    let without_scheme = canonical.split("://").nth(1).unwrap_or(canonical.as_str());
    let path = without_scheme.split_once('/').map(|(_, p)| p).unwrap_or("");

    path.split(|c: char| !c.is_ascii_digit())
        .filter(|run| run.len() >= 5)
        .last()
        .map(str::to_string)
}

/// Lowercased scheme and host, no query, no fragment, no trailing slash.
pub fn canonical_url(url: &str) -> String {
    let url = url.trim();
    let url = url.split('#').next().unwrap_or(url);
    let url = url.split('?').next().unwrap_or(url);
    let url = url.trim_end_matches('/');

    match url.split_once("://") {
        Some((scheme, rest)) => {
            let (host, path) = rest.split_once('/').unwrap_or((rest, ""));
            let host = host.to_lowercase();
            let host = host.strip_prefix("www.").unwrap_or(&host);
            if path.is_empty() {
                format!("{}://{}", scheme.to_lowercase(), host)
            } else {
                format!("{}://{}/{}", scheme.to_lowercase(), host, path)
            }
        }
        None => url.to_string(),
    }
}

/// What to feed [`derive_id`] for a listing URL
pub fn listing_identifier(url: &str) -> String {
    source_native_id(url).unwrap_or_else(|| canonical_url(url))
}

/// Resolve a possibly relative href against a site root
pub fn absolute_url(base: &str, href: &str) -> String {
    let href = href.trim();
    if href.starts_with("http://") || href.starts_with("https://") {
        href.to_string()
    } else if let Some(rest) = href.strip_prefix("//") {
        format!("https://{}", rest)
    } else if href.starts_with('/') {
        format!("{}{}", base.trim_end_matches('/'), href)
    } else {
        format!("{}/{}", base.trim_end_matches('/'), href)
    }
}

/// Number written just before one of `keywords`, e.g. "3 chambres" -> 3
pub fn parse_count(text: &str, keywords: &[&str]) -> Option<u32> {
    let lower = text.to_lowercase();
    let words: Vec<&str> = lower.split_whitespace().collect();

    words.iter().enumerate().skip(1).find_map(|(i, word)| {
        if !keywords.iter().any(|k| word.starts_with(k)) {
            return None;
        }
        let prev = words[i - 1].trim_matches(|c: char| !c.is_ascii_digit());
        prev.parse().ok()
    })
}

/// Boolean amenities spotted in free text
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Amenities {
    pub pool: bool,
    pub garage: bool,
    pub terrace: bool,
}

pub fn detect_amenities(text: &str) -> Amenities {
    let lower = text.to_lowercase();
    Amenities {
        pool: lower.contains("piscine") || lower.contains("pool"),
        garage: lower.contains("garage") || lower.contains("parking"),
        terrace: lower.contains("terrasse") || lower.contains("rooftop"),
    }
}

/// Collapse runs of whitespace (including &nbsp;) into single spaces
pub fn clean_text(text: &str) -> String {
    text.replace('\u{a0}', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Case-insensitive equality that also folds accented letters ("Salé" == "SALÉ")
pub fn same_city(a: &str, b: &str) -> bool {
    a.trim().to_lowercase() == b.trim().to_lowercase()
}

fn remove_ci(haystack: &str, needle: &str) -> String {
    let lower = haystack.to_lowercase();
    let needle_lower = needle.to_lowercase();
    if lower.len() != haystack.len() || needle_lower.is_empty() {
        // Lowercasing changed byte offsets; fall back to an exact removal
        return haystack.replace(needle, "");
    }

    let mut out = String::with_capacity(haystack.len());
    let mut rest = 0;
    for (start, _) in lower.match_indices(&needle_lower) {
        if start < rest {
            continue;
        }
        out.push_str(&haystack[rest..start]);
        rest = start + needle_lower.len();
    }
    out.push_str(&haystack[rest..]);
    out
}
