//! Free-text location to "City, CA" normalization.

use std::sync::LazyLock;

use regex::Regex;

pub const COUNTY_FALLBACK: &str = "Humboldt County, CA";

/// Known cities in lookup order.
const CITIES: &[(&str, &str)] = &[
    ("eureka", "Eureka, CA"),
    ("arcata", "Arcata, CA"),
    ("fortuna", "Fortuna, CA"),
    ("mckinleyville", "McKinleyville, CA"),
    ("blue lake", "Blue Lake, CA"),
    ("ferndale", "Ferndale, CA"),
    ("rio dell", "Rio Dell, CA"),
    ("trinidad", "Trinidad, CA"),
    ("hoopa", "Hoopa, CA"),
    ("willow creek", "Willow Creek, CA"),
    ("garberville", "Garberville, CA"),
    ("redway", "Redway, CA"),
    ("miranda", "Miranda, CA"),
    ("scotia", "Scotia, CA"),
    ("loleta", "Loleta, CA"),
    ("fields landing", "Fields Landing, CA"),
    ("samoa", "Samoa, CA"),
    ("manila", "Manila, CA"),
    ("cutten", "Cutten, CA"),
    ("myrtletown", "Myrtletown, CA"),
    ("kneeland", "Kneeland, CA"),
    ("bridgeville", "Bridgeville, CA"),
    ("petrolia", "Petrolia, CA"),
    ("orleans", "Orleans, CA"),
    ("weitchpec", "Weitchpec, CA"),
    ("orick", "Orick, CA"),
    ("klamath", "Klamath, CA"),
    ("crescent city", "Crescent City, CA"),
    ("smith river", "Smith River, CA"),
];

/// Matched exactly or as a leading word.
const ALIASES: &[(&str, &str)] = &[
    ("mck", "McKinleyville, CA"),
    ("mckinleyville", "McKinleyville, CA"),
    ("mc kinleyville", "McKinleyville, CA"),
    ("e-ville", "Eureka, CA"),
    ("main office", "Eureka, CA"),
    ("humboldt", COUNTY_FALLBACK),
    ("all areas", COUNTY_FALLBACK),
    ("various", COUNTY_FALLBACK),
    ("multiple", COUNTY_FALLBACK),
    ("county-wide", COUNTY_FALLBACK),
];

static ZIP_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+\d{5}(?:-\d{4})?$").expect("zip pattern is valid"));

static COUNTRY_SUFFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i),?\s*\b(?:US|USA|United States)$").expect("country pattern is valid")
});

static CITY_COUNTY_STATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^([A-Za-z\s]+),\s*Humboldt\s+County,?\s*(?:CA|California)?")
        .expect("city/county pattern is valid")
});

static SITE_CITY_STATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^.+[-–—]\s*([A-Za-z\s]+),\s*(?:CA|California)\s*\d*")
        .expect("site/city pattern is valid")
});

static CITY_STATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^([A-Za-z\s]+),?\s*(?:California|CA)$").expect("city/state pattern is valid")
});

static BARE_CITY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z]+(?:\s+[A-Za-z]+)?$").expect("bare city pattern is valid"));

/// Map a raw location to "City, CA", or the county-wide fallback when nothing fits.
pub fn normalize_location(raw: Option<&str>) -> String {
    let Some(raw) = raw.map(str::trim).filter(|r| !r.is_empty()) else {
        return COUNTY_FALLBACK.to_string();
    };

    let without_zip = ZIP_SUFFIX.replace(raw, "");
    let stripped = COUNTRY_SUFFIX.replace(&without_zip, "");
    let location = stripped.trim_matches(|c: char| c == ' ' || c == ',');
    let lower = location.to_lowercase();

    if let Some((_, normalized)) = ALIASES.iter().find(|(alias, _)| {
        lower == *alias || lower.strip_prefix(alias).is_some_and(|rest| rest.starts_with(' '))
    }) {
        return normalized.to_string();
    }

    if let Some(caps) = CITY_COUNTY_STATE.captures(location) {
        let city = caps[1].trim();
        if let Some(known) = fuzzy_known_city(city) {
            return known.to_string();
        }
        if city.len() > 2 {
            return city_state(city);
        }
    }

    if let Some(caps) = SITE_CITY_STATE.captures(location) {
        let city = caps[1].trim();
        if let Some(known) = fuzzy_known_city(city) {
            return known.to_string();
        }
        if city.len() > 2 {
            return city_state(city);
        }
    }

    if let Some((_, normalized)) = CITIES.iter().find(|(city, _)| lower.contains(city)) {
        return normalized.to_string();
    }

    if let Some(caps) = CITY_STATE.captures(location) {
        return city_state(caps[1].trim());
    }

    if BARE_CITY.is_match(location) {
        return city_state(location);
    }

    COUNTY_FALLBACK.to_string()
}

/// Known city whose key contains, or is contained in, `name`.
fn fuzzy_known_city(name: &str) -> Option<&'static str> {
    let key = name.to_lowercase();
    if key.is_empty() {
        return None;
    }
    CITIES
        .iter()
        .find(|(city, _)| key.contains(city) || city.contains(key.as_str()))
        .map(|(_, normalized)| *normalized)
}

fn city_state(city: &str) -> String {
    let key = city.to_lowercase();
    if let Some((_, normalized)) = CITIES.iter().find(|(c, _)| *c == key) {
        return normalized.to_string();
    }
    format!("{}, CA", title_case(city))
}

fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_alpha = false;
    for c in s.chars() {
        if prev_alpha {
            out.extend(c.to_lowercase());
        } else {
            out.extend(c.to_uppercase());
        }
        prev_alpha = c.is_alphabetic();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn norm(s: &str) -> String {
        normalize_location(Some(s))
    }

    #[test]
    fn empty_input_falls_back_to_county() {
        assert_eq!(normalize_location(None), COUNTY_FALLBACK);
        assert_eq!(norm("   "), COUNTY_FALLBACK);
        assert_eq!(norm("12 Main St #4"), COUNTY_FALLBACK);
    }

    #[test]
    fn aliases_match_exactly_or_as_leading_word() {
        assert_eq!(norm("MCK"), "McKinleyville, CA");
        assert_eq!(norm("Main Office - Eureka, CA 95503"), "Eureka, CA");
        assert_eq!(norm("Various"), COUNTY_FALLBACK);
        assert_eq!(norm("Humboldt County, CA"), COUNTY_FALLBACK);
    }

    #[test]
    fn structured_patterns_extract_the_city() {
        assert_eq!(norm("Arcata, Humboldt County, CA"), "Arcata, CA");
        assert_eq!(norm("Main Campus - Arcata, CA 95521"), "Arcata, CA");
        assert_eq!(norm("Redding, CA 96001"), "Redding, CA");
        assert_eq!(norm("eureka, california"), "Eureka, CA");
    }

    #[test]
    fn zip_and_country_suffixes_are_ignored() {
        assert_eq!(norm("Crescent City, CA, USA"), "Crescent City, CA");
        assert_eq!(norm("Columbus"), "Columbus, CA");
    }

    #[test]
    fn known_city_substring_wins_over_bare_words() {
        assert_eq!(norm("ECHC Eureka Community Health Center"), "Eureka, CA");
        assert_eq!(norm("rio dell"), "Rio Dell, CA");
        assert_eq!(norm("mckinleyville, ca"), "McKinleyville, CA");
    }

    #[test]
    fn bare_words_are_title_cased() {
        assert_eq!(norm("sacramento"), "Sacramento, CA");
        assert_eq!(norm("SAN JOSE"), "San Jose, CA");
    }
}
