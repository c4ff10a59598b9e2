//! Inline structural screen applied to every candidate before it can be persisted.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use rja_core::Candidate;

/// Phrases scrapers pick up from page chrome rather than postings. Multi-word phrases
/// match anywhere in the title; single words only as whole words.
const TITLE_DENYLIST: &[&str] = &[
    "skip to content",
    "skip to main",
    "skip navigation",
    "javascript",
    "click here",
    "read more",
    "learn more",
    "view details",
    "apply now",
    "loading",
    "please wait",
    "menu",
    "navigation",
    "login",
    "sign in",
    "cookie",
    "accept",
    "decline",
    "close",
    "back to top",
    "indeed",
    "days ago",
];

const URL_DENYLIST: &[&str] = &[
    "#content",
    "#main",
    "#skip",
    "/benefits/",
    "/about/",
    "/contact/",
    "/login/",
    "/signin/",
    "/faq/",
    "/privacy/",
    "/terms/",
    "/cookie/",
    "javascript:",
    "mailto:",
    "tel:",
];

/// Collapsing whitespace may shrink a title by this much before it counts as mangled.
const WHITESPACE_SLACK: usize = 5;

static TITLE_WORDS: LazyLock<Regex> = LazyLock::new(|| {
    let words = TITLE_DENYLIST
        .iter()
        .filter(|p| !p.contains(' '))
        .map(|w| regex::escape(w))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!(r"(?i)\b(?:{words})\b")).expect("title word denylist")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    EmptyTitle,
    MultilineTitle,
    ShortTitle,
    NoAlphabetic,
    MissingUrl,
    MissingEmployer,
    UnsupportedUrl,
    BoilerplateTitle(&'static str),
    BoilerplateUrl(&'static str),
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyTitle => f.write_str("empty title"),
            Self::MultilineTitle => f.write_str("title spans multiple lines"),
            Self::ShortTitle => f.write_str("title shorter than 3 characters"),
            Self::NoAlphabetic => f.write_str("title has no letters"),
            Self::MissingUrl => f.write_str("missing url"),
            Self::MissingEmployer => f.write_str("missing employer"),
            Self::UnsupportedUrl => f.write_str("url is not http(s)"),
            Self::BoilerplateTitle(p) => write!(f, "title matches boilerplate {p:?}"),
            Self::BoilerplateUrl(p) => write!(f, "url matches boilerplate {p:?}"),
        }
    }
}

/// Accept or reject one candidate. Pure; the caller decides what to log.
pub fn screen(candidate: &Candidate) -> Result<(), Rejection> {
    if candidate.title.contains('\n') || candidate.title.contains('\r') {
        return Err(Rejection::MultilineTitle);
    }
    let raw = candidate.title.trim();
    if raw.is_empty() {
        return Err(Rejection::EmptyTitle);
    }
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    if raw.len() - collapsed.len() > WHITESPACE_SLACK {
        return Err(Rejection::MultilineTitle);
    }
    if collapsed.chars().filter(|c| c.is_alphanumeric()).count() < 3 {
        return Err(Rejection::ShortTitle);
    }
    if !collapsed.chars().any(char::is_alphabetic) {
        return Err(Rejection::NoAlphabetic);
    }

    let url = candidate.url.trim();
    if url.is_empty() {
        return Err(Rejection::MissingUrl);
    }
    if candidate.employer.trim().is_empty() {
        return Err(Rejection::MissingEmployer);
    }

    let lower_title = collapsed.to_lowercase();
    if let Some(phrase) = TITLE_DENYLIST
        .iter()
        .copied()
        .find(|p| p.contains(' ') && lower_title.contains(p))
    {
        return Err(Rejection::BoilerplateTitle(phrase));
    }
    if let Some(m) = TITLE_WORDS.find(&lower_title) {
        let word = TITLE_DENYLIST
            .iter()
            .copied()
            .find(|w| *w == m.as_str())
            .unwrap_or("denylisted word");
        return Err(Rejection::BoilerplateTitle(word));
    }

    let lower_url = url.to_lowercase();
    if let Some(pattern) = URL_DENYLIST.iter().copied().find(|p| lower_url.contains(p)) {
        return Err(Rejection::BoilerplateUrl(pattern));
    }
    if !(lower_url.starts_with("http://") || lower_url.starts_with("https://")) {
        return Err(Rejection::UnsupportedUrl);
    }

    Ok(())
}
