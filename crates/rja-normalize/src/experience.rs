//! Experience-level and education detection from title and description text.

use std::sync::LazyLock;

use regex::Regex;
use rja_core::{EducationTier, ExperienceAssessment, ExperienceLevel};

/// Title hits count this many times their weight; body-only hits count once.
const TITLE_MULTIPLIER: f64 = 2.0;

struct Cue {
    pattern: Regex,
    weight: f64,
    /// Words that cancel a hit when they directly follow the match.
    unless_followed_by: &'static [&'static str],
}

impl Cue {
    fn new(pattern: &str, weight: f64) -> Self {
        Self::excluding(pattern, weight, &[])
    }

    fn excluding(pattern: &str, weight: f64, unless_followed_by: &'static [&'static str]) -> Self {
        Self {
            pattern: Regex::new(&format!("(?i){pattern}")).expect("experience cue is valid"),
            weight,
            unless_followed_by,
        }
    }

    /// `text` must already be lowercase.
    fn hits(&self, text: &str) -> bool {
        if self.unless_followed_by.is_empty() {
            return self.pattern.is_match(text);
        }
        self.pattern.find_iter(text).any(|m| {
            let rest = &text[m.end()..];
            !self.unless_followed_by.iter().any(|word| rest.starts_with(word))
        })
    }
}

static ENTRY_CUES: LazyLock<Vec<Cue>> = LazyLock::new(|| {
    vec![
        Cue::new(r"\bentry[\s-]?level\b", 1.0),
        Cue::new(r"\bentry\b", 0.8),
        Cue::new(r"\bjunior\b", 0.9),
        Cue::new(r"\bjr\.?\b", 0.8),
        Cue::new(r"\btrainee\b", 1.0),
        Cue::new(r"\bintern\b", 1.0),
        Cue::new(r"\binternship\b", 1.0),
        Cue::new(r"\bapprentice\b", 1.0),
        Cue::excluding(r"\bassociate\s+", 0.6, &["director", "dean", "professor"]),
        Cue::excluding(
            r"\bassistant\s+",
            0.5,
            &["director", "dean", "professor", "manager", "superintendent"],
        ),
        Cue::new(r"\bno\s+experience\s+(?:required|necessary|needed)\b", 1.0),
        Cue::new(r"\b0[\s-]+(?:to[\s-]+)?[12]\s+years?\b", 0.9),
        Cue::new(r"\blevel\s+[i1]\b", 0.9),
        Cue::new(r"\bgrade\s+[i1]\b", 0.8),
        Cue::new(r"\bI\b(?:\s|$)", 0.6),
        Cue::new(r"\baide\b", 0.7),
        Cue::new(r"\bclerk\b", 0.5),
    ]
});

static MID_CUES: LazyLock<Vec<Cue>> = LazyLock::new(|| {
    vec![
        Cue::new(r"\bmid[\s-]?level\b", 1.0),
        Cue::new(r"\bintermediate\b", 0.9),
        Cue::new(r"\blevel\s+(?:2|ii)\b", 0.9),
        Cue::new(r"\bgrade\s+(?:2|ii)\b", 0.8),
        Cue::new(r"\bII\b", 0.7),
        Cue::new(r"\b[2-4]\s*(?:-|to)\s*[3-6]\s+years?\b", 0.8),
        Cue::new(r"\b(?:2|3|4)\s*\+?\s+years?\s+(?:of\s+)?experience\b", 0.8),
        Cue::new(r"\bexperienced\b", 0.5),
        Cue::new(r"\bspecialist\b", 0.5),
        Cue::new(r"\bcoordinator\b", 0.4),
        Cue::new(r"\banalyst\b", 0.4),
    ]
});

static SENIOR_CUES: LazyLock<Vec<Cue>> = LazyLock::new(|| {
    vec![
        Cue::new(r"\bsenior\b", 1.0),
        Cue::new(r"\bsr\.?\b", 0.9),
        Cue::new(r"\blead\b", 0.8),
        Cue::new(r"\bprincipal\b", 0.9),
        Cue::new(r"\bmanager\b", 0.7),
        Cue::new(r"\bdirector\b", 0.9),
        Cue::new(r"\bsupervisor\b", 0.7),
        Cue::new(r"\bsuperintendent\b", 0.9),
        Cue::new(r"\bexecutive\b", 0.9),
        Cue::new(r"\bchief\b", 1.0),
        Cue::new(r"\bhead\s+of\b", 0.9),
        Cue::new(r"\bvp\b", 1.0),
        Cue::new(r"\bvice\s+president\b", 1.0),
        Cue::new(r"\blevel\s+(?:3|iii|iv|4)\b", 0.9),
        Cue::new(r"\bgrade\s+(?:3|iii|iv|4)\b", 0.8),
        Cue::new(r"\bIII\b", 0.8),
        Cue::new(r"\bIV\b", 0.8),
        Cue::new(r"\b(?:5|6|7|8|9|10)\s*\+?\s+years?\s+(?:of\s+)?experience\b", 0.9),
        Cue::new(r"\b[5-9]\s*(?:-|to)\s*(?:10|\d{2})\s+years?\b", 0.9),
    ]
});

static EDUCATION_CUES: LazyLock<Vec<(Regex, EducationTier)>> = LazyLock::new(|| {
    use EducationTier::*;
    [
        (r"\bhigh\s+school\b", HighSchool),
        (r"\bhs\s+diploma\b", HighSchool),
        (r"\bged\b", HighSchool),
        (r"\bassociate'?s?\s+degree\b", Associate),
        (r"\baa\s+degree\b", Associate),
        (r"\bas\s+degree\b", Associate),
        (r"\b2[\s-]year\s+degree\b", Associate),
        (r"\bbachelor'?s?\b", Bachelor),
        (r"\bb\.?a\.?\b(?:\s+degree)?", Bachelor),
        (r"\bb\.?s\.?\b(?:\s+degree)?", Bachelor),
        (r"\bundergraduate\s+degree\b", Bachelor),
        (r"\b4[\s-]year\s+degree\b", Bachelor),
        (r"\bmaster'?s?\b", Master),
        (r"\bm\.?a\.?\b(?:\s+degree)?", Master),
        (r"\bm\.?s\.?\b(?:\s+degree)?", Master),
        (r"\bmba\b", Master),
        (r"\bgraduate\s+degree\b", Master),
        (r"\bdoctorate\b", Doctorate),
        (r"\bph\.?d\.?\b", Doctorate),
        (r"\bed\.?d\.?\b", Doctorate),
        (r"\bm\.?d\.?\b", Doctorate),
        (r"\bj\.?d\.?\b", Doctorate),
    ]
    .into_iter()
    .map(|(pattern, tier)| {
        let re = Regex::new(&format!("(?i){pattern}")).expect("education cue is valid");
        (re, tier)
    })
    .collect()
});

/// Tried in order; the first that matches supplies the years.
static YEARS_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(\d+)\s*(?:-|to)\s*(\d+)\s+years?",
        r"(\d+)\s*\+\s+years?",
        r"(?:minimum|at\s+least)\s+(\d+)\s+years?",
        r"(\d+)\s+years?\s+(?:of\s+)?(?:experience|exp)",
    ]
    .into_iter()
    .map(|p| Regex::new(&format!("(?i){p}")).expect("years pattern is valid"))
    .collect()
});

fn full_text(title: &str, description: Option<&str>) -> String {
    let mut text = title.to_lowercase();
    if let Some(description) = description {
        text.push(' ');
        text.push_str(&description.to_lowercase());
    }
    text
}

fn score(cues: &[Cue], title: &str, text: &str) -> f64 {
    cues.iter()
        .map(|cue| {
            if cue.hits(title) {
                cue.weight * TITLE_MULTIPLIER
            } else if cue.hits(text) {
                cue.weight
            } else {
                0.0
            }
        })
        .sum()
}

/// Classify a listing as Entry/Mid/Senior with a confidence in `[0, 1]`.
///
/// The highest-scoring bucket wins; on an exact tie the earlier bucket in
/// Entry, Mid, Senior order is kept. When no bucket scores, a stated
/// years-of-experience figure is used as a weaker signal.
pub fn assess_experience(title: &str, description: Option<&str>) -> ExperienceAssessment {
    let title_lower = title.to_lowercase();
    let text = full_text(title, description);

    let buckets = [
        (ExperienceLevel::Entry, score(&ENTRY_CUES, &title_lower, &text)),
        (ExperienceLevel::Mid, score(&MID_CUES, &title_lower, &text)),
        (ExperienceLevel::Senior, score(&SENIOR_CUES, &title_lower, &text)),
    ];
    let (mut level, best) = buckets
        .iter()
        .copied()
        .fold((ExperienceLevel::Unknown, 0.0_f64), |acc, (level, s)| {
            if s > acc.1 {
                (level, s)
            } else {
                acc
            }
        });
    let mut confidence = best.min(1.0);

    let (years_min, years_max) = extract_years(&text);

    if level == ExperienceLevel::Unknown {
        if let Some(min) = years_min {
            (level, confidence) = if years_max.unwrap_or(min) <= 2 {
                (ExperienceLevel::Entry, 0.6)
            } else if min >= 5 {
                (ExperienceLevel::Senior, 0.7)
            } else {
                (ExperienceLevel::Mid, 0.6)
            };
        }
    }

    ExperienceAssessment {
        level,
        confidence,
        years_min,
        years_max,
    }
}

/// Highest education tier mentioned anywhere in the listing.
pub fn detect_education(title: &str, description: Option<&str>) -> Option<EducationTier> {
    let text = full_text(title, description);
    EDUCATION_CUES
        .iter()
        .filter(|(re, _)| re.is_match(&text))
        .map(|(_, tier)| *tier)
        .max()
}

fn extract_years(text: &str) -> (Option<u32>, Option<u32>) {
    for re in YEARS_PATTERNS.iter() {
        if let Some(caps) = re.captures(text) {
            let min = caps.get(1).and_then(|m| m.as_str().parse().ok());
            let max = caps.get(2).and_then(|m| m.as_str().parse().ok());
            return (min, max);
        }
    }
    (None, None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn senior_title_scores_full_confidence() {
        let a = assess_experience("Senior Accountant", None);
        assert_eq!(a.level, ExperienceLevel::Senior);
        assert_eq!(a.confidence, 1.0);
    }

    #[test]
    fn roman_numeral_grades_outrank_generic_words() {
        let a = assess_experience("Office Assistant II", None);
        assert_eq!(a.level, ExperienceLevel::Mid);
    }

    #[test]
    fn excluded_followers_cancel_associate_and_assistant_hits() {
        assert_eq!(score(&ENTRY_CUES, "associate director", "associate director"), 0.0);
        assert_eq!(score(&ENTRY_CUES, "assistant manager", "assistant manager"), 0.0);
        assert_eq!(
            score(&ENTRY_CUES, "associate teacher", "associate teacher"),
            0.6 * TITLE_MULTIPLIER
        );
    }

    #[test]
    fn description_hits_count_once() {
        let a = assess_experience("Dishwasher", Some("Minimum 3 years of experience"));
        assert_eq!(a.level, ExperienceLevel::Mid);
        assert!((a.confidence - 0.8).abs() < 1e-9);
        assert_eq!((a.years_min, a.years_max), (Some(3), None));
    }

    #[test]
    fn years_alone_infer_a_level() {
        let a = assess_experience("Dishwasher", Some("at least 6 years in food service"));
        assert_eq!(a.level, ExperienceLevel::Senior);
        assert!((a.confidence - 0.7).abs() < 1e-9);

        let a = assess_experience("Dishwasher", Some("Requires 1-2 years in a kitchen"));
        assert_eq!(a.level, ExperienceLevel::Entry);
        assert_eq!((a.years_min, a.years_max), (Some(1), Some(2)));
    }

    #[test]
    fn one_or_two_years_alone_is_entry() {
        let a = assess_experience("Dishwasher", Some("Requires 1 year of experience"));
        assert_eq!(a.level, ExperienceLevel::Entry);
        assert_eq!(a.years_min, Some(1));

        let a = assess_experience("Dishwasher", Some("at least 2 years in food service"));
        assert_eq!(a.level, ExperienceLevel::Entry);
        assert_eq!(a.years_min, Some(2));

        let a = assess_experience("Dishwasher", Some("at least 4 years in food service"));
        assert_eq!(a.level, ExperienceLevel::Mid);
    }

    #[test]
    fn nothing_detected_is_unknown() {
        let a = assess_experience("Cook", None);
        assert_eq!(a, ExperienceAssessment::default());
    }

    #[test]
    fn education_picks_the_highest_tier() {
        assert_eq!(
            detect_education("Analyst", Some("Bachelor's degree required; master's preferred")),
            Some(EducationTier::Master)
        );
        assert_eq!(
            detect_education("Cashier", Some("High school diploma or GED")),
            Some(EducationTier::HighSchool)
        );
        assert_eq!(detect_education("Cashier", Some("Friendly attitude")), None);
    }
}
