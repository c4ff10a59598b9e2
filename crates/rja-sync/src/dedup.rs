//! Same-run duplicate suppression: exact URL identity first, then an advisory fuzzy
//! pass over title and employer.

use std::collections::{HashMap, HashSet};

use rja_core::{url_key, Candidate};
use strsim::normalized_levenshtein;

#[derive(Debug, Clone, Copy)]
pub struct DedupConfig {
    /// Title similarity at or above which two same-employer candidates collapse.
    pub fuzzy_threshold: f64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            fuzzy_threshold: 0.85,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct DedupOutcome {
    pub survivors: Vec<Candidate>,
    pub url_duplicates: usize,
    pub fuzzy_duplicates: usize,
}

impl DedupOutcome {
    pub fn dropped(&self) -> usize {
        self.url_duplicates + self.fuzzy_duplicates
    }
}

pub struct DedupEngine {
    config: DedupConfig,
}

impl Default for DedupEngine {
    fn default() -> Self {
        Self::new(DedupConfig::default())
    }
}

impl DedupEngine {
    pub fn new(config: DedupConfig) -> Self {
        Self { config }
    }

    pub fn normalize_key_fragment(input: &str) -> String {
        input
            .to_lowercase()
            .chars()
            .map(|c| if c.is_alphanumeric() { c } else { ' ' })
            .collect::<String>()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Corporate suffixes carry no identity ("Safeway Inc." is "Safeway").
    pub fn normalize_employer(input: &str) -> String {
        const SUFFIXES: &[&str] = &["inc", "llc", "corp", "corporation", "company", "co"];
        Self::normalize_key_fragment(input)
            .split(' ')
            .filter(|w| !SUFFIXES.contains(w))
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn title_similarity(a: &str, b: &str) -> f64 {
        let (a, b) = (Self::normalize_key_fragment(a), Self::normalize_key_fragment(b));
        if a == b {
            return 1.0;
        }
        normalized_levenshtein(&a, &b)
    }

    /// First candidate per URL key wins. The fuzzy pass never merges two candidates whose
    /// URL keys are both in `persisted`; when only the later one is persisted it replaces
    /// the earlier survivor so the stored job keeps being refreshed.
    pub fn apply(&self, candidates: Vec<Candidate>, persisted: &HashSet<String>) -> DedupOutcome {
        let mut outcome = DedupOutcome::default();

        let mut seen_urls = HashSet::new();
        let mut by_url = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            if seen_urls.insert(candidate.url_key()) {
                by_url.push(candidate);
            } else {
                outcome.url_duplicates += 1;
            }
        }

        let mut by_employer: HashMap<String, Vec<usize>> = HashMap::new();
        for candidate in by_url {
            let employer = Self::normalize_employer(&candidate.employer);
            let key = url_key(&candidate.url);
            let peers = by_employer.entry(employer).or_default();

            let twin = peers.iter().copied().find(|&i| {
                let kept: &Candidate = &outcome.survivors[i];
                Self::title_similarity(&kept.title, &candidate.title) >= self.config.fuzzy_threshold
                    && !(persisted.contains(&kept.url_key()) && persisted.contains(&key))
            });

            match twin {
                Some(i) => {
                    outcome.fuzzy_duplicates += 1;
                    if persisted.contains(&key) && !persisted.contains(&outcome.survivors[i].url_key()) {
                        outcome.survivors[i] = candidate;
                    }
                }
                None => {
                    peers.push(outcome.survivors.len());
                    outcome.survivors.push(candidate);
                }
            }
        }

        outcome
    }
}
