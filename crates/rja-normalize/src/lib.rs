//! Pure normalization of adapter candidates: category, location, salary, experience.
//!
//! Nothing here performs I/O or returns errors. Fields that cannot be derived with
//! confidence come back as `None`/unknown so one malformed field never blocks a record.

pub mod category;
pub mod experience;
pub mod location;
pub mod salary;

use rja_core::{Candidate, NormalizedJob};

pub use category::{categorize, classify};
pub use experience::{assess_experience, detect_education};
pub use location::normalize_location;
pub use salary::parse_salary;

pub const CRATE_NAME: &str = "rja-normalize";

/// Run every normalizer over one candidate.
pub fn normalize(candidate: Candidate) -> NormalizedJob {
    let description = candidate.description.as_deref();
    let category = categorize(
        &candidate.title,
        description,
        candidate.raw_category.as_deref(),
        &candidate.employer,
    );
    let classification = classify(&candidate.title, category).map(str::to_string);
    let location = normalize_location(candidate.raw_location.as_deref());
    let salary = parse_salary(candidate.salary_text.as_deref());
    let experience = assess_experience(&candidate.title, description);
    let education = detect_education(&candidate.title, description);

    NormalizedJob {
        url_key: candidate.url_key(),
        category: category.to_string(),
        classification,
        location,
        salary,
        experience,
        education,
        candidate,
    }
}
