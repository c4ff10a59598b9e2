//! Category assignment and category-scoped sub-classification.
//!
//! Tiers run in order and the first hit wins: known employer names, institutional
//! employer patterns, title/description keywords, the source's own category label.

use std::sync::LazyLock;

use regex::Regex;
use rja_core::{OTHER_CATEGORY, STANDARD_CATEGORIES};

/// Employer name to category. Looked up exactly, then by substring in either direction,
/// in this order.
const EMPLOYER_CATEGORIES: &[(&str, &str)] = &[
    ("County of Humboldt", "Government"),
    ("City of Eureka", "Government"),
    ("City of Arcata", "Government"),
    ("City of Fortuna", "Government"),
    ("City of Rio Dell", "Government"),
    ("City of Blue Lake", "Government"),
    ("City of Ferndale", "Government"),
    ("City of Trinidad", "Government"),
    ("Wiyot Tribe", "Government"),
    ("Cal Poly Humboldt", "Education"),
    ("College of the Redwoods", "Education"),
    ("Open Door Community Health", "Healthcare"),
    ("Providence St. Joseph Hospital", "Healthcare"),
    ("Providence Redwood Memorial", "Healthcare"),
    ("Providence", "Healthcare"),
    ("Mad River Community Hospital", "Healthcare"),
    ("United Indian Health Services", "Healthcare"),
    ("K'ima:w Medical Center", "Healthcare"),
    ("Hospice of Humboldt", "Healthcare"),
    ("Humboldt Senior Resource Center", "Healthcare"),
    ("Redwood Community Action Agency", "Healthcare"),
    ("SoHum Health", "Healthcare"),
    ("Redwoods Rural Health Center", "Healthcare"),
    ("Yurok Tribe", "Tribal Organizations"),
    ("Two Feathers NAFS", "Tribal Organizations"),
    ("Two Feathers", "Tribal Organizations"),
    ("Food for People", "Nonprofit & Social Services"),
    ("Boys & Girls Club of the Redwoods", "Nonprofit & Social Services"),
    ("Changing Tides Family Services", "Nonprofit & Social Services"),
    ("Arcata House Partnership", "Nonprofit & Social Services"),
    ("RCAA", "Nonprofit & Social Services"),
    ("North Coast Co-op", "Local Retail"),
    ("Eureka Natural Foods", "Local Retail"),
    ("Murphy's Markets", "Local Retail"),
    ("Pierson Building Center", "Local Retail"),
    ("C. Crane Company", "Local Retail"),
    ("Walmart", "National Retail"),
    ("Costco", "National Retail"),
    ("Safeway", "National Retail"),
    ("Albertsons", "National Retail"),
    ("Dollar General", "National Retail"),
    ("Walgreens", "National Retail"),
    ("TJ Maxx", "National Retail"),
    ("CVS Health", "National Retail"),
    ("CVS", "National Retail"),
    ("Rite Aid", "National Retail"),
    ("Ace Hardware", "National Retail"),
    ("WinCo Foods", "National Retail"),
    ("Grocery Outlet", "National Retail"),
    ("Harbor Freight Tools", "National Retail"),
    ("Harbor Freight", "National Retail"),
    ("Humboldt Creamery", "Food & Agriculture"),
    ("Crystal Creamery", "Food & Agriculture"),
    ("Cypress Grove Chevre", "Food & Agriculture"),
    ("Cypress Grove", "Food & Agriculture"),
    ("Alexandre Family Farm", "Food & Agriculture"),
    ("Driscoll's", "Food & Agriculture"),
    ("Driscolls", "Food & Agriculture"),
    ("Pacific Seafood", "Food & Agriculture"),
    ("Pacific Choice Seafood", "Food & Agriculture"),
    ("Lost Coast Brewery", "Food & Beverage"),
    ("Starbucks", "Food & Beverage"),
    ("Humboldt Sawmill", "Timber & Forestry"),
    ("Humboldt Redwood Company", "Timber & Forestry"),
    ("Green Diamond Resource Company", "Timber & Forestry"),
    ("Green Diamond", "Timber & Forestry"),
    ("Sierra Pacific Industries", "Timber & Forestry"),
    ("Jones Family Tree Service", "Timber & Forestry"),
    ("Jones Tree", "Timber & Forestry"),
    ("Kokatat", "Manufacturing"),
    ("Danco Group", "Construction & Engineering"),
    ("LACO Associates", "Construction & Engineering"),
    ("Redwood Coast Energy Authority", "Energy & Utilities"),
    ("RCEA", "Energy & Utilities"),
    ("Pacific Gas & Electric", "Energy & Utilities"),
    ("PG&E", "Energy & Utilities"),
    ("FedEx", "Transportation & Logistics"),
    ("UPS", "Transportation & Logistics"),
    ("Coast Central Credit Union", "Financial Services"),
    ("Compass Community Credit Union", "Financial Services"),
    ("Columbia Bank", "Financial Services"),
    ("Redwood Capital Bank", "Financial Services"),
    ("Tri Counties Bank", "Financial Services"),
    ("Blue Lake Casino", "Hospitality & Entertainment"),
    ("Blue Lake Casino & Hotel", "Hospitality & Entertainment"),
    ("Bear River Casino", "Hospitality & Entertainment"),
    ("Bear River Casino Resort", "Hospitality & Entertainment"),
];

/// Institutional employers that cannot be enumerated by name (school districts, cities).
const EMPLOYER_PATTERNS: &[(&str, &[&str])] = &[
    (
        "Education",
        &[
            "school",
            "district",
            "unified",
            "elementary",
            "high school",
            "college",
            "university",
            "hcoe",
            "county office of education",
        ],
    ),
    ("Government", &["city of", "county of", "tribe", "tribal"]),
];

const KEYWORD_TERMS: &[(&str, &[&str])] = &[
    (
        "Healthcare",
        &[
            "nurse",
            "nursing",
            "medical",
            "health",
            "clinical",
            "therapist",
            "physician",
            "doctor",
            "pharmacy",
            "pharmacist",
            "dental",
            "mental health",
            "counselor",
            "psychologist",
            "social worker",
            "behavioral",
            "patient",
            "healthcare",
            "rn",
            "lpn",
            "cna",
        ],
    ),
    (
        "Food & Beverage",
        &["barista", "bartender", "line cook", "dishwasher", "server", "brewer"],
    ),
    (
        "Transportation & Logistics",
        &["truck driver", "delivery driver", "cdl", "courier", "dispatcher"],
    ),
    (
        "Construction & Engineering",
        &["carpenter", "electrician", "plumber", "civil engineer", "laborer"],
    ),
];

static KEYWORD_MATCHERS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    KEYWORD_TERMS
        .iter()
        .map(|(category, terms)| {
            let alternation = terms
                .iter()
                .map(|t| regex::escape(t))
                .collect::<Vec<_>>()
                .join("|");
            let re = Regex::new(&format!(r"(?i)\b(?:{alternation})"))
                .expect("category keyword pattern is valid");
            (*category, re)
        })
        .collect()
});

/// Assign one category from the fixed taxonomy. Never fails; unmatched input is "Other".
pub fn categorize(
    title: &str,
    description: Option<&str>,
    raw_category: Option<&str>,
    employer: &str,
) -> &'static str {
    if let Some(category) = employer_category(employer) {
        return category;
    }

    let texts = std::iter::once(title).chain(description);
    for text in texts {
        if let Some((category, _)) = KEYWORD_MATCHERS.iter().find(|(_, re)| re.is_match(text)) {
            return *category;
        }
    }

    if let Some(raw) = raw_category {
        let raw = raw.to_lowercase();
        if let Some(category) = STANDARD_CATEGORIES
            .iter()
            .find(|c| raw.contains(&c.to_lowercase()))
        {
            return *category;
        }
    }

    OTHER_CATEGORY
}

/// Employer-driven tiers only; `None` means the employer name says nothing.
pub fn employer_category(employer: &str) -> Option<&'static str> {
    let employer = employer.trim();
    if employer.is_empty() {
        return None;
    }

    if let Some((_, category)) = EMPLOYER_CATEGORIES.iter().find(|(name, _)| *name == employer) {
        return Some(*category);
    }

    let lower = employer.to_lowercase();
    let by_name = EMPLOYER_CATEGORIES.iter().find(|(name, _)| {
        let known = name.to_lowercase();
        lower.contains(&known) || known.contains(&lower)
    });
    if let Some((_, category)) = by_name {
        return Some(*category);
    }

    EMPLOYER_PATTERNS
        .iter()
        .find(|(_, patterns)| patterns.iter().any(|p| lower.contains(p)))
        .map(|(category, _)| *category)
}

/// Sub-classes checked before the rest, because their terms overlap more generic ones
/// ("Instructional Student Assistant" would otherwise read as Teaching).
const PRIORITY_CLASSES: [&str; 3] = ["Student Employment", "Administration", "Management"];

type ClassRules = &'static [(&'static str, &'static [&'static str])];

const CLASSIFICATION_RULES: &[(&str, ClassRules)] = &[
    (
        "Education",
        &[
            (
                "Teaching",
                &[
                    "teacher", "instructor", "professor", "faculty", "lecturer", "teaching", "tutor",
                    "coach", "substitute", "certificated", "english", "math", "science", "history",
                    "art", "music", "pe ", "special education", "sped", "credential",
                ],
            ),
            (
                "Support Staff",
                &[
                    "custodian", "janitor", "cook", "food service", "bus driver", "driver", "aide",
                    "paraprofessional", "para ", "secretary", "clerk", "office", "receptionist",
                    "attendance", "maintenance", "groundskeeper", "custodial", "cafeteria",
                    "nutrition", "transportation", "classified",
                ],
            ),
            (
                "Administration",
                &[
                    "principal", "superintendent", "director", "coordinator", "administrator",
                    "manager", "dean", "vice principal", "assistant superintendent", "cabinet",
                    "executive", "chief",
                ],
            ),
            (
                "Student Employment",
                &[
                    "student assistant", "instructional student assistant", "teaching associate",
                    "graduate assistant", "student worker", "work-study", "work study",
                    "student aide", "student tutor",
                ],
            ),
        ],
    ),
    (
        "Healthcare",
        &[
            (
                "Clinical",
                &[
                    "nurse", "rn", "lpn", "cna", "physician", "doctor", "md", "therapist",
                    "clinical", "medical assistant", "ma ", "phlebotomist", "lab", "radiology",
                    "x-ray", "technician", "dental", "dentist", "hygienist", "pharmacist",
                    "pharmacy", "patient care", "caregiver", "behavioral health", "counselor",
                    "psychologist", "psychiatrist", "social worker", "lcsw", "mft",
                ],
            ),
            (
                "Administrative",
                &[
                    "billing", "coder", "medical records", "registration", "receptionist",
                    "front desk", "scheduler", "authorization", "insurance", "revenue",
                    "collections", "hr ", "human resources", "payroll", "accounting", "finance",
                    "administrative",
                ],
            ),
            (
                "Support",
                &[
                    "housekeeper", "environmental", "food service", "dietary", "maintenance",
                    "facilities", "security", "transport", "warehouse", "supply", "it ",
                    "information technology",
                ],
            ),
        ],
    ),
    (
        "Government",
        &[
            (
                "Public Safety",
                &[
                    "police", "officer", "sheriff", "deputy", "fire", "firefighter", "emt",
                    "paramedic", "dispatcher", "911", "corrections", "probation", "animal control",
                    "code enforcement",
                ],
            ),
            (
                "Administrative",
                &[
                    "clerk", "secretary", "administrative", "assistant", "receptionist", "office",
                    "coordinator", "specialist", "analyst", "accountant", "hr ", "human resources",
                ],
            ),
            (
                "Technical",
                &[
                    "engineer", "planner", "surveyor", "gis", "it ", "programmer", "developer",
                    "technician", "inspector", "environmental",
                ],
            ),
            (
                "Maintenance",
                &[
                    "maintenance", "mechanic", "equipment", "operator", "groundskeeper",
                    "custodian", "facilities", "utility",
                ],
            ),
        ],
    ),
    (
        "National Retail",
        &[
            (
                "Store Operations",
                &[
                    "cashier", "sales", "associate", "team member", "customer service", "stocker",
                    "merchandiser", "retail", "floor", "department",
                ],
            ),
            (
                "Management",
                &[
                    "manager", "supervisor", "lead", "assistant manager", "team lead", "shift lead",
                    "department manager", "store manager",
                ],
            ),
            (
                "Warehouse",
                &[
                    "warehouse", "forklift", "shipping", "receiving", "inventory", "loader",
                    "unloader", "distribution", "logistics",
                ],
            ),
        ],
    ),
    (
        "Local Retail",
        &[
            (
                "Store Operations",
                &[
                    "cashier", "sales", "associate", "team member", "customer service", "stocker",
                    "merchandiser", "retail", "floor", "department", "deli", "bakery", "produce",
                    "meat", "grocery",
                ],
            ),
            (
                "Management",
                &["manager", "supervisor", "lead", "assistant manager", "team lead"],
            ),
        ],
    ),
];

/// Sub-classify a title within its category. Categories without rules yield `None`.
pub fn classify(title: &str, category: &str) -> Option<&'static str> {
    let (_, rules) = CLASSIFICATION_RULES.iter().find(|(c, _)| *c == category)?;
    let title = title.to_lowercase();
    let hits = |terms: &[&str]| terms.iter().any(|t| title.contains(t));

    for wanted in PRIORITY_CLASSES {
        if let Some((class, _)) = rules.iter().find(|(c, terms)| *c == wanted && hits(terms)) {
            return Some(*class);
        }
    }

    rules
        .iter()
        .filter(|(class, _)| !PRIORITY_CLASSES.contains(class))
        .find(|(_, terms)| hits(terms))
        .map(|(class, _)| *class)
}

/// Sub-classes available under `category`, in display order.
pub fn subclasses(category: &str) -> Vec<&'static str> {
    CLASSIFICATION_RULES
        .iter()
        .find(|(c, _)| *c == category)
        .map(|(_, rules)| rules.iter().map(|(class, _)| *class).collect())
        .unwrap_or_default()
}
