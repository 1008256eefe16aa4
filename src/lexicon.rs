//! Fixed word lists used by journal analytics

/// Words counted as positive sentiment (whole-token match)
pub const POSITIVE_TERMS: &[&str] = &[
    "calm",
    "better",
    "healthy",
    "strong",
    "confident",
    "excited",
    "happy",
    "peaceful",
    "joy",
    "support",
    "improve",
    "good",
    "satisfied",
    "relaxed",
    "stable",
    "focused",
    "disciplined",
];

/// Words counted as negative sentiment (whole-token match)
pub const NEGATIVE_TERMS: &[&str] = &[
    "anxious",
    "stress",
    "stressed",
    "weak",
    "worried",
    "sick",
    "pain",
    "discomfort",
    "lonely",
    "craving",
    "blocked",
    "sluggish",
    "fear",
    "regret",
    "smoking",
    "ache",
];

/// Words that mark an entry as mentioning other people
pub const PEOPLE_TERMS: &[&str] = &[
    "friend",
    "friends",
    "family",
    "father",
    "mother",
    "mom",
    "dad",
    "girlfriend",
    "boyfriend",
    "parents",
    "sister",
    "brother",
    "flatmates",
    "partner",
    "people",
];

/// Life theme categories in reporting order, with their keywords.
///
/// Keywords match as substrings of normalized text, so `run` also hits
/// `running` (and `brunch`).
pub const THEMES: &[(&str, &[&str])] = &[
    (
        "health",
        &["health", "lungs", "run", "marathon", "sleep", "body", "exercise", "sick"],
    ),
    (
        "discipline",
        &["discipline", "routine", "habit", "control", "consistency", "focus"],
    ),
    (
        "relationships",
        &["friend", "family", "parents", "girlfriend", "relationship", "people"],
    ),
    (
        "identity",
        &["myself", "identity", "confidence", "confident", "person", "becoming"],
    ),
    (
        "growth",
        &["growth", "improve", "learning", "mistake", "change", "progress"],
    ),
    ("nature", &["nature", "trees", "animals", "sunlight", "outdoors"]),
    ("work", &["work", "job", "software", "college", "gsoc", "project"]),
];

pub fn is_positive(token: &str) -> bool {
    POSITIVE_TERMS.contains(&token)
}

pub fn is_negative(token: &str) -> bool {
    NEGATIVE_TERMS.contains(&token)
}

pub fn is_person(token: &str) -> bool {
    PEOPLE_TERMS.contains(&token)
}

/// Themes whose keywords occur in already-normalized text, in table order
pub fn detect_themes(normalized: &str) -> Vec<&'static str> {
    THEMES
        .iter()
        .filter(|(_, keywords)| keywords.iter().any(|k| normalized.contains(*k)))
        .map(|(theme, _)| *theme)
        .collect()
}
