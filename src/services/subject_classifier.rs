use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::study_plan::{StudySession, Subject};

/// Ordered keyword heuristics; the first match wins.
static SUBJECT_PATTERNS: Lazy<Vec<(Subject, Regex)>> = Lazy::new(|| {
    let table: [(Subject, &str); 9] = [
        (
            Subject::Programming,
            r"(?i)\b(programming|coding|python|javascript|typescript|rust|java|algorithms?|web dev\w*|software|data structures?)\b",
        ),
        (
            Subject::Mathematics,
            r"(?i)\b(math\w*|algebra|calculus|geometry|trigonometry|statistics|probability|arithmetic)\b",
        ),
        (Subject::Physics, r"(?i)\b(physics|mechanics|electricity|optics|thermodynamics)\b"),
        (Subject::Chemistry, r"(?i)\b(chemistry|chemical|organic|molecul\w*)\b"),
        (Subject::Biology, r"(?i)\b(biology|anatomy|genetics|ecology|botany|zoology)\b"),
        (
            Subject::Language,
            r"(?i)\b(english|spanish|french|german|italian|grammar|vocabulary|literature|writing|reading)\b",
        ),
        (Subject::History, r"(?i)\b(history|historical|civilization|geography)\b"),
        (
            Subject::Economics,
            r"(?i)\b(economics?|finance|accounting|business|marketing)\b",
        ),
        (Subject::Arts, r"(?i)\b(art|arts|music|design|drawing|painting)\b"),
    ];

    table
        .into_iter()
        .filter_map(|(subject, pattern)| Regex::new(pattern).ok().map(|re| (subject, re)))
        .collect()
});

pub fn classify(course_title: &str) -> Subject {
    SUBJECT_PATTERNS
        .iter()
        .find(|(_, pattern)| pattern.is_match(course_title))
        .map(|(subject, _)| *subject)
        .unwrap_or(Subject::General)
}

/// Display color key for the calendar UI.
pub fn color_for(subject: Subject) -> &'static str {
    match subject {
        Subject::Mathematics => "blue",
        Subject::Physics => "indigo",
        Subject::Chemistry => "teal",
        Subject::Biology => "green",
        Subject::Programming => "purple",
        Subject::Language => "orange",
        Subject::History => "amber",
        Subject::Economics => "emerald",
        Subject::Arts => "pink",
        Subject::General => "gray",
    }
}

pub fn classify_session(session: &mut StudySession) {
    let subject = classify(&session.course_title);
    session.subject = subject;
    session.color_code = color_for(subject).to_string();
}
