//! Course catalog and the course-detection heuristic.
//!
//! Detection sums weighted keyword signals per course, caps the sum at 1.0
//! and accepts the best course only at or above `ACCEPT_THRESHOLD`.

use serde::{Deserialize, Serialize};

pub const ACCEPT_THRESHOLD: f64 = 0.3;

const CODE_WEIGHT: f64 = 0.6;
const NAME_WEIGHT: f64 = 0.5;
const TITLE_KEYWORD_WEIGHT: f64 = 0.4;
const DESCRIPTION_KEYWORD_WEIGHT: f64 = 0.2;
const FUZZY_KEYWORD_WEIGHT: f64 = 0.15;
const FUZZY_SIMILARITY: f64 = 0.8;
const FUZZY_MIN_LEN: usize = 4;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Course {
    pub id: String,
    pub name: String,
    pub code: String,
    #[serde(default)]
    pub keywords: Vec<String>,
}

impl Course {
    fn new(id: &str, name: &str, code: &str, keywords: &[&str]) -> Self {
        Course {
            id: id.to_string(),
            name: name.to_string(),
            code: code.to_string(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
        }
    }
}

/// Built-in catalog used when settings.json does not define one.
pub fn default_catalog() -> Vec<Course> {
    vec![
        Course::new(
            "cs",
            "Computer Science",
            "CS101",
            &[
                "programming", "code", "coding", "algorithm", "algorithms", "python", "java",
                "javascript", "software", "database", "compiler", "debugging", "recursion",
            ],
        ),
        Course::new(
            "math",
            "Mathematics",
            "MATH201",
            &[
                "calculus", "algebra", "equation", "equations", "integral", "derivative", "matrix",
                "theorem", "proof", "statistics", "probability", "geometry",
            ],
        ),
        Course::new(
            "physics",
            "Physics",
            "PHYS101",
            &[
                "physics", "mechanics", "velocity", "force", "quantum", "momentum", "kinematics",
                "optics", "thermodynamics", "circuit",
            ],
        ),
        Course::new(
            "chemistry",
            "Chemistry",
            "CHEM101",
            &[
                "chemistry", "molecule", "reaction", "organic", "titration", "compound", "periodic",
                "stoichiometry",
            ],
        ),
        Course::new(
            "biology",
            "Biology",
            "BIO101",
            &[
                "biology", "cell", "cells", "genetics", "dna", "evolution", "ecology", "organism",
                "enzyme", "anatomy",
            ],
        ),
        Course::new(
            "english",
            "English",
            "ENG102",
            &[
                "essay", "literature", "novel", "poem", "poetry", "reading", "grammar",
                "shakespeare", "thesis",
            ],
        ),
        Course::new(
            "history",
            "History",
            "HIST110",
            &[
                "history", "war", "revolution", "empire", "historical", "century", "civilization",
                "ancient", "treaty",
            ],
        ),
    ]
}

/// Resolve free text ("math", "MATH201", "Mathematics") to a catalog entry.
pub fn find_course<'a>(catalog: &'a [Course], text: &str) -> Option<&'a Course> {
    let needle = text.trim();
    catalog.iter().find(|c| {
        c.id.eq_ignore_ascii_case(needle)
            || c.code.eq_ignore_ascii_case(needle)
            || c.name.eq_ignore_ascii_case(needle)
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct CourseMatch {
    pub course_id: String,
    pub course_name: String,
    pub confidence: f64,
}

pub fn detect_course(title: &str, description: Option<&str>, catalog: &[Course]) -> Option<CourseMatch> {
    let title_lower = title.to_lowercase();
    let desc_lower = description.unwrap_or_default().to_lowercase();
    let title_words = words(&title_lower);
    let desc_words = words(&desc_lower);
    let full_text = format!("{title_lower} {desc_lower}");
    let compact_text: String = full_text.chars().filter(|c| !c.is_whitespace()).collect();

    let mut best: Option<CourseMatch> = None;
    for course in catalog {
        let confidence = score_course(course, &full_text, &compact_text, &title_words, &desc_words);
        if confidence < ACCEPT_THRESHOLD {
            continue;
        }
        if best.as_ref().map_or(true, |b| confidence > b.confidence) {
            best = Some(CourseMatch {
                course_id: course.id.clone(),
                course_name: course.name.clone(),
                confidence,
            });
        }
    }
    best
}

fn score_course(
    course: &Course,
    full_text: &str,
    compact_text: &str,
    title_words: &[&str],
    desc_words: &[&str],
) -> f64 {
    let mut score = 0.0;

    let code = course.code.to_lowercase();
    if !code.is_empty() && compact_text.contains(&code) {
        score += CODE_WEIGHT;
    }
    let name = course.name.to_lowercase();
    if !name.is_empty() && contains_phrase(full_text, &name) {
        score += NAME_WEIGHT;
    }

    for keyword in &course.keywords {
        let keyword = keyword.to_lowercase();
        if title_words.contains(&keyword.as_str()) {
            score += TITLE_KEYWORD_WEIGHT;
        } else if desc_words.contains(&keyword.as_str()) {
            score += DESCRIPTION_KEYWORD_WEIGHT;
        } else if keyword.len() >= FUZZY_MIN_LEN
            && title_words
                .iter()
                .chain(desc_words)
                .any(|w| w.len() >= FUZZY_MIN_LEN && similarity(w, &keyword) >= FUZZY_SIMILARITY)
        {
            score += FUZZY_KEYWORD_WEIGHT;
        }
    }

    score.min(1.0)
}

fn words(text: &str) -> Vec<&str> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect()
}

// Phrase match on word boundaries, so "art" does not hit "party".
fn contains_phrase(text: &str, phrase: &str) -> bool {
    let text_words = words(text);
    let phrase_words = words(phrase);
    if phrase_words.is_empty() {
        return false;
    }
    text_words
        .windows(phrase_words.len())
        .any(|w| w == phrase_words.as_slice())
}

/// Normalized Levenshtein similarity in `0.0..=1.0`.
pub fn similarity(a: &str, b: &str) -> f64 {
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 1.0;
    }
    1.0 - levenshtein(a, b) as f64 / max_len as f64
}

pub fn levenshtein(a: &str, b: &str) -> usize {
    let b_chars: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b_chars.len()).collect();
    let mut curr = vec![0; b_chars.len() + 1];

    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b_chars.iter().enumerate() {
            let cost = usize::from(ca != *cb);
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b_chars.len()]
}
