//! Content structure heuristics for OCR output.
//!
//! Cheap lexical signals computed before the CLASSIFY call; both flags are
//! injected into the prompt to steer the content-type decision.

use serde::Serialize;

/// Structural signals derived from the extracted text.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct StructuralFlags {
    pub has_table_structure: bool,
    pub has_code_structure: bool,
}

pub fn analyze(text: &str) -> StructuralFlags {
    StructuralFlags {
        has_table_structure: detect_table_structure(text),
        has_code_structure: detect_code_structure(text),
    }
}

/// A table is three or more consecutive lines carrying the same non-zero
/// count of tab or pipe separators.
pub fn detect_table_structure(text: &str) -> bool {
    let mut run = 0usize;
    let mut run_count = 0usize;

    for line in text.lines().filter(|l| !l.trim().is_empty()) {
        let separators = line.chars().filter(|c| *c == '\t' || *c == '|').count();
        if separators > 0 && separators == run_count {
            run += 1;
            if run >= 3 {
                return true;
            }
        } else if separators > 0 {
            run_count = separators;
            run = 1;
        } else {
            run_count = 0;
            run = 0;
        }
    }
    false
}

const CODE_KEYWORDS: &[&str] = &[
    "import ", "def ", "class ", "function ", "fn ", "const ", "#include", "let ",
];

/// Minimum share of bracket characters for the density signal.
const BRACKET_DENSITY_THRESHOLD: f64 = 0.02;

/// Code is any of: balanced bracket density over threshold, known keywords at
/// line starts, or more than 30% of lines ending in a semicolon.
pub fn detect_code_structure(text: &str) -> bool {
    if text.trim().is_empty() {
        return false;
    }

    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    if lines.is_empty() {
        return false;
    }

    if lines.iter().any(|l| {
        let trimmed = l.trim_start();
        CODE_KEYWORDS.iter().any(|kw| trimmed.starts_with(kw))
    }) {
        return true;
    }

    let semi_lines = lines.iter().filter(|l| l.trim_end().ends_with(';')).count();
    if (semi_lines as f64) / (lines.len() as f64) > 0.30 {
        return true;
    }

    let mut opens = 0usize;
    let mut closes = 0usize;
    for c in text.chars() {
        match c {
            '{' | '[' => opens += 1,
            '}' | ']' => closes += 1,
            _ => {}
        }
    }
    let density = (opens + closes) as f64 / text.chars().count().max(1) as f64;
    opens == closes && opens > 0 && density >= BRACKET_DENSITY_THRESHOLD
}
