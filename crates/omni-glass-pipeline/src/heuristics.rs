//! Structural heuristics over OCR text.
//!
//! Cheap, deterministic signals computed before CLASSIFY so the prompt
//! can steer the model toward `table` / `code` content types.

use omni_glass_core::StructuralFlags;

/// Keywords that open a code line.
const CODE_KEYWORDS: &[&str] = &[
    "import ", "def ", "class ", "function ", "fn ", "const ", "#include", "let ",
];

/// Fraction of non-whitespace characters that must be brackets.
const BRACKET_DENSITY_THRESHOLD: f64 = 0.05;

/// Fraction of non-empty lines ending in `;` that signals code.
const SEMICOLON_RATE_THRESHOLD: f64 = 0.30;

/// Compute both structure flags for a snip's text.
#[must_use]
pub fn detect_structure(text: &str) -> StructuralFlags {
    StructuralFlags {
        has_table_structure: has_table_structure(text),
        has_code_structure: has_code_structure(text),
    }
}

/// A table is ≥3 consecutive lines sharing the same non-zero count of
/// tab or pipe separators.
fn has_table_structure(text: &str) -> bool {
    let mut run = 0usize;
    let mut run_count = 0usize;

    for line in text.lines() {
        let separators = line.matches(['\t', '|']).count();
        if separators > 0 && separators == run_count {
            run = run.saturating_add(1);
            if run >= 3 {
                return true;
            }
        } else if separators > 0 {
            run_count = separators;
            run = 1;
        } else {
            run = 0;
            run_count = 0;
        }
    }
    false
}

/// Code is signalled by bracket density, keyword-opened lines, or a high
/// rate of `;`-terminated lines.
#[allow(clippy::cast_precision_loss)]
fn has_code_structure(text: &str) -> bool {
    let non_empty: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    if non_empty.is_empty() {
        return false;
    }

    if non_empty.iter().any(|line| {
        let trimmed = line.trim_start();
        CODE_KEYWORDS.iter().any(|kw| trimmed.starts_with(kw))
    }) {
        return true;
    }

    let semicolon_lines = non_empty
        .iter()
        .filter(|l| l.trim_end().ends_with(';'))
        .count();
    let semicolon_rate = semicolon_lines as f64 / non_empty.len() as f64;
    if semicolon_rate > SEMICOLON_RATE_THRESHOLD {
        return true;
    }

    balanced_bracket_density(text) >= BRACKET_DENSITY_THRESHOLD
}

/// Bracket density over non-whitespace characters, but only when the
/// brackets roughly balance (prose with a stray parenthesis stays cold).
#[allow(clippy::cast_precision_loss)]
fn balanced_bracket_density(text: &str) -> f64 {
    let mut opens = 0usize;
    let mut closes = 0usize;
    let mut significant = 0usize;

    for c in text.chars() {
        if !c.is_whitespace() {
            significant = significant.saturating_add(1);
        }
        match c {
            '{' | '[' | '(' => opens = opens.saturating_add(1),
            '}' | ']' | ')' => closes = closes.saturating_add(1),
            _ => {},
        }
    }

    if significant == 0 || opens.abs_diff(closes) > 1 {
        return 0.0;
    }
    (opens.saturating_add(closes)) as f64 / significant as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tsv_is_a_table() {
        let flags = detect_structure(
            "Name\tRole\tSalary\nAlice\tEngineer\t150000\nBob\tManager\t180000",
        );
        assert!(flags.has_table_structure);
    }

    #[test]
    fn pipe_table_is_a_table() {
        let flags = detect_structure("| a | b |\n| 1 | 2 |\n| 3 | 4 |");
        assert!(flags.has_table_structure);
    }

    #[test]
    fn two_lines_are_not_a_table() {
        let flags = detect_structure("a\tb\nc\td");
        assert!(!flags.has_table_structure);
    }

    #[test]
    fn varying_separator_counts_break_the_run() {
        let flags = detect_structure("a\tb\nc\td\te\nf\tg");
        assert!(!flags.has_table_structure);
    }

    #[test]
    fn keyword_lines_are_code() {
        assert!(detect_structure("import pandas as pd\nprint(x)").has_code_structure);
        assert!(detect_structure("fn main() {\n}").has_code_structure);
        assert!(detect_structure("#include <stdio.h>").has_code_structure);
    }

    #[test]
    fn semicolon_rate_is_code() {
        let flags = detect_structure("int a = 1;\nint b = 2;\nint c = 3;\nreturn a;");
        assert!(flags.has_code_structure);
    }

    #[test]
    fn prose_is_not_code() {
        let flags = detect_structure(
            "The quarterly report shows strong growth in the northern region. \
             Sales were up by twelve percent (year over year).",
        );
        assert!(!flags.has_code_structure);
        assert!(!flags.has_table_structure);
    }

    #[test]
    fn python_traceback_is_code_flagged() {
        let text = "Traceback (most recent call last):\n  File \"analysis.py\", line 3\n    \
                    import panda as pd\nModuleNotFoundError: No module named 'panda'";
        assert!(detect_structure(text).has_code_structure);
    }

    #[test]
    fn empty_text_has_no_structure() {
        let flags = detect_structure("");
        assert!(!flags.has_table_structure);
        assert!(!flags.has_code_structure);
    }
}
