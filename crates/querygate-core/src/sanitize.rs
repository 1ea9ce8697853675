//! Input hygiene for the natural-language question.
//!
//! Runs before the text is handed to the SQL generator, so a user cannot
//! steer it into emitting comment or terminator sequences.

use crate::errors::ValidationError;
use crate::validate::ValidationPolicy;

const STRIPPED_SEQUENCES: &[&str] = &["--", "/*", "*/", ";"];

pub fn sanitize(raw: &str, policy: &ValidationPolicy) -> Result<String, ValidationError> {
    let mut text = raw.to_string();
    // removing one marker can join its neighbours into another (`-;-`), so
    // repeat until nothing changes
    loop {
        let before = text.len();
        for seq in STRIPPED_SEQUENCES {
            text = text.replace(seq, "");
        }
        if text.len() == before {
            break;
        }
    }

    let cleaned = text.trim();
    if cleaned.is_empty() {
        return Err(ValidationError::EmptyInput);
    }

    let len = cleaned.chars().count();
    if len > policy.max_input_chars {
        return Err(ValidationError::TooLong {
            len,
            max: policy.max_input_chars,
        });
    }

    Ok(cleaned.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(raw: &str) -> Result<String, ValidationError> {
        sanitize(raw, &ValidationPolicy::default())
    }

    #[test]
    fn test_terminator_and_comment_scenario() {
        assert_eq!(
            run("SELECT * FROM employees; -- DROP TABLE").unwrap(),
            "SELECT * FROM employees  DROP TABLE"
        );
    }

    #[test]
    fn test_block_comments_removed() {
        assert_eq!(
            run("  show /* hidden */ salaries  ").unwrap(),
            "show  hidden  salaries"
        );
    }

    #[test]
    fn test_rejoined_markers_are_removed() {
        for raw in ["a -;- b", "a /;* b *;/", "x ;;-- y", "- - -;-"] {
            let out = run(raw).unwrap_or_default();
            assert!(!out.contains("--"), "{raw} -> {out}");
            assert!(!out.contains("/*"), "{raw} -> {out}");
            assert!(!out.contains("*/"), "{raw} -> {out}");
            assert!(!out.contains(';'), "{raw} -> {out}");
        }
    }

    #[test]
    fn test_empty_after_cleaning() {
        assert_eq!(run("   "), Err(ValidationError::EmptyInput));
        assert_eq!(run(" ;; -- /**/ "), Err(ValidationError::EmptyInput));
    }

    #[test]
    fn test_length_limit_counts_characters() {
        let exact = "é".repeat(500);
        assert_eq!(run(&exact).unwrap().chars().count(), 500);

        let over = "a".repeat(501);
        assert_eq!(
            run(&over),
            Err(ValidationError::TooLong { len: 501, max: 500 })
        );
    }

    #[test]
    fn test_plain_question_untouched() {
        assert_eq!(
            run("How many engineers were hired in 2023?").unwrap(),
            "How many engineers were hired in 2023?"
        );
    }
}
