// ============================================================
// Layer 3 — Example Domain Type
// ============================================================
// One labelled multiple-choice question:
//   - a context (dialogue or passage)
//   - a question about it
//   - N candidate answers, in dataset order
//   - the 0-based index of the correct candidate
//
// Examples are immutable once built. Readers create them from
// the raw files; the feature builder consumes them exactly once.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::error::McError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Example {
    pub id:       String,
    pub context:  String,
    pub question: String,
    pub choices:  Vec<String>,
    pub label:    usize,
}

impl Example {
    /// Build an example whose label is already known.
    /// Fails if the label does not index one of the choices.
    pub fn new(
        id:       impl Into<String>,
        context:  impl Into<String>,
        question: impl Into<String>,
        choices:  Vec<String>,
        label:    usize,
    ) -> Result<Self, McError> {
        let id = id.into();
        if label >= choices.len() {
            return Err(McError::InvalidAnswerKey {
                example_id: id,
                key:        label.to_string(),
            });
        }
        Ok(Self {
            id,
            context:  context.into(),
            question: question.into(),
            choices,
            label,
        })
    }

    /// Build an example from a ground-truth answer given as text.
    /// The label is the position of the single choice that equals the
    /// answer, ignoring case.
    pub fn with_answer_text(
        id:       impl Into<String>,
        context:  impl Into<String>,
        question: impl Into<String>,
        choices:  Vec<String>,
        answer:   &str,
    ) -> Result<Self, McError> {
        let id    = id.into();
        let label = resolve_label(&id, &choices, answer)?;
        Self::new(id, context, question, choices, label)
    }

    /// Build an example from a letter answer key (`A` → 0, `B` → 1, …).
    pub fn with_answer_letter(
        id:       impl Into<String>,
        context:  impl Into<String>,
        question: impl Into<String>,
        choices:  Vec<String>,
        letter:   &str,
    ) -> Result<Self, McError> {
        let id    = id.into();
        let label = letter_to_label(letter, choices.len()).ok_or_else(|| {
            McError::InvalidAnswerKey { example_id: id.clone(), key: letter.to_string() }
        })?;
        Self::new(id, context, question, choices, label)
    }

    pub fn num_choices(&self) -> usize {
        self.choices.len()
    }

    /// Keep the example only if it offers exactly `expected` choices.
    pub fn with_choice_count(self, expected: usize) -> Result<Self, McError> {
        if self.choices.len() != expected {
            return Err(McError::ChoiceCountMismatch {
                example_id: self.id,
                expected,
                found: self.choices.len(),
            });
        }
        Ok(self)
    }
}

/// Locate the one choice equal to `answer` (case-insensitive, exact).
/// Zero or several matches are reported rather than guessed.
pub fn resolve_label(example_id: &str, choices: &[String], answer: &str) -> Result<usize, McError> {
    let wanted = answer.to_lowercase();
    let matches: Vec<usize> = choices
        .iter()
        .enumerate()
        .filter(|(_, c)| c.to_lowercase() == wanted)
        .map(|(i, _)| i)
        .collect();

    match matches.as_slice() {
        [only] => Ok(*only),
        [] => Err(McError::AnswerNotFound {
            example_id: example_id.to_string(),
            answer:     answer.to_string(),
        }),
        many => Err(McError::AmbiguousAnswer {
            example_id: example_id.to_string(),
            answer:     answer.to_string(),
            matches:    many.len(),
        }),
    }
}

/// Character-code offset from 'A', bounded by the number of choices.
pub fn letter_to_label(letter: &str, num_choices: usize) -> Option<usize> {
    let mut chars = letter.trim().chars();
    let c = chars.next()?;
    if chars.next().is_some() || !c.is_ascii_uppercase() {
        return None;
    }
    let label = (c as u8 - b'A') as usize;
    (label < num_choices).then_some(label)
}

// ─── Split ────────────────────────────────────────────────────────────────────
/// Dataset partition identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Split {
    Train,
    Dev,
    Test,
}

impl Split {
    pub fn as_str(&self) -> &'static str {
        match self {
            Split::Train => "train",
            Split::Dev   => "dev",
            Split::Test  => "test",
        }
    }
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Split {
    type Err = McError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "train" => Ok(Split::Train),
            "dev" | "valid" | "validation" => Ok(Split::Dev),
            "test" => Ok(Split::Test),
            other => Err(McError::config(format!("unknown split '{other}'"))),
        }
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    fn choices(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_label_from_case_insensitive_match() {
        let c = choices(&["On the mat", "on the roof", "in a box"]);
        assert_eq!(resolve_label("x", &c, "on the MAT").unwrap(), 0);
        assert_eq!(resolve_label("x", &c, "in a box").unwrap(), 2);
    }

    #[test]
    fn test_no_match_is_an_error_not_zero() {
        let c = choices(&["on the mat", "on the roof", "in a box"]);
        let err = resolve_label("dev-7", &c, "under the bed").unwrap_err();
        assert!(matches!(err, McError::AnswerNotFound { .. }));
    }

    #[test]
    fn test_substring_is_not_a_match() {
        let c = choices(&["on the mat", "on the roof"]);
        assert!(resolve_label("x", &c, "on the").is_err());
    }

    #[test]
    fn test_duplicate_match_is_ambiguous() {
        let c = choices(&["yes", "no", "Yes"]);
        let err = resolve_label("x", &c, "yes").unwrap_err();
        assert_eq!(
            err,
            McError::AmbiguousAnswer { example_id: "x".into(), answer: "yes".into(), matches: 2 }
        );
    }

    #[test]
    fn test_choice_count_is_enforced() {
        let ex = Example::new("p-1", "ctx", "q", choices(&["a", "b", "c", "d", "e"]), 0).unwrap();
        let err = ex.clone().with_choice_count(4).unwrap_err();
        assert!(matches!(err, McError::ChoiceCountMismatch { expected: 4, found: 5, .. }));
        assert_eq!(ex.clone().with_choice_count(5).unwrap(), ex);
    }

    #[test]
    fn test_letter_keys() {
        assert_eq!(letter_to_label("A", 4), Some(0));
        assert_eq!(letter_to_label("D", 4), Some(3));
        assert_eq!(letter_to_label(" C\n", 4), Some(2));
        assert_eq!(letter_to_label("D", 3), None);
        assert_eq!(letter_to_label("a", 4), None);
        assert_eq!(letter_to_label("", 4), None);
        assert_eq!(letter_to_label("AB", 4), None);
    }

    #[test]
    fn test_example_rejects_out_of_range_label() {
        let err = Example::new("e", "ctx", "q", choices(&["a", "b"]), 2).unwrap_err();
        assert!(matches!(err, McError::InvalidAnswerKey { .. }));
    }

    #[test]
    fn test_with_answer_text() {
        let ex = Example::with_answer_text(
            "e", "the cat sat.", "where did the cat sit?",
            choices(&["on the mat", "on the roof", "in a box"]), "on the mat",
        ).unwrap();
        assert_eq!(ex.label, 0);
        assert_eq!(ex.num_choices(), 3);
    }

    #[test]
    fn test_split_parsing() {
        assert_eq!("dev".parse::<Split>().unwrap(), Split::Dev);
        assert_eq!("TEST".parse::<Split>().unwrap(), Split::Test);
        assert!("holdout".parse::<Split>().is_err());
        assert_eq!(Split::Train.to_string(), "train");
    }
}
