// ============================================================
// Layer 3 — Error Taxonomy
// ============================================================
// Every failure this crate raises itself falls into one of three
// kinds:
//
//   Configuration — invalid flag combination, reported before any
//                   computation starts
//   Data          — malformed input or an answer that cannot be
//                   mapped onto exactly one choice
//   Runtime       — tokenizer, recorder or tensor backend failure
//
// The application layer carries these inside anyhow::Error, so a
// caller can still downcast to McError and inspect kind(). The
// binary turns the kind into its exit status:
//
//   Runtime 1, Configuration 2, Data 3

use std::fmt;

/// Coarse classification of an [`McError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Data,
    Runtime,
}

impl ErrorKind {
    /// Kind of the first McError in the chain; anything else failed
    /// at runtime.
    pub fn of(err: &anyhow::Error) -> Self {
        err.chain()
            .find_map(|e| e.downcast_ref::<McError>())
            .map(McError::kind)
            .unwrap_or(ErrorKind::Runtime)
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            ErrorKind::Runtime       => 1,
            ErrorKind::Configuration => 2,
            ErrorKind::Data          => 3,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ErrorKind::Configuration => "configuration",
            ErrorKind::Data          => "data",
            ErrorKind::Runtime       => "runtime",
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum McError {
    /// Invalid run configuration.
    Configuration(String),

    /// An input file could not be parsed.
    MalformedInput { path: String, reason: String },

    /// No choice matches the ground-truth answer text.
    AnswerNotFound { example_id: String, answer: String },

    /// More than one choice matches the ground-truth answer text.
    AmbiguousAnswer { example_id: String, answer: String, matches: usize },

    /// A letter answer key that does not name one of the choices.
    InvalidAnswerKey { example_id: String, key: String },

    /// Groups in one dataset disagree on choice count or sequence length.
    ChoiceCountMismatch { example_id: String, expected: usize, found: usize },

    /// A split produced no examples to evaluate.
    EmptySplit(String),

    /// Failure inside the tokenizer, recorder or tensor backend.
    Backend(String),
}

impl McError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::MalformedInput { .. }
            | Self::AnswerNotFound { .. }
            | Self::AmbiguousAnswer { .. }
            | Self::InvalidAnswerKey { .. }
            | Self::ChoiceCountMismatch { .. }
            | Self::EmptySplit(_) => ErrorKind::Data,
            Self::Backend(_) => ErrorKind::Runtime,
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }
}

impl fmt::Display for McError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration(msg) => write!(f, "configuration error: {msg}"),
            Self::MalformedInput { path, reason } => {
                write!(f, "malformed input '{path}': {reason}")
            }
            Self::AnswerNotFound { example_id, answer } => write!(
                f,
                "AnswerNotFound: no choice of example '{example_id}' matches answer '{answer}'"
            ),
            Self::AmbiguousAnswer { example_id, answer, matches } => write!(
                f,
                "AmbiguousAnswer: {matches} choices of example '{example_id}' match answer '{answer}'"
            ),
            Self::InvalidAnswerKey { example_id, key } => {
                write!(f, "invalid answer key '{key}' for example '{example_id}'")
            }
            Self::ChoiceCountMismatch { example_id, expected, found } => write!(
                f,
                "example '{example_id}' has {found} choices, expected {expected}"
            ),
            Self::EmptySplit(split) => write!(f, "split '{split}' contains no examples"),
            Self::Backend(msg) => write!(f, "backend error: {msg}"),
        }
    }
}

impl std::error::Error for McError {}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds() {
        assert_eq!(McError::config("x").kind(), ErrorKind::Configuration);
        assert_eq!(McError::EmptySplit("dev".into()).kind(), ErrorKind::Data);
        assert_eq!(McError::backend("oom").kind(), ErrorKind::Runtime);
        let e = McError::AnswerNotFound { example_id: "d-1".into(), answer: "x".into() };
        assert_eq!(e.kind(), ErrorKind::Data);
    }

    #[test]
    fn test_survives_anyhow_round_trip() {
        let err: anyhow::Error = McError::config("no mode").into();
        let inner = err.downcast_ref::<McError>().unwrap();
        assert_eq!(inner.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_kind_of_wrapped_errors() {
        use anyhow::Context;

        let wrapped = Err::<(), _>(McError::EmptySplit("dev".into()))
            .context("evaluating dev")
            .unwrap_err();
        assert_eq!(ErrorKind::of(&wrapped), ErrorKind::Data);
        assert_eq!(ErrorKind::of(&wrapped).exit_code(), 3);

        let io = anyhow::anyhow!("disk full");
        assert_eq!(ErrorKind::of(&io), ErrorKind::Runtime);
        assert_eq!(ErrorKind::Configuration.exit_code(), 2);
        assert_eq!(ErrorKind::Configuration.to_string(), "configuration");
    }

    #[test]
    fn test_answer_not_found_is_labelled() {
        let e = McError::AnswerNotFound { example_id: "dev-3".into(), answer: "blue".into() };
        assert!(e.to_string().starts_with("AnswerNotFound"));
    }
}
