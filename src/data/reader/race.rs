// ============================================================
// Layer 4 — RACE Reader
// ============================================================
// Reads `<dir>/<split>/{high,middle}/*.txt`. Every file holds one
// passage as JSON:
//
//   { "article": "...", "questions": ["..", ..],
//     "options": [["..", "..", "..", ".."], ..],
//     "answers": ["B", ..], "id": "high1234.txt" }
//
// Files are visited in sorted path order so example order is stable
// across machines.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::data::preprocessor::Preprocessor;
use crate::domain::error::McError;
use crate::domain::example::{Example, Split};
use crate::domain::traits::ExampleSource;

const LEVELS: [&str; 2] = ["high", "middle"];
const RACE_CHOICES: usize = 4;

#[derive(Debug, Deserialize)]
struct RacePassage {
    article:   String,
    questions: Vec<String>,
    options:   Vec<Vec<String>>,
    answers:   Vec<String>,
    #[serde(default)]
    id:        String,
}

pub struct RaceReader {
    dir: PathBuf,
}

impl RaceReader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn passage_files(&self, split: Split) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for level in LEVELS {
            let level_dir = self.dir.join(split.as_str()).join(level);
            if !level_dir.is_dir() {
                tracing::debug!("No RACE directory at '{}'", level_dir.display());
                continue;
            }
            for entry in fs::read_dir(&level_dir)
                .with_context(|| format!("Cannot list '{}'", level_dir.display()))?
            {
                let path = entry?.path();
                if path.extension().and_then(|e| e.to_str()) == Some("txt") {
                    files.push(path);
                }
            }
        }
        files.sort();

        if files.is_empty() {
            anyhow::bail!(
                "No RACE passages found under '{}'",
                self.dir.join(split.as_str()).display()
            );
        }
        Ok(files)
    }

    fn read_passage(&self, path: &Path, prep: &Preprocessor, out: &mut Vec<Example>) -> Result<usize> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Cannot read RACE file '{}'", path.display()))?;
        let passage: RacePassage = serde_json::from_str(&raw).map_err(|e| McError::MalformedInput {
            path:   path.display().to_string(),
            reason: e.to_string(),
        })?;

        let n = passage.questions.len();
        if passage.options.len() != n || passage.answers.len() != n {
            return Err(McError::MalformedInput {
                path:   path.display().to_string(),
                reason: format!(
                    "{} questions, {} option lists, {} answers",
                    n,
                    passage.options.len(),
                    passage.answers.len()
                ),
            }
            .into());
        }

        let passage_id = if passage.id.is_empty() {
            path.file_name().and_then(|f| f.to_str()).unwrap_or_default().to_string()
        } else {
            passage.id
        };
        let article = prep.clean(&passage.article);

        let mut skipped = 0;
        let items = passage.questions.into_iter().zip(passage.options).zip(passage.answers);
        for (q, ((question, options), answer)) in items.enumerate() {
            let id = format!("{passage_id}-{q}");
            let example = Example::with_answer_letter(id, article.clone(), question, options, &answer)
                .and_then(|e| e.with_choice_count(RACE_CHOICES));
            match example {
                Ok(example) => out.push(example),
                Err(e) => {
                    tracing::warn!("Skipping RACE question: {e}");
                    skipped += 1;
                }
            }
        }
        Ok(skipped)
    }
}

impl ExampleSource for RaceReader {
    fn read(&self, split: Split) -> Result<Vec<Example>> {
        let files        = self.passage_files(split)?;
        let prep         = Preprocessor::new();
        let mut examples = Vec::new();
        let mut skipped  = 0usize;

        for path in &files {
            skipped += self.read_passage(path, &prep, &mut examples)?;
        }

        tracing::info!(
            "Read {} RACE examples from {} passages ({} skipped)",
            examples.len(),
            files.len(),
            skipped
        );
        Ok(examples)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn write_passage(root: &Path, split: &str, level: &str, name: &str, answers: &[&str]) {
        let dir = root.join(split).join(level);
        fs::create_dir_all(&dir).unwrap();
        let n = answers.len();
        let passage = json!({
            "article":   "The sun rises in the east.",
            "questions": (0..n).map(|i| format!("Question {i}?")).collect::<Vec<_>>(),
            "options":   (0..n).map(|_| vec!["east", "west", "north", "south"]).collect::<Vec<_>>(),
            "answers":   answers,
            "id":        name,
        });
        fs::write(dir.join(name), passage.to_string()).unwrap();
    }

    #[test]
    fn test_reads_both_levels_in_sorted_order() {
        let dir = tempfile::tempdir().unwrap();
        write_passage(dir.path(), "dev", "middle", "m1.txt", &["A"]);
        write_passage(dir.path(), "dev", "high", "h2.txt", &["C", "D"]);
        write_passage(dir.path(), "dev", "high", "h1.txt", &["B"]);

        let examples = RaceReader::new(dir.path()).read(Split::Dev).unwrap();
        let ids: Vec<&str> = examples.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["h1.txt-0", "h2.txt-0", "h2.txt-1", "m1.txt-0"]);

        let labels: Vec<usize> = examples.iter().map(|e| e.label).collect();
        assert_eq!(labels, vec![1, 2, 3, 0]);
        assert_eq!(examples[0].num_choices(), 4);
    }

    #[test]
    fn test_invalid_key_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        write_passage(dir.path(), "train", "high", "a.txt", &["A", "Z"]);

        let examples = RaceReader::new(dir.path()).read(Split::Train).unwrap();
        assert_eq!(examples.len(), 1);
    }

    #[test]
    fn test_five_options_skip_only_that_question() {
        let dir = tempfile::tempdir().unwrap();
        let level = dir.path().join("dev").join("high");
        fs::create_dir_all(&level).unwrap();
        let passage = json!({
            "article": "x", "questions": ["q1", "q2"],
            "options": [["a", "b", "c", "d"], ["a", "b", "c", "d", "e"]],
            "answers": ["A", "B"], "id": "p1",
        });
        fs::write(level.join("p1.txt"), passage.to_string()).unwrap();

        let examples = RaceReader::new(dir.path()).read(Split::Dev).unwrap();
        assert_eq!(examples.len(), 1);
        assert_eq!(examples[0].id, "p1-0");
    }

    #[test]
    fn test_empty_split_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("test").join("high")).unwrap();
        assert!(RaceReader::new(dir.path()).read(Split::Test).is_err());
    }

    #[test]
    fn test_mismatched_lists_are_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let level = dir.path().join("dev").join("high");
        fs::create_dir_all(&level).unwrap();
        let passage = json!({
            "article": "x", "questions": ["q1", "q2"],
            "options": [["a", "b", "c", "d"]], "answers": ["A", "B"],
        });
        fs::write(level.join("bad.txt"), passage.to_string()).unwrap();

        let err = RaceReader::new(dir.path()).read(Split::Dev).unwrap_err();
        assert!(matches!(err.downcast_ref::<McError>(), Some(McError::MalformedInput { .. })));
    }
}
