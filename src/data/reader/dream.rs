// ============================================================
// Layer 4 — DREAM Reader
// ============================================================
// Reads `<dir>/<split>.json`. Each file is an array of dialogues:
//
//   [
//     [ ["M: line 1", "W: line 2", ...],
//       [ {"question": "...", "choice": ["..", "..", ".."], "answer": ".."} ],
//       "5-510" ],
//     ...
//   ]
//
// One Example is produced per question. The dialogue lines are
// joined with newlines to form the context, and the answer text is
// matched against the three choices to obtain the label.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::{fs, path::PathBuf};

use crate::domain::example::{Example, Split};
use crate::domain::error::McError;
use crate::domain::traits::ExampleSource;

/// Every DREAM question offers exactly three answers.
const DREAM_CHOICES: usize = 3;

#[derive(Debug, Deserialize)]
struct DreamQuestion {
    question: String,
    choice:   Vec<String>,
    answer:   String,
}

#[derive(Debug, Deserialize)]
struct DreamDialogue(Vec<String>, Vec<DreamQuestion>, #[serde(default)] String);

pub struct DreamReader {
    dir: PathBuf,
}

impl DreamReader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path(&self, split: Split) -> PathBuf {
        self.dir.join(format!("{split}.json"))
    }
}

impl ExampleSource for DreamReader {
    fn read(&self, split: Split) -> Result<Vec<Example>> {
        let path = self.path(split);
        let raw  = fs::read_to_string(&path)
            .with_context(|| format!("Cannot read DREAM file '{}'", path.display()))?;

        let dialogues: Vec<DreamDialogue> = serde_json::from_str(&raw).map_err(|e| {
            McError::MalformedInput { path: path.display().to_string(), reason: e.to_string() }
        })?;

        let mut examples = Vec::new();
        let mut skipped  = 0usize;

        for (i, DreamDialogue(lines, questions, dialogue_id)) in dialogues.into_iter().enumerate() {
            let context = lines.join("\n");
            for (j, q) in questions.into_iter().enumerate() {
                let id = if dialogue_id.is_empty() {
                    format!("{split}-{i}-{j}")
                } else {
                    format!("{dialogue_id}-{j}")
                };
                let example = Example::with_answer_text(id, context.clone(), q.question, q.choice, &q.answer)
                    .and_then(|e| e.with_choice_count(DREAM_CHOICES));
                match example {
                    Ok(example) => examples.push(example),
                    Err(e) => {
                        tracing::warn!("Skipping DREAM question: {e}");
                        skipped += 1;
                    }
                }
            }
        }

        tracing::info!(
            "Read {} DREAM examples from '{}' ({} skipped)",
            examples.len(),
            path.display(),
            skipped
        );
        Ok(examples)
    }
}
