// ============================================================
// Layer 4 — MCTest Reader
// ============================================================
// Reads the MCTest release format for one story set (mc160/mc500):
//
//   <dir>/<set>.<split>.tsv  — one story per line, tab separated:
//       id, properties, story, then four blocks of
//       question, answer A, answer B, answer C, answer D
//   <dir>/<set>.<split>.ans  — one line per story, four letters
//
// Questions carry a "one:" / "multiple:" prefix which is stripped,
// and stories use `\newline` / `\tab` escapes which are expanded
// by the Preprocessor. Letters map to labels by offset from 'A'.

use anyhow::{Context, Result};
use csv::StringRecord;
use std::path::{Path, PathBuf};

use crate::data::preprocessor::Preprocessor;
use crate::domain::error::McError;
use crate::domain::example::{Example, Split};
use crate::domain::traits::ExampleSource;

const QUESTIONS_PER_STORY: usize = 4;
const CHOICES_PER_QUESTION: usize = 4;
const HEADER_FIELDS: usize = 3;
const FIELDS_PER_STORY: usize = HEADER_FIELDS + QUESTIONS_PER_STORY * (1 + CHOICES_PER_QUESTION);

pub struct MctestReader {
    dir: PathBuf,
    set: String,
}

impl MctestReader {
    pub fn new(dir: impl Into<PathBuf>, set: impl Into<String>) -> Self {
        Self { dir: dir.into(), set: set.into() }
    }

    fn paths(&self, split: Split) -> (PathBuf, PathBuf) {
        (
            self.dir.join(format!("{}.{split}.tsv", self.set)),
            self.dir.join(format!("{}.{split}.ans", self.set)),
        )
    }
}

/// All rows of a tab-separated MCTest file. Stories contain bare
/// quote characters, so quoting is off; blank lines are skipped.
fn read_rows(path: &Path) -> Result<Vec<StringRecord>> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .quoting(false)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Cannot read MCTest file '{}'", path.display()))?;

    let rows = reader.records().collect::<Result<Vec<_>, _>>().map_err(|e| McError::MalformedInput {
        path:   path.display().to_string(),
        reason: e.to_string(),
    })?;
    Ok(rows)
}

impl ExampleSource for MctestReader {
    fn read(&self, split: Split) -> Result<Vec<Example>> {
        let (tsv_path, ans_path) = self.paths(split);

        let stories = read_rows(&tsv_path)?;
        let answers = read_rows(&ans_path)?;

        if stories.len() != answers.len() {
            return Err(McError::MalformedInput {
                path:   ans_path.display().to_string(),
                reason: format!("{} answer lines for {} stories", answers.len(), stories.len()),
            }
            .into());
        }

        let prep         = Preprocessor::new();
        let mut examples = Vec::with_capacity(stories.len() * QUESTIONS_PER_STORY);
        let mut skipped  = 0usize;

        for (row, (story_row, answer_row)) in stories.iter().zip(&answers).enumerate() {
            let fields: Vec<&str> = story_row.iter().collect();
            if fields.len() != FIELDS_PER_STORY {
                return Err(McError::MalformedInput {
                    path:   tsv_path.display().to_string(),
                    reason: format!(
                        "line {} has {} fields, expected {FIELDS_PER_STORY}",
                        row + 1,
                        fields.len()
                    ),
                }
                .into());
            }

            let letters: Vec<&str> = answer_row.iter().map(str::trim).collect();
            if letters.len() != QUESTIONS_PER_STORY {
                return Err(McError::MalformedInput {
                    path:   ans_path.display().to_string(),
                    reason: format!("line {} has {} answers", row + 1, letters.len()),
                }
                .into());
            }

            let story_id = fields[0];
            let story    = prep.clean(fields[2]);

            for (q, block) in fields[HEADER_FIELDS..].chunks(1 + CHOICES_PER_QUESTION).enumerate() {
                let question = prep.strip_question_marker(block[0]).to_string();
                let choices  = block[1..].iter().map(|c| c.trim().to_string()).collect();
                let id       = format!("{story_id}-{q}");

                match Example::with_answer_letter(id, story.clone(), question, choices, letters[q]) {
                    Ok(example) => examples.push(example),
                    Err(e) => {
                        tracing::warn!("Skipping MCTest question: {e}");
                        skipped += 1;
                    }
                }
            }
        }

        tracing::info!(
            "Read {} MCTest examples from '{}' ({} skipped)",
            examples.len(),
            tsv_path.display(),
            skipped
        );
        Ok(examples)
    }
}
