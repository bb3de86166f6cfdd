// ============================================================
// Layer 4 — Text Preprocessor
// ============================================================
// Normalises passage text before it reaches the tokenizer.
//
// MCTest stories are stored on one TSV line, with the literal
// escapes `\newline` and `\tab` in place of layout characters.
// RACE articles are plain text but often carry non-breaking or
// zero-width spaces.
//
// The output keeps paragraph breaks as a single '\n' and
// reduces every other whitespace run to one space. WordPiece
// splits on both the same way; the newline only keeps debug
// dumps readable.
//
// Reference: Rust Book §8 (Strings in Rust)

const ESCAPES: [(&str, &str); 2] = [("\\newline", "\n"), ("\\tab", " ")];
const QUESTION_MARKERS: [&str; 2] = ["one:", "multiple:"];

#[derive(Debug, Clone, Copy, Default)]
pub struct Preprocessor;

impl Preprocessor {
    pub fn new() -> Self {
        Self
    }

    /// Clean a passage: expand escapes and drop blank paragraphs.
    pub fn clean(&self, text: &str) -> String {
        let expanded = ESCAPES
            .iter()
            .fold(text.to_string(), |acc, (from, to)| acc.replace(from, to));

        expanded
            .split(['\n', '\r'])
            .map(normalise_line)
            .filter(|line| !line.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Strip the `one:` / `multiple:` marker MCTest puts in front of
    /// every question.
    pub fn strip_question_marker<'a>(&self, question: &'a str) -> &'a str {
        let q = question.trim();
        QUESTION_MARKERS
            .iter()
            .find_map(|m| q.strip_prefix(m))
            .map(str::trim_start)
            .unwrap_or(q)
    }
}

/// Collapse one line's whitespace; invisible characters count as spaces.
fn normalise_line(line: &str) -> String {
    line.split(|c: char| c.is_whitespace() || c.is_control() || c == '\u{200B}' || c == '\u{FEFF}')
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
