use thiserror::Error;

pub const MAX_WORDS: usize = 10;
const LESSON_ID_SEED_WORDS: usize = 3;
const LESSON_ID_MAX_LEN: usize = 50;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WordListError {
    #[error("word list is empty")]
    Empty,
}

/// Trimmed, non-blank, at most [`MAX_WORDS`] words in input order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WordList {
    words: Vec<String>,
}

impl WordList {
    /// Parses textarea input, one word per line.
    pub fn parse(raw: &str) -> Result<Self, WordListError> {
        Self::from_words(raw.lines())
    }

    pub fn from_words<I, S>(words: I) -> Result<Self, WordListError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let words: Vec<String> = words
            .into_iter()
            .map(|w| w.as_ref().trim().to_string())
            .filter(|w| !w.is_empty())
            .take(MAX_WORDS)
            .collect();

        if words.is_empty() {
            return Err(WordListError::Empty);
        }
        Ok(Self { words })
    }

    pub fn as_slice(&self) -> &[String] {
        &self.words
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.words.iter().map(String::as_str)
    }

    pub fn joined(&self, sep: &str) -> String {
        self.words.join(sep)
    }

    /// Human readable title, e.g. `brave, rescue, danger`.
    pub fn title(&self) -> String {
        self.joined(", ")
    }

    pub fn lesson_id(&self) -> String {
        lesson_id_for(self.iter())
    }

    /// Raw text form stored alongside a lesson.
    pub fn to_text(&self) -> String {
        self.joined("\n")
    }
}

/// Derives the stable lesson identifier from the first three words.
pub fn lesson_id_for<'a>(words: impl Iterator<Item = &'a str>) -> String {
    let id = words
        .map(str::trim)
        .filter(|w| !w.is_empty())
        .take(LESSON_ID_SEED_WORDS)
        .map(|w| {
            w.to_lowercase()
                .chars()
                .map(|c| if c.is_ascii_lowercase() || c.is_ascii_digit() { c } else { '-' })
                .collect::<String>()
        })
        .collect::<Vec<_>>()
        .join("-");

    id.chars().take(LESSON_ID_MAX_LEN).collect()
}
