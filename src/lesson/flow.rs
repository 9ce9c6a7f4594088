//! Student walkthrough of a generated lesson.
//!
//! The walkthrough is an explicit state machine (`input -> preteach -> story ->
//! practice`) that owns the lesson and the student's practice answers, so the
//! rendering layer never mutates view flags directly.

use std::collections::HashMap;

use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::lesson::types::{FillInBlank, LessonRecord};

const MATCHING_VOCAB_WORDS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LessonStep {
    Input,
    Preteach,
    Story,
    Practice,
}

impl LessonStep {
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Input => None,
            Self::Preteach => Some(Self::Story),
            Self::Story => Some(Self::Practice),
            Self::Practice => None,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FlowError {
    #[error("cannot move from {from:?} to {to:?}")]
    InvalidTransition { from: LessonStep, to: LessonStep },
    #[error("no lesson loaded")]
    NoLesson,
    #[error("question {0} does not exist")]
    UnknownQuestion(usize),
    #[error("image is not part of the matching game")]
    UnknownImage,
    #[error("practice answers are only accepted in the practice step")]
    NotPracticing,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerResult {
    pub correct: bool,
    pub expected: String,
}

/// Case- and whitespace-insensitive comparison used by every practice activity.
pub fn answers_match(given: &str, expected: &str) -> bool {
    given.trim().eq_ignore_ascii_case(expected.trim())
}

pub fn check_fill_in_blank(
    lesson: &LessonRecord,
    index: usize,
    answer: &str,
) -> Result<AnswerResult, FlowError> {
    let question = lesson
        .practice
        .fill_in_blank
        .get(index)
        .ok_or(FlowError::UnknownQuestion(index))?;
    Ok(AnswerResult {
        correct: answers_match(answer, &question.answer),
        expected: question.answer.clone(),
    })
}

/// Answer options in random order so the answer's position gives nothing away.
pub fn shuffled_options(question: &FillInBlank) -> Vec<String> {
    let mut options = question.options.clone();
    options.shuffle(&mut rand::rng());
    options
}

/// Comprehension answers are open-ended; checking only reveals the model answer.
pub fn reveal_comprehension(lesson: &LessonRecord, index: usize) -> Result<AnswerResult, FlowError> {
    let question = lesson
        .practice
        .comprehension
        .get(index)
        .ok_or(FlowError::UnknownQuestion(index))?;
    Ok(AnswerResult {
        correct: true,
        expected: question.answer.clone(),
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchingItem {
    pub word: String,
    pub image: Option<String>,
    pub is_distractor: bool,
}

/// Picture-matching board: the illustrated words among the first three
/// vocabulary words plus the illustrated distractors, shuffled.
pub fn matching_items(lesson: &LessonRecord) -> Vec<MatchingItem> {
    let mut items: Vec<MatchingItem> = lesson
        .words
        .iter()
        .take(MATCHING_VOCAB_WORDS)
        .filter(|entry| entry.has_image())
        .map(|entry| MatchingItem {
            word: entry.word.clone(),
            image: entry.image.clone(),
            is_distractor: false,
        })
        .collect();

    if let Some(images) = &lesson.distractor_images {
        items.extend(images.iter().map(|d| MatchingItem {
            word: d.word.clone(),
            image: Some(d.image.clone()),
            is_distractor: true,
        }));
    }

    items.shuffle(&mut rand::rng());
    items
}

/// Grades a picture match identified by the image shown to the student.
pub fn check_matching(lesson: &LessonRecord, image: &str, word: &str) -> Result<AnswerResult, FlowError> {
    let vocab = lesson
        .words
        .iter()
        .take(MATCHING_VOCAB_WORDS)
        .filter_map(|entry| entry.image.as_deref().map(|img| (img, entry.word.as_str())));
    let distractors = lesson
        .distractor_images
        .iter()
        .flatten()
        .map(|d| (d.image.as_str(), d.word.as_str()));

    let (_, expected) = vocab
        .chain(distractors)
        .find(|(img, _)| *img == image)
        .ok_or(FlowError::UnknownImage)?;

    Ok(AnswerResult {
        correct: answers_match(word, expected),
        expected: expected.to_string(),
    })
}

fn push_escaped(out: &mut String, text: &str) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
}

/// Escapes the story text as HTML and wraps every whole-word,
/// case-insensitive occurrence of a vocabulary word in `<strong>` tags.
pub fn highlight_story(lesson: &LessonRecord) -> String {
    let vocab: Vec<String> = lesson.words.iter().map(|w| w.word.to_lowercase()).collect();
    let text = &lesson.story.text;
    let mut out = String::with_capacity(text.len() + vocab.len() * 17);
    let mut token = String::new();

    let flush = |token: &mut String, out: &mut String| {
        if token.is_empty() {
            return;
        }
        if vocab.iter().any(|v| *v == token.to_lowercase()) {
            out.push_str("<strong>");
            push_escaped(out, token);
            out.push_str("</strong>");
        } else {
            push_escaped(out, token);
        }
        token.clear();
    };

    for c in text.chars() {
        if c.is_alphanumeric() || c == '\'' || c == '-' {
            token.push(c);
        } else {
            flush(&mut token, &mut out);
            let mut buf = [0; 4];
            push_escaped(&mut out, c.encode_utf8(&mut buf));
        }
    }
    flush(&mut token, &mut out);
    out
}

#[derive(Debug, Clone)]
pub struct LessonFlow {
    step: LessonStep,
    lesson: Option<LessonRecord>,
    fill_in_blank_answers: HashMap<usize, AnswerResult>,
    matching: Vec<MatchingItem>,
}

impl Default for LessonFlow {
    fn default() -> Self {
        Self::new()
    }
}

impl LessonFlow {
    pub fn new() -> Self {
        Self {
            step: LessonStep::Input,
            lesson: None,
            fill_in_blank_answers: HashMap::new(),
            matching: Vec::new(),
        }
    }

    pub fn step(&self) -> LessonStep {
        self.step
    }

    pub fn lesson(&self) -> Option<&LessonRecord> {
        self.lesson.as_ref()
    }

    /// Loads a generated or stored lesson and starts the pre-teach step.
    pub fn start(&mut self, lesson: LessonRecord) {
        self.reset();
        self.lesson = Some(lesson);
        self.step = LessonStep::Preteach;
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn advance(&mut self) -> Result<LessonStep, FlowError> {
        let next = self.step.next().ok_or(FlowError::InvalidTransition {
            from: self.step,
            to: LessonStep::Practice,
        })?;
        self.go_to(next)
    }

    /// Advances until the practice step is reached.
    pub fn skip_to_practice(&mut self) -> Result<(), FlowError> {
        while self.step != LessonStep::Practice {
            self.advance()?;
        }
        Ok(())
    }

    fn go_to(&mut self, to: LessonStep) -> Result<LessonStep, FlowError> {
        let lesson = self.lesson.as_ref().ok_or(FlowError::NoLesson)?;
        if to == LessonStep::Practice && self.matching.is_empty() {
            self.matching = matching_items(lesson);
        }
        self.step = to;
        Ok(to)
    }

    pub fn matching_board(&self) -> &[MatchingItem] {
        &self.matching
    }

    pub fn answer_fill_in_blank(&mut self, index: usize, answer: &str) -> Result<&AnswerResult, FlowError> {
        if self.step != LessonStep::Practice {
            return Err(FlowError::NotPracticing);
        }
        let lesson = self.lesson.as_ref().ok_or(FlowError::NoLesson)?;
        let result = check_fill_in_blank(lesson, index, answer)?;
        self.fill_in_blank_answers.insert(index, result);
        self.fill_in_blank_answers
            .get(&index)
            .ok_or(FlowError::UnknownQuestion(index))
    }

    pub fn fill_in_blank_score(&self) -> (usize, usize) {
        let total = self
            .lesson
            .as_ref()
            .map(|l| l.practice.fill_in_blank.len())
            .unwrap_or(0);
        let correct = self.fill_in_blank_answers.values().filter(|a| a.correct).count();
        (correct, total)
    }
}
