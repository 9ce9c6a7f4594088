use serde::{de, Deserialize, Deserializer, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PartOfSpeech {
    Noun,
    Verb,
    Adjective,
    Adverb,
}

impl PartOfSpeech {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Noun => "noun",
            Self::Verb => "verb",
            Self::Adjective => "adjective",
            Self::Adverb => "adverb",
        }
    }

    /// Accepts any casing and surrounding whitespace.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "noun" => Some(Self::Noun),
            "verb" => Some(Self::Verb),
            "adjective" => Some(Self::Adjective),
            "adverb" => Some(Self::Adverb),
            _ => None,
        }
    }
}

impl<'de> Deserialize<'de> for PartOfSpeech {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).ok_or_else(|| {
            de::Error::unknown_variant(raw.trim(), &["noun", "verb", "adjective", "adverb"])
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VocabularyEntry {
    pub word: String,
    pub definition: String,
    pub examples: Vec<String>,
    pub part_of_speech: PartOfSpeech,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl VocabularyEntry {
    pub fn first_example(&self) -> &str {
        self.examples
            .first()
            .map(String::as_str)
            .unwrap_or(self.word.as_str())
    }

    pub fn has_image(&self) -> bool {
        self.image.as_deref().is_some_and(|v| !v.trim().is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DistractorImage {
    pub word: String,
    pub image: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Story {
    pub title: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FillInBlank {
    pub sentence: String,
    pub answer: String,
    pub options: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comprehension {
    pub question: String,
    pub answer: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Practice {
    #[serde(default)]
    pub fill_in_blank: Vec<FillInBlank>,
    #[serde(default)]
    pub comprehension: Vec<Comprehension>,
}

/// A generated lesson, serialized in the camelCase shape the text model emits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonRecord {
    pub words: Vec<VocabularyEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distractors: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distractor_images: Option<Vec<DistractorImage>>,
    pub story: Story,
    pub practice: Practice,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_model_shape() {
        let raw = r#"{
            "words": [{"word": "brave", "definition": "Not afraid.", "examples": ["The brave dog barked."], "partOfSpeech": "adjective"}],
            "distractors": ["table", "quiet", "jump"],
            "story": {"title": "The Storm", "text": "A brave girl..."},
            "practice": {
                "fillInBlank": [{"sentence": "The ___ knight.", "answer": "brave", "options": ["brave", "table", "jump"]}],
                "comprehension": [{"question": "Who was brave?", "answer": "The girl."}]
            }
        }"#;
        let lesson: LessonRecord = serde_json::from_str(raw).unwrap();
        assert_eq!(lesson.words[0].part_of_speech, PartOfSpeech::Adjective);
        assert!(lesson.words[0].image.is_none());
        assert_eq!(lesson.distractors.as_ref().map(Vec::len), Some(3));
    }

    #[test]
    fn part_of_speech_ignores_case() {
        let raw = r#"{"word": "storm", "definition": "d", "examples": ["x"], "partOfSpeech": " Noun "}"#;
        let entry: VocabularyEntry = serde_json::from_str(raw).unwrap();
        assert_eq!(entry.part_of_speech, PartOfSpeech::Noun);
        assert_eq!(serde_json::to_value(entry.part_of_speech).unwrap(), "noun");

        let adverb: PartOfSpeech = serde_json::from_str(r#""ADVERB""#).unwrap();
        assert_eq!(adverb, PartOfSpeech::Adverb);
    }

    #[test]
    fn rejects_unknown_part_of_speech() {
        let raw = r#"{"word": "run", "definition": "d", "examples": ["x"], "partOfSpeech": "noun/verb"}"#;
        assert!(serde_json::from_str::<VocabularyEntry>(raw).is_err());
    }

    #[test]
    fn blank_image_does_not_count() {
        let entry = VocabularyEntry {
            word: "rescue".into(),
            definition: "To save someone.".into(),
            examples: vec![],
            part_of_speech: PartOfSpeech::Verb,
            image: Some("  ".into()),
        };
        assert!(!entry.has_image());
        assert_eq!(entry.first_example(), "rescue");
    }
}
