pub mod flow;
pub mod types;
pub mod word_list;

pub use types::{
    Comprehension, DistractorImage, FillInBlank, LessonRecord, PartOfSpeech, Practice, Story,
    VocabularyEntry,
};
pub use word_list::{WordList, WordListError, MAX_WORDS};
