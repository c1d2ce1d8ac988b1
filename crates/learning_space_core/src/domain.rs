//! crates/learning_space_core/src/domain.rs
//!
//! Defines the core data structures for a learning space and the content the
//! agent generates for it. The serde shapes match the `learning_space` row as
//! the database and the agent API exchange it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

//=========================================================================================
// Language
//=========================================================================================

/// The languages generated content can be produced in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Language {
    #[default]
    English,
    Hindi,
    Tamil,
    Telugu,
    Marathi,
    Bengali,
    Kannada,
    Gujarati,
    Malayalam,
    Punjabi,
    Odia,
    Assamese,
    Urdu,
}

impl Language {
    pub const ALL: [Language; 13] = [
        Language::English,
        Language::Hindi,
        Language::Tamil,
        Language::Telugu,
        Language::Marathi,
        Language::Bengali,
        Language::Kannada,
        Language::Gujarati,
        Language::Malayalam,
        Language::Punjabi,
        Language::Odia,
        Language::Assamese,
        Language::Urdu,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Language::English => "English",
            Language::Hindi => "Hindi",
            Language::Tamil => "Tamil",
            Language::Telugu => "Telugu",
            Language::Marathi => "Marathi",
            Language::Bengali => "Bengali",
            Language::Kannada => "Kannada",
            Language::Gujarati => "Gujarati",
            Language::Malayalam => "Malayalam",
            Language::Punjabi => "Punjabi",
            Language::Odia => "Odia",
            Language::Assamese => "Assamese",
            Language::Urdu => "Urdu",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unsupported language: {0}")]
pub struct UnknownLanguage(pub String);

impl FromStr for Language {
    type Err = UnknownLanguage;

    /// Accepts the English name in any letter case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Language::ALL
            .into_iter()
            .find(|lang| lang.as_str().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| UnknownLanguage(s.to_string()))
    }
}

//=========================================================================================
// Content Kinds
//=========================================================================================

/// One of the six generated-content widgets of a learning space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    Summary,
    Flashcards,
    Quiz,
    Mindmap,
    Audio,
    Recommendations,
}

impl ContentKind {
    pub const ALL: [ContentKind; 6] = [
        ContentKind::Summary,
        ContentKind::Flashcards,
        ContentKind::Quiz,
        ContentKind::Mindmap,
        ContentKind::Audio,
        ContentKind::Recommendations,
    ];

    /// The `learning_space` column holding this content.
    pub fn column(&self) -> &'static str {
        match self {
            ContentKind::Summary => "summary_notes",
            ContentKind::Flashcards => "flashcards",
            ContentKind::Quiz => "quiz",
            ContentKind::Mindmap => "mindmap",
            ContentKind::Audio => "audio_overview",
            ContentKind::Recommendations => "recommendations",
        }
    }

    /// Whether the column stores structured JSON rather than a plain URL.
    pub fn is_structured(&self) -> bool {
        !matches!(self, ContentKind::Mindmap | ContentKind::Audio)
    }

    /// Path of the agent endpoint that generates this content.
    pub fn endpoint(&self) -> &'static str {
        match self {
            ContentKind::Summary => "/api/workflows/invoke",
            ContentKind::Flashcards => "/api/workflows/generate-flashcards",
            ContentKind::Quiz => "/api/workflows/generate-quiz",
            ContentKind::Mindmap => "/api/workflows/generate-mindmap",
            ContentKind::Audio => "/api/workflows/audio-summary",
            ContentKind::Recommendations => "/api/workflows/generate-recommendations",
        }
    }

    /// The field of a successful agent response that carries the content inline.
    pub fn response_field(&self) -> &'static str {
        match self {
            ContentKind::Summary => "summary_notes",
            ContentKind::Flashcards => "flashcards",
            ContentKind::Quiz => "quiz",
            ContentKind::Mindmap => "mindmap_url",
            ContentKind::Audio => "audio_url",
            ContentKind::Recommendations => "recommendations",
        }
    }

    /// Lower-case noun used inside error messages ("Failed to generate quiz").
    pub fn label(&self) -> &'static str {
        match self {
            ContentKind::Summary => "summary notes",
            ContentKind::Flashcards => "flashcards",
            ContentKind::Quiz => "quiz",
            ContentKind::Mindmap => "mind map",
            ContentKind::Audio => "audio",
            ContentKind::Recommendations => "recommendations",
        }
    }

    /// Title-case name used in user notices.
    pub fn title(&self) -> &'static str {
        match self {
            ContentKind::Summary => "Summary Notes",
            ContentKind::Flashcards => "Flashcards",
            ContentKind::Quiz => "Quiz",
            ContentKind::Mindmap => "Mind Map",
            ContentKind::Audio => "Audio",
            ContentKind::Recommendations => "Recommendations",
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown content kind: {0}")]
pub struct UnknownContentKind(pub String);

impl FromStr for ContentKind {
    type Err = UnknownContentKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "summary" | "summary_notes" => Ok(ContentKind::Summary),
            "flashcards" => Ok(ContentKind::Flashcards),
            "quiz" => Ok(ContentKind::Quiz),
            "mindmap" => Ok(ContentKind::Mindmap),
            "audio" | "audio_overview" => Ok(ContentKind::Audio),
            "recommendations" => Ok(ContentKind::Recommendations),
            other => Err(UnknownContentKind(other.to_string())),
        }
    }
}

//=========================================================================================
// Generated Content Values
//=========================================================================================

/// Summary notes are either a markdown body or a titled note.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SummaryNotes {
    Structured { title: String, summary: String },
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flashcard {
    pub front: String,
    pub back: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionOptions {
    #[serde(rename = "A")]
    pub a: String,
    #[serde(rename = "B")]
    pub b: String,
    #[serde(rename = "C")]
    pub c: String,
    #[serde(rename = "D")]
    pub d: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub question: String,
    pub options: QuestionOptions,
    /// One of "A", "B", "C" or "D".
    #[serde(rename = "correctAnswer")]
    pub correct_answer: String,
    #[serde(default)]
    pub hint: String,
    #[serde(default)]
    pub explanation: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizData {
    pub title: String,
    pub questions: Vec<Question>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recommendation {
    pub title: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// A fully-formed value for one content widget.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Content {
    Summary(SummaryNotes),
    Flashcards(Vec<Flashcard>),
    Quiz(QuizData),
    Mindmap(String),
    Audio(String),
    Recommendations(Vec<Recommendation>),
}

impl Content {
    pub fn kind(&self) -> ContentKind {
        match self {
            Content::Summary(_) => ContentKind::Summary,
            Content::Flashcards(_) => ContentKind::Flashcards,
            Content::Quiz(_) => ContentKind::Quiz,
            Content::Mindmap(_) => ContentKind::Mindmap,
            Content::Audio(_) => ContentKind::Audio,
            Content::Recommendations(_) => ContentKind::Recommendations,
        }
    }

    /// Decodes a column or response value for `kind`. `null` means "no content".
    pub fn from_value(kind: ContentKind, value: Value) -> Result<Option<Content>, serde_json::Error> {
        if value.is_null() {
            return Ok(None);
        }
        let content = match kind {
            ContentKind::Summary => Content::Summary(serde_json::from_value(value)?),
            ContentKind::Flashcards => Content::Flashcards(serde_json::from_value(value)?),
            ContentKind::Quiz => Content::Quiz(serde_json::from_value(value)?),
            ContentKind::Mindmap => Content::Mindmap(serde_json::from_value(value)?),
            ContentKind::Audio => Content::Audio(serde_json::from_value(value)?),
            ContentKind::Recommendations => {
                Content::Recommendations(serde_json::from_value(value)?)
            }
        };
        Ok(Some(content))
    }

    pub fn to_value(&self) -> Value {
        // Every variant is plain data, so serialization cannot fail.
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

//=========================================================================================
// Learning Space
//=========================================================================================

/// A user's topic-scoped container for generated study materials.
///
/// Each generated-content field is either absent or a fully-formed value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningSpace {
    pub id: Uuid,
    pub user_id: String,
    pub topic: String,
    #[serde(default)]
    pub language: Language,
    #[serde(default)]
    pub pdf_source: Option<String>,
    #[serde(default)]
    pub audio_source: Option<String>,
    #[serde(default)]
    pub summary_notes: Option<SummaryNotes>,
    #[serde(default)]
    pub flashcards: Option<Vec<Flashcard>>,
    #[serde(default)]
    pub quiz: Option<QuizData>,
    #[serde(default)]
    pub recommendations: Option<Vec<Recommendation>>,
    #[serde(default)]
    pub audio_overview: Option<String>,
    #[serde(default)]
    pub audio_script: Option<String>,
    #[serde(default)]
    pub mindmap: Option<String>,
    /// Bumped by the database on every row update.
    #[serde(default)]
    pub version: i64,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl LearningSpace {
    /// Returns the current value of the content field for `kind`.
    pub fn content(&self, kind: ContentKind) -> Option<Content> {
        match kind {
            ContentKind::Summary => self.summary_notes.clone().map(Content::Summary),
            ContentKind::Flashcards => self.flashcards.clone().map(Content::Flashcards),
            ContentKind::Quiz => self.quiz.clone().map(Content::Quiz),
            ContentKind::Mindmap => self.mindmap.clone().map(Content::Mindmap),
            ContentKind::Audio => self.audio_overview.clone().map(Content::Audio),
            ContentKind::Recommendations => {
                self.recommendations.clone().map(Content::Recommendations)
            }
        }
    }

    /// Replaces the content field for `kind`. A value of the wrong kind is ignored.
    pub fn set_content(&mut self, kind: ContentKind, content: Option<Content>) {
        match (kind, content) {
            (ContentKind::Summary, None) => self.summary_notes = None,
            (ContentKind::Flashcards, None) => self.flashcards = None,
            (ContentKind::Quiz, None) => self.quiz = None,
            (ContentKind::Mindmap, None) => self.mindmap = None,
            (ContentKind::Audio, None) => self.audio_overview = None,
            (ContentKind::Recommendations, None) => self.recommendations = None,
            (ContentKind::Summary, Some(Content::Summary(v))) => self.summary_notes = Some(v),
            (ContentKind::Flashcards, Some(Content::Flashcards(v))) => self.flashcards = Some(v),
            (ContentKind::Quiz, Some(Content::Quiz(v))) => self.quiz = Some(v),
            (ContentKind::Mindmap, Some(Content::Mindmap(v))) => self.mindmap = Some(v),
            (ContentKind::Audio, Some(Content::Audio(v))) => self.audio_overview = Some(v),
            (ContentKind::Recommendations, Some(Content::Recommendations(v))) => {
                self.recommendations = Some(v)
            }
            _ => {}
        }
    }

    pub fn has_any_content(&self) -> bool {
        ContentKind::ALL.iter().any(|kind| self.content(*kind).is_some())
    }
}

/// The fields supplied when a learning space is created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewLearningSpace {
    pub user_id: String,
    pub topic: String,
    #[serde(default)]
    pub language: Language,
    #[serde(default)]
    pub pdf_source: Option<String>,
    #[serde(default)]
    pub audio_source: Option<String>,
}

//=========================================================================================
// Student Profile
//=========================================================================================

/// A student's learning preferences. The agent tailors every generation to
/// them; `language` is also the default for new learning spaces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentProfile {
    pub user_id: String,
    #[serde(default)]
    pub grade_level: String,
    #[serde(default)]
    pub language: Language,
    #[serde(default)]
    pub gender: String,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// The editable part of a profile. Saving it replaces every field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileUpdate {
    #[serde(default)]
    pub grade_level: String,
    #[serde(default)]
    pub language: Language,
    #[serde(default)]
    pub gender: String,
}

impl ProfileUpdate {
    /// Trims the free-text fields.
    pub fn normalized(&self) -> Self {
        Self {
            grade_level: self.grade_level.trim().to_string(),
            language: self.language,
            gender: self.gender.trim().to_string(),
        }
    }
}

//=========================================================================================
// Partial Updates
//=========================================================================================

/// A partial update of a learning-space row.
///
/// `None` leaves a column untouched; `Some(None)` writes `NULL`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpaceUpdate {
    pub topic: Option<String>,
    pub language: Option<Language>,
    pub pdf_source: Option<Option<String>>,
    pub audio_source: Option<Option<String>>,
    pub audio_script: Option<Option<String>>,
    pub content: Vec<(ContentKind, Option<Content>)>,
}

impl SpaceUpdate {
    pub fn language(language: Language) -> Self {
        Self {
            language: Some(language),
            ..Default::default()
        }
    }

    pub fn pdf_source(url: impl Into<String>) -> Self {
        Self {
            pdf_source: Some(Some(url.into())),
            ..Default::default()
        }
    }

    /// Nulls every generated-content column, including the audio script.
    pub fn clear_content() -> Self {
        Self {
            audio_script: Some(None),
            content: ContentKind::ALL.iter().map(|kind| (*kind, None)).collect(),
            ..Default::default()
        }
    }

    pub fn with_content(mut self, kind: ContentKind, content: Option<Content>) -> Self {
        self.content.retain(|(k, _)| *k != kind);
        self.content.push((kind, content));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.topic.is_none()
            && self.language.is_none()
            && self.pdf_source.is_none()
            && self.audio_source.is_none()
            && self.audio_script.is_none()
            && self.content.is_empty()
    }

    /// Names of the columns this update writes.
    pub fn columns(&self) -> Vec<&'static str> {
        let mut columns = Vec::new();
        if self.topic.is_some() {
            columns.push("topic");
        }
        if self.language.is_some() {
            columns.push("language");
        }
        if self.pdf_source.is_some() {
            columns.push("pdf_source");
        }
        if self.audio_source.is_some() {
            columns.push("audio_source");
        }
        if self.audio_script.is_some() {
            columns.push("audio_script");
        }
        columns.extend(self.content.iter().map(|(kind, _)| kind.column()));
        columns
    }

    /// Applies the update to an in-memory copy of the row.
    pub fn apply_to(&self, space: &mut LearningSpace) {
        if let Some(topic) = &self.topic {
            space.topic = topic.clone();
        }
        if let Some(language) = self.language {
            space.language = language;
        }
        if let Some(pdf) = &self.pdf_source {
            space.pdf_source = pdf.clone();
        }
        if let Some(audio) = &self.audio_source {
            space.audio_source = audio.clone();
        }
        if let Some(script) = &self.audio_script {
            space.audio_script = script.clone();
        }
        for (kind, content) in &self.content {
            space.set_content(*kind, content.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn language_parses_case_insensitively_and_defaults_to_english() {
        assert_eq!("tamil".parse::<Language>().unwrap(), Language::Tamil);
        assert_eq!(" Urdu ".parse::<Language>().unwrap(), Language::Urdu);
        assert!("Klingon".parse::<Language>().is_err());
        assert_eq!(Language::default(), Language::English);
    }

    #[test]
    fn quiz_uses_camel_case_answer_key_on_the_wire() {
        let value = json!({
            "title": "Cells",
            "questions": [{
                "question": "Powerhouse of the cell?",
                "options": {"A": "Nucleus", "B": "Mitochondria", "C": "Ribosome", "D": "Golgi"},
                "correctAnswer": "B",
                "hint": "Energy",
                "explanation": "ATP is produced there."
            }]
        });
        let content = Content::from_value(ContentKind::Quiz, value.clone()).unwrap().unwrap();
        match &content {
            Content::Quiz(quiz) => assert_eq!(quiz.questions[0].correct_answer, "B"),
            other => panic!("unexpected content {:?}", other),
        }
        assert_eq!(content.to_value(), value);
    }

    #[test]
    fn summary_notes_accept_text_and_structured_forms() {
        let text = Content::from_value(ContentKind::Summary, json!("# Notes")).unwrap();
        assert_eq!(text, Some(Content::Summary(SummaryNotes::Text("# Notes".into()))));

        let structured =
            Content::from_value(ContentKind::Summary, json!({"title": "T", "summary": "S"}))
                .unwrap();
        assert_eq!(
            structured,
            Some(Content::Summary(SummaryNotes::Structured {
                title: "T".into(),
                summary: "S".into()
            }))
        );
    }

    #[test]
    fn null_value_decodes_to_absent_content() {
        for kind in ContentKind::ALL {
            assert_eq!(Content::from_value(kind, Value::Null).unwrap(), None);
        }
    }

    #[test]
    fn clear_content_update_nulls_every_content_column() {
        let mut space: LearningSpace = serde_json::from_value(json!({
            "id": Uuid::new_v4(),
            "user_id": "user_1",
            "topic": "Photosynthesis",
            "summary_notes": "notes",
            "flashcards": [{"front": "f", "back": "b"}],
            "audio_overview": "https://cdn/a.mp3",
            "audio_script": "script",
            "mindmap": "https://cdn/m.png",
            "created_at": "2026-01-01T00:00:00Z"
        }))
        .unwrap();
        assert!(space.has_any_content());

        let update = SpaceUpdate::clear_content();
        update.apply_to(&mut space);

        assert!(!space.has_any_content());
        assert_eq!(space.audio_script, None);
        assert_eq!(space.topic, "Photosynthesis");
        assert!(update.columns().contains(&"audio_script"));
    }
}
