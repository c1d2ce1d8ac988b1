//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `LearningSpaceRepository` port from the `core` crate. It handles all
//! interactions with the PostgreSQL database using `sqlx`: the
//! `learning_space` rows and the `student_profile` rows.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use learning_space_core::domain::{
    Content, ContentKind, Language, LearningSpace, NewLearningSpace, ProfileUpdate, SpaceUpdate,
    StudentProfile,
};
use learning_space_core::ports::{LearningSpaceRepository, PortError, PortResult};
use serde_json::Value;
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use tracing::warn;
use uuid::Uuid;

const COLUMNS: &str = "id, user_id, topic, language, pdf_source, audio_source, summary_notes, \
     flashcards, quiz, recommendations, audio_overview, audio_script, mindmap, version, \
     created_at, updated_at";

const PROFILE_COLUMNS: &str = "user_id, grade_level, language, gender, updated_at";

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `LearningSpaceRepository` port.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }
}

fn db_error(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct LearningSpaceRecord {
    id: Uuid,
    user_id: String,
    topic: String,
    language: String,
    pdf_source: Option<String>,
    audio_source: Option<String>,
    summary_notes: Option<Value>,
    flashcards: Option<Value>,
    quiz: Option<Value>,
    recommendations: Option<Value>,
    audio_overview: Option<String>,
    audio_script: Option<String>,
    mindmap: Option<String>,
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: Option<DateTime<Utc>>,
}

impl LearningSpaceRecord {
    fn to_domain(self) -> LearningSpace {
        let language = self.language.parse::<Language>().unwrap_or_else(|e| {
            warn!(space_id = %self.id, "{}; falling back to English", e);
            Language::default()
        });
        let mut space = LearningSpace {
            id: self.id,
            user_id: self.user_id,
            topic: self.topic,
            language,
            pdf_source: self.pdf_source,
            audio_source: self.audio_source,
            summary_notes: None,
            flashcards: None,
            quiz: None,
            recommendations: None,
            audio_overview: self.audio_overview,
            audio_script: self.audio_script,
            mindmap: self.mindmap,
            version: self.version,
            created_at: self.created_at,
            updated_at: self.updated_at,
        };

        // A structured column that does not decode is treated as absent.
        let structured = [
            (ContentKind::Summary, self.summary_notes),
            (ContentKind::Flashcards, self.flashcards),
            (ContentKind::Quiz, self.quiz),
            (ContentKind::Recommendations, self.recommendations),
        ];
        for (kind, value) in structured {
            match value.map(|v| Content::from_value(kind, v)).transpose() {
                Ok(content) => space.set_content(kind, content.flatten()),
                Err(e) => warn!(space_id = %space.id, column = kind.column(), "Ignoring malformed content: {}", e),
            }
        }
        space
    }
}

#[derive(FromRow)]
struct StudentProfileRecord {
    user_id: String,
    grade_level: String,
    language: String,
    gender: String,
    updated_at: Option<DateTime<Utc>>,
}

impl StudentProfileRecord {
    fn to_domain(self) -> StudentProfile {
        // Profiles saved by older clients hold lower-case names ("english").
        let language = self.language.parse::<Language>().unwrap_or_else(|e| {
            warn!(user_id = %self.user_id, "{}; falling back to English", e);
            Language::default()
        });
        StudentProfile {
            user_id: self.user_id,
            grade_level: self.grade_level,
            language,
            gender: self.gender,
            updated_at: self.updated_at,
        }
    }
}

/// The value bound for a content column: JSON for structured kinds, text for URLs.
fn push_content(builder: &mut QueryBuilder<'_, Postgres>, kind: ContentKind, content: &Option<Content>) {
    if kind.is_structured() {
        builder.push_bind(content.as_ref().map(Content::to_value));
    } else {
        let url = content
            .as_ref()
            .and_then(|c| c.to_value().as_str().map(str::to_string));
        builder.push_bind(url);
    }
}

//=========================================================================================
// `LearningSpaceRepository` Trait Implementation
//=========================================================================================

#[async_trait]
impl LearningSpaceRepository for DbAdapter {
    async fn create(&self, new_space: NewLearningSpace) -> PortResult<LearningSpace> {
        let sql = format!(
            "INSERT INTO learning_space (user_id, topic, language, pdf_source, audio_source) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {}",
            COLUMNS
        );
        let record = sqlx::query_as::<_, LearningSpaceRecord>(&sql)
            .bind(&new_space.user_id)
            .bind(&new_space.topic)
            .bind(new_space.language.as_str())
            .bind(&new_space.pdf_source)
            .bind(&new_space.audio_source)
            .fetch_one(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(record.to_domain())
    }

    async fn get(&self, id: Uuid) -> PortResult<LearningSpace> {
        let sql = format!("SELECT {} FROM learning_space WHERE id = $1", COLUMNS);
        let record = sqlx::query_as::<_, LearningSpaceRecord>(&sql)
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| match e {
                sqlx::Error::RowNotFound => PortError::NotFound(format!("Learning space {} not found", id)),
                _ => db_error(e),
            })?;
        Ok(record.to_domain())
    }

    async fn list_by_user(&self, user_id: &str) -> PortResult<Vec<LearningSpace>> {
        let sql = format!(
            "SELECT {} FROM learning_space WHERE user_id = $1 ORDER BY created_at DESC",
            COLUMNS
        );
        let records = sqlx::query_as::<_, LearningSpaceRecord>(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn update(&self, id: Uuid, update: &SpaceUpdate) -> PortResult<LearningSpace> {
        let mut builder = QueryBuilder::<Postgres>::new("UPDATE learning_space SET updated_at = now()");
        if let Some(topic) = &update.topic {
            builder.push(", topic = ").push_bind(topic.clone());
        }
        if let Some(language) = update.language {
            builder.push(", language = ").push_bind(language.as_str());
        }
        if let Some(pdf_source) = &update.pdf_source {
            builder.push(", pdf_source = ").push_bind(pdf_source.clone());
        }
        if let Some(audio_source) = &update.audio_source {
            builder.push(", audio_source = ").push_bind(audio_source.clone());
        }
        if let Some(audio_script) = &update.audio_script {
            builder.push(", audio_script = ").push_bind(audio_script.clone());
        }
        for (kind, content) in &update.content {
            builder.push(format!(", {} = ", kind.column()));
            push_content(&mut builder, *kind, content);
        }
        builder
            .push(" WHERE id = ")
            .push_bind(id)
            .push(format!(" RETURNING {}", COLUMNS));

        let record = builder
            .build_query_as::<LearningSpaceRecord>()
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?
            .ok_or_else(|| PortError::NotFound(format!("Learning space {} not found", id)))?;
        Ok(record.to_domain())
    }

    async fn delete(&self, id: Uuid, user_id: &str) -> PortResult<()> {
        let result = sqlx::query("DELETE FROM learning_space WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Learning space {} not found", id)));
        }
        Ok(())
    }

    async fn get_profile(&self, user_id: &str) -> PortResult<Option<StudentProfile>> {
        let sql = format!("SELECT {} FROM student_profile WHERE user_id = $1", PROFILE_COLUMNS);
        let record = sqlx::query_as::<_, StudentProfileRecord>(&sql)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(record.map(StudentProfileRecord::to_domain))
    }

    async fn upsert_profile(&self, user_id: &str, profile: &ProfileUpdate) -> PortResult<StudentProfile> {
        let sql = format!(
            "INSERT INTO student_profile (user_id, grade_level, language, gender) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT (user_id) DO UPDATE SET grade_level = EXCLUDED.grade_level, \
             language = EXCLUDED.language, gender = EXCLUDED.gender, updated_at = now() \
             RETURNING {}",
            PROFILE_COLUMNS
        );
        let record = sqlx::query_as::<_, StudentProfileRecord>(&sql)
            .bind(user_id)
            .bind(&profile.grade_level)
            .bind(profile.language.as_str())
            .bind(&profile.gender)
            .fetch_one(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(record.to_domain())
    }
}
