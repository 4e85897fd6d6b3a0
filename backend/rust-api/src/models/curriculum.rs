use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::quiz::WeakTopic;
use super::user::UserSummary;
use super::{bson_datetime_as_chrono, SortOrder};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Beginner,
    Intermediate,
    Advanced,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Beginner => "beginner",
            Difficulty::Intermediate => "intermediate",
            Difficulty::Advanced => "advanced",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Depth {
    Brief,
    Moderate,
    Comprehensive,
}

impl Depth {
    pub fn as_str(&self) -> &'static str {
        match self {
            Depth::Brief => "brief",
            Depth::Moderate => "moderate",
            Depth::Comprehensive => "comprehensive",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Lesson {
    pub title: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CurriculumModule {
    pub title: String,
    #[serde(default)]
    pub lessons: Vec<Lesson>,
}

/// Summary of the latest quiz outcome, overwritten on every submission
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
    pub score: f64,
    pub total_quizzes: u32,
}

/// Curriculum stored in the "curricula" collection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Curriculum {
    #[serde(rename = "_id")]
    pub id: String,
    pub user_id: String,
    pub topic: String,
    pub difficulty: Difficulty,
    pub depth: Depth,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub modules: Vec<CurriculumModule>,
    #[serde(default)]
    pub progress: Option<Progress>,
    #[serde(default)]
    pub focus_areas: Vec<WeakTopic>,
    #[serde(rename = "createdAt", with = "bson_datetime_as_chrono")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt", with = "bson_datetime_as_chrono")]
    pub updated_at: DateTime<Utc>,
}

/// Payload produced by the AI for a curriculum
#[derive(Debug, Clone, Deserialize)]
pub struct GeneratedCurriculum {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub modules: Vec<CurriculumModule>,
}

/// Partial update applied by the owner
#[derive(Debug, Clone, Default)]
pub struct CurriculumUpdate {
    pub title: Option<String>,
    pub progress: Option<Progress>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateCurriculumRequest {
    #[validate(length(min = 1, message = "Topic is required"))]
    pub topic: String,
    pub difficulty: Difficulty,
    pub depth: Depth,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateCurriculumRequest {
    #[validate(length(min = 1, message = "Title cannot be empty"))]
    pub title: Option<String>,
    pub progress: Option<Progress>,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum CurriculumSortField {
    #[default]
    CreatedAt,
    UpdatedAt,
    Title,
}

/// GET /curriculum
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListCurriculaQuery {
    pub search: Option<String>,
    pub difficulty: Option<Difficulty>,
    pub sort_by: Option<CurriculumSortField>,
    pub order: Option<SortOrder>,
}

/// GET /admin/curriculum
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminListCurriculaQuery {
    pub search: Option<String>,
    pub user_id: Option<String>,
    pub sort_by: Option<CurriculumSortField>,
    pub order: Option<SortOrder>,
    pub page: Option<String>,
    pub limit: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CurriculumView {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub description: Option<String>,
    pub topic: String,
    pub difficulty: Difficulty,
    pub depth: Depth,
    pub modules: Vec<CurriculumModule>,
    pub progress: Option<Progress>,
    pub focus_areas: Vec<WeakTopic>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Curriculum> for CurriculumView {
    fn from(c: Curriculum) -> Self {
        CurriculumView {
            id: c.id,
            user_id: c.user_id,
            title: c.title,
            description: c.description,
            topic: c.topic,
            difficulty: c.difficulty,
            depth: c.depth,
            modules: c.modules,
            progress: c.progress,
            focus_areas: c.focus_areas,
            created_at: c.created_at,
            updated_at: c.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizStub {
    pub id: String,
    pub created_at: DateTime<Utc>,
}

/// GET /curriculum/{id}
#[derive(Debug, Serialize)]
pub struct CurriculumDetail {
    #[serde(flatten)]
    pub curriculum: CurriculumView,
    pub quizzes: Vec<QuizStub>,
}

#[derive(Debug, Serialize)]
pub struct QuizCount {
    pub quizzes: u64,
}

/// Row of GET /admin/curriculum
#[derive(Debug, Serialize)]
pub struct AdminCurriculumSummary {
    #[serde(flatten)]
    pub curriculum: CurriculumView,
    pub user: Option<UserSummary>,
    #[serde(rename = "_count")]
    pub count: QuizCount,
}

/// Entry of `recentCurricula` in GET /admin/stats
#[derive(Debug, Serialize)]
pub struct RecentCurriculum {
    #[serde(flatten)]
    pub curriculum: CurriculumView,
    pub user: Option<UserSummary>,
}
