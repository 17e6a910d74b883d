//! Typed views of the two blog entity tables.

use crate::record::{Table, TableRecord};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// How far the author has progressed with the material a post covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LearningStatus {
    #[default]
    NotStarted,
    InProgress,
    Completed,
}

impl fmt::Display for LearningStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LearningStatus::NotStarted => write!(f, "not_started"),
            LearningStatus::InProgress => write!(f, "in_progress"),
            LearningStatus::Completed => write!(f, "completed"),
        }
    }
}

/// A blog post.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    /// Secondary index: posts by category.
    #[serde(default)]
    pub category_id: Option<String>,
    #[serde(default)]
    pub learning_status: LearningStatus,
    #[serde(default)]
    pub is_private: bool,
    /// Secondary index: posts by author.
    #[serde(default)]
    pub author_id: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Post {
    /// Creates a post with a fresh client-side UUID.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            title: title.into(),
            description: None,
            content: None,
            category_id: None,
            learning_status: LearningStatus::NotStarted,
            is_private: false,
            author_id: None,
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    pub fn with_category(mut self, category_id: impl Into<String>) -> Self {
        self.category_id = Some(category_id.into());
        self
    }

    pub fn with_author(mut self, author_id: impl Into<String>) -> Self {
        self.author_id = Some(author_id.into());
        self
    }

    pub fn with_status(mut self, status: LearningStatus) -> Self {
        self.learning_status = status;
        self
    }
}

impl TableRecord for Post {
    const TABLE: Table = Table::Posts;

    fn record_id(&self) -> &str {
        &self.id
    }
}

/// A post category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Category {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            description: None,
            created_at: Utc::now(),
        }
    }
}

impl TableRecord for Category {
    const TABLE: Table = Table::Categories;

    fn record_id(&self) -> &str {
        &self.id
    }
}
