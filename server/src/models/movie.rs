use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Movie {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub genre: String,
    pub poster_image: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Body of the create and update movie endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct MovieInput {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub genre: String,
    #[serde(default)]
    pub poster_image: String,
}

impl MovieInput {
    pub fn validate(&self) -> Result<(), String> {
        if self.title.trim().is_empty() {
            return Err("Movie title must not be empty".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct MovieFilter {
    pub genre: Option<String>,
}
