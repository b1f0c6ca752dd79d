use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// -- Categories --

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CategoryResponse {
    pub id: i64,
    pub label: String,
    pub description: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CategoryEnvelope {
    #[serde(rename = "Category")]
    pub category: CategoryResponse,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CategoriesEnvelope {
    #[serde(rename = "Categories")]
    pub categories: Vec<CategoryResponse>,
}

// -- Stories --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoryResponse {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub story_text: String,
    pub user_id: i64,
    pub date_created: DateTime<Utc>,
    pub date_last_modified: DateTime<Utc>,
    pub categories: Vec<CategoryResponse>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StoryEnvelope {
    #[serde(rename = "Story")]
    pub story: StoryResponse,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StoriesEnvelope {
    #[serde(rename = "Stories")]
    pub stories: Vec<StoryResponse>,
}

#[derive(Debug, Default, Deserialize)]
pub struct StoryListQuery {
    pub category: Option<i64>,
}

// -- Errors --

/// JSON body returned for every failed `/api` request.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub status: u16,
    pub message: String,
    pub url: String,
}
