use axum::{
    Json,
    extract::{Path, Query, State},
};
use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::warn;

use storytime_db::models::{CategoryRow, StoryRow};
use storytime_types::api::{
    CategoriesEnvelope, CategoryEnvelope, CategoryResponse, StoriesEnvelope, StoryEnvelope,
    StoryListQuery, StoryResponse,
};

use crate::error::AppError;
use crate::state::{AppState, run_blocking};

/// GET /api/stories[?category=id]: published stories, newest first.
pub async fn list_stories(
    State(state): State<AppState>,
    Query(query): Query<StoryListQuery>,
) -> Result<Json<StoriesEnvelope>, AppError> {
    // An unknown category simply has no stories.
    let stories = run_blocking(&state, move |db| match query.category {
        Some(id) => db.get_published_stories_by_category(id, None),
        None => db.get_published_stories(None),
    })
    .await?;

    Ok(Json(StoriesEnvelope {
        stories: stories.into_iter().map(story_response).collect(),
    }))
}

/// GET /api/stories/{id}
pub async fn get_story(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<StoryEnvelope>, AppError> {
    let story = run_blocking(&state, move |db| db.get_story_by_id(id))
        .await?
        .filter(|story| story.published)
        .ok_or(AppError::NotFound)?;

    Ok(Json(StoryEnvelope {
        story: story_response(story),
    }))
}

/// GET /api/categories
pub async fn list_categories(State(state): State<AppState>) -> Result<Json<CategoriesEnvelope>, AppError> {
    let categories = run_blocking(&state, |db| db.get_categories()).await?;
    Ok(Json(CategoriesEnvelope {
        categories: categories.into_iter().map(category_response).collect(),
    }))
}

/// GET /api/categories/{id}
pub async fn get_category(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<CategoryEnvelope>, AppError> {
    let category = run_blocking(&state, move |db| db.get_category_by_id(id))
        .await?
        .ok_or(AppError::NotFound)?;
    Ok(Json(CategoryEnvelope {
        category: category_response(category),
    }))
}

fn category_response(row: CategoryRow) -> CategoryResponse {
    CategoryResponse {
        id: row.id,
        label: row.label,
        description: row.description,
    }
}

fn story_response(row: StoryRow) -> StoryResponse {
    StoryResponse {
        date_created: parse_timestamp(&row.date_created, row.id),
        date_last_modified: parse_timestamp(&row.date_last_modified, row.id),
        id: row.id,
        title: row.title,
        description: row.description,
        story_text: row.story_text,
        user_id: row.user_id,
        categories: row.categories.into_iter().map(category_response).collect(),
    }
}

fn parse_timestamp(raw: &str, story_id: i64) -> DateTime<Utc> {
    raw.parse::<DateTime<Utc>>()
        .or_else(|_| {
            // SQLite's datetime('now') has no timezone; it is UTC.
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            warn!("Corrupt timestamp '{}' on story {}: {}", raw, story_id, e);
            DateTime::default()
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn parses_sqlite_and_rfc3339_timestamps() {
        let sqlite = parse_timestamp("2017-05-01 13:45:10", 1);
        assert_eq!((sqlite.year(), sqlite.month(), sqlite.hour()), (2017, 5, 13));

        let rfc = parse_timestamp("2017-05-01T13:45:10Z", 1);
        assert_eq!(rfc, sqlite);

        assert_eq!(parse_timestamp("yesterday", 1), DateTime::<Utc>::default());
    }
}
