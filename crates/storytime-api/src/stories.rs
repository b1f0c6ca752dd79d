//! Story mutations that pair a database transaction with upload-file side
//! effects.
//!
//! Physical files are written before the transaction and removed again if it
//! fails. Files being replaced are deleted only after the commit succeeds, so
//! a failed commit never loses the image a story still points at.

use anyhow::anyhow;
use tracing::{info, warn};

use storytime_db::models::{NewStory, StoryChanges, UploadFileRow};
use storytime_db::queries::{
    clear_story_categories, delete_story_row, delete_upload_file, insert_story,
    insert_upload_file, set_story_categories, set_story_upload_file, story_upload_file,
    touch_story, update_story_fields,
};

use crate::error::AppError;
use crate::state::{AppState, run_blocking};
use crate::storage::{ImageUpload, SavedFile};

/// User-editable story fields as submitted by the story form.
#[derive(Debug, Clone, Default)]
pub struct StoryInput {
    pub title: String,
    pub description: String,
    pub story_text: String,
    pub published: bool,
    pub category_ids: Vec<i64>,
}

impl StoryInput {
    /// Trims text fields, dedups categories and rejects blank required
    /// fields.
    pub fn normalized(mut self) -> Result<Self, AppError> {
        self.title = self.title.trim().to_string();
        self.description = self.description.trim().to_string();
        self.story_text = self.story_text.trim().to_string();
        self.category_ids.sort_unstable();
        self.category_ids.dedup();

        let mut missing = Vec::new();
        if self.title.is_empty() {
            missing.push("title");
        }
        if self.description.is_empty() {
            missing.push("description");
        }
        if self.story_text.is_empty() {
            missing.push("story text");
        }
        if !missing.is_empty() {
            return Err(AppError::Validation(format!(
                "Missing required fields: {}",
                missing.join(", ")
            )));
        }
        Ok(self)
    }

    fn changes(&self) -> StoryChanges {
        StoryChanges {
            title: self.title.clone(),
            description: self.description.clone(),
            story_text: self.story_text.clone(),
            published: self.published,
        }
    }
}

async fn check_categories(state: &AppState, category_ids: &[i64]) -> Result<(), AppError> {
    let wanted = category_ids.to_vec();
    let found = run_blocking(state, move |db| db.existing_category_ids(&wanted)).await?;
    if found.len() != category_ids.len() {
        return Err(AppError::Validation("Unknown category selected".into()));
    }
    Ok(())
}

async fn save_image(state: &AppState, image: Option<ImageUpload>) -> Result<Option<SavedFile>, AppError> {
    let Some(image) = image else {
        return Ok(None);
    };
    if state.uploads.allowed_extension(&image.original_filename).is_none() {
        return Err(AppError::Validation(format!(
            "'{}' is not an accepted image type",
            image.original_filename
        )));
    }
    let saved = state.uploads.save(&image.original_filename, &image.data).await?;
    Ok(Some(saved))
}

/// Remove a file saved for a mutation that didn't commit.
async fn discard(state: &AppState, saved: Option<SavedFile>) {
    if let Some(saved) = saved {
        if let Err(e) = state.uploads.delete(&saved.filename).await {
            warn!("Failed to discard upload {}: {}", saved.filename, e);
        }
    }
}

/// Remove the physical file of an upload row that was deleted and committed.
async fn remove_committed(state: &AppState, file: Option<UploadFileRow>) {
    if let Some(file) = file {
        if let Err(e) = state.uploads.delete(&file.filename).await {
            warn!("Orphaned upload {} could not be deleted: {}", file.filename, e);
        }
    }
}

pub async fn create_story(
    state: &AppState,
    owner_id: i64,
    input: StoryInput,
    image: Option<ImageUpload>,
) -> Result<i64, AppError> {
    let input = input.normalized()?;
    check_categories(state, &input.category_ids).await?;
    let saved = save_image(state, image).await?;

    let file = saved.clone();
    let story = NewStory {
        title: input.title.clone(),
        description: input.description.clone(),
        story_text: input.story_text.clone(),
        published: input.published,
        user_id: owner_id,
    };
    let category_ids = input.category_ids;

    let result = run_blocking(state, move |db| {
        db.transaction(|tx| {
            let upload_file_id = match &file {
                Some(file) => Some(insert_upload_file(tx, &file.filename, &file.url)?),
                None => None,
            };
            let story_id = insert_story(tx, &story, upload_file_id)?;
            set_story_categories(tx, story_id, &category_ids)?;
            Ok(story_id)
        })
    })
    .await;

    match result {
        Ok(story_id) => {
            info!("Story {} created by user {}", story_id, owner_id);
            Ok(story_id)
        }
        Err(e) => {
            discard(state, saved).await;
            Err(e)
        }
    }
}

/// Update a story's fields and categories, optionally removing or replacing
/// its image. A new image replaces the old one even when
/// `remove_existing_image` is false.
pub async fn update_story(
    state: &AppState,
    story_id: i64,
    input: StoryInput,
    remove_existing_image: bool,
    new_image: Option<ImageUpload>,
) -> Result<(), AppError> {
    let input = input.normalized()?;
    check_categories(state, &input.category_ids).await?;
    let saved = save_image(state, new_image).await?;

    let replace_image = remove_existing_image || saved.is_some();
    let file = saved.clone();
    let changes = input.changes();
    let category_ids = input.category_ids;

    let result = run_blocking(state, move |db| {
        db.transaction(|tx| {
            let old_file = if replace_image {
                story_upload_file(tx, story_id)?
            } else {
                None
            };

            if update_story_fields(tx, story_id, &changes)? == 0 {
                return Err(anyhow!("story {} disappeared during update", story_id));
            }

            if replace_image {
                let new_file_id = match &file {
                    Some(file) => Some(insert_upload_file(tx, &file.filename, &file.url)?),
                    None => None,
                };
                set_story_upload_file(tx, story_id, new_file_id)?;
                if let Some(old_file) = &old_file {
                    delete_upload_file(tx, old_file.id)?;
                }
            }

            touch_story(tx, story_id)?;
            set_story_categories(tx, story_id, &category_ids)?;
            Ok(old_file)
        })
    })
    .await;

    match result {
        Ok(old_file) => {
            remove_committed(state, old_file).await;
            info!("Story {} updated", story_id);
            Ok(())
        }
        Err(e) => {
            discard(state, saved).await;
            Err(e)
        }
    }
}

/// Permanently delete a story, its category links and its image.
pub async fn delete_story(state: &AppState, story_id: i64) -> Result<(), AppError> {
    let removed = run_blocking(state, move |db| {
        db.transaction(|tx| {
            let file = story_upload_file(tx, story_id)?;
            clear_story_categories(tx, story_id)?;
            if delete_story_row(tx, story_id)? == 0 {
                return Ok(None);
            }
            if let Some(file) = &file {
                delete_upload_file(tx, file.id)?;
            }
            Ok(Some(file))
        })
    })
    .await?;

    match removed {
        Some(file) => {
            remove_committed(state, file).await;
            info!("Story {} deleted", story_id);
            Ok(())
        }
        None => Err(AppError::NotFound),
    }
}
