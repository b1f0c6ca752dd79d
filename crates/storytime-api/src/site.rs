use axum::{
    Form,
    extract::{Multipart, Path, Query, State, multipart::MultipartError},
    http::HeaderMap,
    response::{Html, Redirect},
};
use serde::Deserialize;

use storytime_db::models::StoryRow;
use storytime_types::api::StoryListQuery;

use crate::error::AppError;
use crate::middleware::verify_form_token;
use crate::session::Session;
use crate::state::{AppState, run_blocking};
use crate::storage::ImageUpload;
use crate::stories::{self, StoryInput};
use crate::views;

/// Stories shown on the home page.
const INDEX_LIMIT: u32 = 20;

/// GET /: latest published stories, optionally within one category.
pub async fn index(
    State(state): State<AppState>,
    session: Session,
    Query(query): Query<StoryListQuery>,
) -> Result<Html<String>, AppError> {
    let category_id = query.category;
    let (stories, categories, selected) = run_blocking(&state, move |db| {
        let categories = db.get_categories()?;
        let selected = category_id.and_then(|id| categories.iter().find(|c| c.id == id).cloned());
        let stories = match category_id {
            Some(id) => db.get_published_stories_by_category(id, Some(INDEX_LIMIT))?,
            None => db.get_published_stories(Some(INDEX_LIMIT))?,
        };
        Ok((stories, categories, selected))
    })
    .await?;

    Ok(Html(views::index_page(
        session.current_user().as_ref(),
        &stories,
        &categories,
        selected.as_ref(),
    )))
}

/// GET /dashboard: every story of the logged-in user, drafts included.
pub async fn dashboard(State(state): State<AppState>, session: Session) -> Result<Html<String>, AppError> {
    let user = session
        .current_user()
        .ok_or(AppError::Unauthorized("You must be logged in to view this page."))?;
    let user_id = user.user_id;
    let stories = run_blocking(&state, move |db| db.get_stories_by_user_id(user_id)).await?;
    Ok(Html(views::dashboard_page(&user, &stories, &session.csrf_token())))
}

/// GET /stories/{id}: unpublished stories are visible to their owner only.
pub async fn story_detail(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<i64>,
) -> Result<Html<String>, AppError> {
    let story = load_story(&state, id).await?;
    let is_owner = session.user_id() == Some(story.user_id);
    if !story.published && !is_owner {
        return Err(AppError::NotFound);
    }
    Ok(render_story(&session, &story, is_owner))
}

/// GET /stories/random
pub async fn random_story(State(state): State<AppState>, session: Session) -> Result<Html<String>, AppError> {
    let story = run_blocking(&state, |db| db.get_random_published_story())
        .await?
        .ok_or(AppError::NotFound)?;
    let is_owner = session.user_id() == Some(story.user_id);
    Ok(render_story(&session, &story, is_owner))
}

fn render_story(session: &Session, story: &StoryRow, is_owner: bool) -> Html<String> {
    let token = is_owner.then(|| session.csrf_token());
    Html(views::story_page(
        session.current_user().as_ref(),
        story,
        token.as_deref(),
    ))
}

/// GET /stories/create
pub async fn new_story(State(state): State<AppState>, session: Session) -> Result<Html<String>, AppError> {
    let user = session
        .current_user()
        .ok_or(AppError::Unauthorized("You must be logged in to do that."))?;
    let categories = run_blocking(&state, |db| db.get_categories()).await?;
    Ok(Html(views::story_form_page(&user, None, &categories, &session.csrf_token())))
}

/// POST /stories/create
pub async fn create_story(
    State(state): State<AppState>,
    session: Session,
    headers: HeaderMap,
    multipart: Multipart,
) -> Result<Redirect, AppError> {
    let user_id = session.do_authorization(None)?;
    let form = read_story_form(multipart).await?;
    verify_form_token(&session, &headers, form.csrf_token.as_deref())?;

    stories::create_story(&state, user_id, form.input, form.image).await?;
    Ok(Redirect::to("/dashboard"))
}

/// GET /stories/{id}/edit
pub async fn edit_story(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<i64>,
) -> Result<Html<String>, AppError> {
    let story = load_story(&state, id).await?;
    session.do_authorization(Some(story.user_id))?;
    let user = session
        .current_user()
        .ok_or(AppError::Unauthorized("You must be logged in to do that."))?;

    let categories = run_blocking(&state, |db| db.get_categories()).await?;
    Ok(Html(views::story_form_page(
        &user,
        Some(&story),
        &categories,
        &session.csrf_token(),
    )))
}

/// POST /stories/{id}/edit
pub async fn update_story(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<i64>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Result<Redirect, AppError> {
    let story = load_story(&state, id).await?;
    session.do_authorization(Some(story.user_id))?;
    let form = read_story_form(multipart).await?;
    verify_form_token(&session, &headers, form.csrf_token.as_deref())?;

    stories::update_story(&state, id, form.input, form.remove_image, form.image).await?;
    Ok(Redirect::to("/dashboard"))
}

#[derive(Debug, Deserialize)]
pub struct DeleteForm {
    csrf_token: Option<String>,
}

/// POST /stories/{id}/delete
pub async fn delete_story(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<i64>,
    headers: HeaderMap,
    Form(form): Form<DeleteForm>,
) -> Result<Redirect, AppError> {
    let story = load_story(&state, id).await?;
    session.do_authorization(Some(story.user_id))?;
    verify_form_token(&session, &headers, form.csrf_token.as_deref())?;

    stories::delete_story(&state, id).await?;
    Ok(Redirect::to("/dashboard"))
}

async fn load_story(state: &AppState, id: i64) -> Result<StoryRow, AppError> {
    run_blocking(state, move |db| db.get_story_by_id(id))
        .await?
        .ok_or(AppError::NotFound)
}

// ── Story form ──────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct StoryForm {
    input: StoryInput,
    image: Option<ImageUpload>,
    remove_image: bool,
    csrf_token: Option<String>,
}

fn bad_form(e: MultipartError) -> AppError {
    AppError::Validation(format!("Malformed form data: {}", e))
}

async fn read_story_form(mut multipart: Multipart) -> Result<StoryForm, AppError> {
    let mut form = StoryForm::default();

    while let Some(field) = multipart.next_field().await.map_err(bad_form)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "image" => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let data = field.bytes().await.map_err(bad_form)?;
                // An empty file input still submits a nameless part.
                if !filename.is_empty() && !data.is_empty() {
                    form.image = Some(ImageUpload {
                        original_filename: filename,
                        data: data.to_vec(),
                    });
                }
            }
            "categories" => {
                let value = field.text().await.map_err(bad_form)?;
                let id = value
                    .trim()
                    .parse::<i64>()
                    .map_err(|_| AppError::Validation(format!("Invalid category '{}'", value)))?;
                form.input.category_ids.push(id);
            }
            "title" => form.input.title = field.text().await.map_err(bad_form)?,
            "description" => form.input.description = field.text().await.map_err(bad_form)?,
            "story_text" => form.input.story_text = field.text().await.map_err(bad_form)?,
            "published" => {
                form.input.published = is_checked(&field.text().await.map_err(bad_form)?)
            }
            "remove_image" => form.remove_image = is_checked(&field.text().await.map_err(bad_form)?),
            "csrf_token" => form.csrf_token = Some(field.text().await.map_err(bad_form)?),
            _ => {}
        }
    }

    Ok(form)
}

fn is_checked(value: &str) -> bool {
    !matches!(value.trim(), "" | "0" | "false" | "off")
}
