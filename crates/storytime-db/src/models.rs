/// Database row types. These map directly to SQLite rows.
/// Distinct from storytime-types API models to keep the DB layer independent.

#[derive(Debug, Clone, PartialEq)]
pub struct UserRow {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CategoryRow {
    pub id: i64,
    pub label: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UploadFileRow {
    pub id: i64,
    pub filename: String,
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct StoryRow {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub story_text: String,
    pub published: bool,
    pub date_created: String,
    pub date_last_modified: String,
    pub user_id: i64,
    pub image: Option<UploadFileRow>,
    pub categories: Vec<CategoryRow>,
}

/// Fields for a story insert. The upload file, if any, is inserted first and
/// its id passed alongside.
#[derive(Debug, Clone)]
pub struct NewStory {
    pub title: String,
    pub description: String,
    pub story_text: String,
    pub published: bool,
    pub user_id: i64,
}

/// Editable story fields.
#[derive(Debug, Clone)]
pub struct StoryChanges {
    pub title: String,
    pub description: String,
    pub story_text: String,
    pub published: bool,
}
