use std::collections::HashMap;

use crate::models::{CategoryRow, NewStory, StoryChanges, StoryRow, UploadFileRow, UserRow};
use crate::Database;
use anyhow::Result;
use rusqlite::types::Value;
use rusqlite::{Connection, Row};

const STORY_SELECT: &str = "
    SELECT s.id, s.title, s.description, s.story_text, s.published,
           s.date_created, s.date_last_modified, s.user_id,
           f.id, f.filename, f.url
    FROM story s
    LEFT JOIN upload_file f ON f.id = s.upload_file_id";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StoryOrder {
    /// Newest first by creation time.
    #[default]
    Created,
    /// Most recently edited first.
    LastModified,
}

/// Filter for story listings. Every populated field narrows the result.
#[derive(Debug, Clone, Default)]
pub struct StoryFilter {
    pub published_only: bool,
    pub category_id: Option<i64>,
    pub user_id: Option<i64>,
    pub order: StoryOrder,
    pub limit: Option<u32>,
}

impl StoryFilter {
    pub fn published() -> Self {
        Self {
            published_only: true,
            ..Default::default()
        }
    }

    pub fn in_category(mut self, category_id: i64) -> Self {
        self.category_id = Some(category_id);
        self
    }

    pub fn by_user(mut self, user_id: i64) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn limit(mut self, limit: Option<u32>) -> Self {
        self.limit = limit;
        self
    }
}

impl Database {
    // -- Users --

    pub fn create_user(&self, name: &str, email: &str, active: bool) -> Result<i64> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO sec_user (name, email, active) VALUES (?1, ?2, ?3)",
                rusqlite::params![name, email, active],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn get_user(&self, id: i64) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, name, email, active FROM sec_user WHERE id = ?1",
                [id],
                map_user_row,
            )
            .optional()
        })
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, name, email, active FROM sec_user WHERE email = ?1",
                [email],
                map_user_row,
            )
            .optional()
        })
    }

    pub fn get_user_id_by_email(&self, email: &str) -> Result<Option<i64>> {
        Ok(self.get_user_by_email(email)?.map(|user| user.id))
    }

    // -- Categories --

    pub fn create_category(&self, label: &str, description: Option<&str>) -> Result<i64> {
        self.with_conn(|conn| insert_category(conn, label, description))
    }

    /// All categories, alphabetically by label.
    pub fn get_categories(&self) -> Result<Vec<CategoryRow>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT id, label, description FROM category ORDER BY label ASC")?;
            let rows = stmt
                .query_map([], map_category_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn get_category_by_id(&self, id: i64) -> Result<Option<CategoryRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, label, description FROM category WHERE id = ?1",
                [id],
                map_category_row,
            )
            .optional()
        })
    }

    pub fn get_category_by_label(&self, label: &str) -> Result<Option<CategoryRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, label, description FROM category WHERE label = ?1",
                [label],
                map_category_row,
            )
            .optional()
        })
    }

    /// Ids from `ids` that name an existing category.
    pub fn existing_category_ids(&self, ids: &[i64]) -> Result<Vec<i64>> {
        if ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let placeholders: Vec<String> = (1..=ids.len()).map(|i| format!("?{}", i)).collect();
            let sql = format!(
                "SELECT id FROM category WHERE id IN ({})",
                placeholders.join(", ")
            );
            let mut stmt = conn.prepare(&sql)?;
            let found = stmt
                .query_map(rusqlite::params_from_iter(ids.iter()), |row| row.get(0))?
                .collect::<std::result::Result<Vec<i64>, _>>()?;
            Ok(found)
        })
    }

    // -- Stories --

    pub fn get_story_by_id(&self, id: i64) -> Result<Option<StoryRow>> {
        self.with_conn(|conn| query_story_by_id(conn, id))
    }

    pub fn find_stories(&self, filter: &StoryFilter) -> Result<Vec<StoryRow>> {
        self.with_conn(|conn| query_stories(conn, filter))
    }

    pub fn get_published_stories(&self, limit: Option<u32>) -> Result<Vec<StoryRow>> {
        self.find_stories(&StoryFilter::published().limit(limit))
    }

    pub fn get_published_stories_by_category(
        &self,
        category_id: i64,
        limit: Option<u32>,
    ) -> Result<Vec<StoryRow>> {
        self.find_stories(&StoryFilter::published().in_category(category_id).limit(limit))
    }

    /// Every story the user owns, drafts included, most recently edited first.
    pub fn get_stories_by_user_id(&self, user_id: i64) -> Result<Vec<StoryRow>> {
        let filter = StoryFilter {
            order: StoryOrder::LastModified,
            ..Default::default()
        }
        .by_user(user_id);
        self.find_stories(&filter)
    }

    /// Picks one published story at random; `None` when nothing is published.
    pub fn get_random_published_story(&self) -> Result<Option<StoryRow>> {
        self.with_conn(|conn| {
            let id: Option<i64> = conn
                .query_row(
                    "SELECT id FROM story WHERE published = 1 ORDER BY random() LIMIT 1",
                    [],
                    |row| row.get(0),
                )
                .optional()?;

            match id {
                Some(id) => query_story_by_id(conn, id),
                None => Ok(None),
            }
        })
    }
}

// -- Transaction steps --
//
// Building blocks for multi-step story mutations. They take a bare
// connection so they can run inside `Database::transaction`.

pub fn insert_category(conn: &Connection, label: &str, description: Option<&str>) -> Result<i64> {
    conn.execute(
        "INSERT INTO category (label, description) VALUES (?1, ?2)",
        rusqlite::params![label, description],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn insert_upload_file(conn: &Connection, filename: &str, url: &str) -> Result<i64> {
    conn.execute(
        "INSERT INTO upload_file (filename, url) VALUES (?1, ?2)",
        (filename, url),
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn delete_upload_file(conn: &Connection, id: i64) -> Result<()> {
    conn.execute("DELETE FROM upload_file WHERE id = ?1", [id])?;
    Ok(())
}

/// The upload file currently attached to a story, if any.
pub fn story_upload_file(conn: &Connection, story_id: i64) -> Result<Option<UploadFileRow>> {
    conn.query_row(
        "SELECT f.id, f.filename, f.url
         FROM story s
         JOIN upload_file f ON f.id = s.upload_file_id
         WHERE s.id = ?1",
        [story_id],
        |row| {
            Ok(UploadFileRow {
                id: row.get(0)?,
                filename: row.get(1)?,
                url: row.get(2)?,
            })
        },
    )
    .optional()
}

pub fn insert_story(conn: &Connection, story: &NewStory, upload_file_id: Option<i64>) -> Result<i64> {
    conn.execute(
        "INSERT INTO story (title, description, story_text, published, user_id, upload_file_id)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        rusqlite::params![
            story.title,
            story.description,
            story.story_text,
            story.published,
            story.user_id,
            upload_file_id,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Returns the number of rows touched; zero means the story doesn't exist.
pub fn update_story_fields(conn: &Connection, id: i64, changes: &StoryChanges) -> Result<usize> {
    let updated = conn.execute(
        "UPDATE story SET title = ?1, description = ?2, story_text = ?3, published = ?4
         WHERE id = ?5",
        rusqlite::params![
            changes.title,
            changes.description,
            changes.story_text,
            changes.published,
            id,
        ],
    )?;
    Ok(updated)
}

pub fn set_story_upload_file(conn: &Connection, id: i64, upload_file_id: Option<i64>) -> Result<()> {
    conn.execute(
        "UPDATE story SET upload_file_id = ?1 WHERE id = ?2",
        rusqlite::params![upload_file_id, id],
    )?;
    Ok(())
}

pub fn touch_story(conn: &Connection, id: i64) -> Result<()> {
    conn.execute(
        "UPDATE story SET date_last_modified = datetime('now') WHERE id = ?1",
        [id],
    )?;
    Ok(())
}

pub fn clear_story_categories(conn: &Connection, story_id: i64) -> Result<()> {
    conn.execute("DELETE FROM story_category WHERE story_id = ?1", [story_id])?;
    Ok(())
}

/// Replaces the story's category links with `category_ids`.
pub fn set_story_categories(conn: &Connection, story_id: i64, category_ids: &[i64]) -> Result<()> {
    clear_story_categories(conn, story_id)?;
    let mut stmt = conn.prepare(
        "INSERT OR IGNORE INTO story_category (story_id, category_id) VALUES (?1, ?2)",
    )?;
    for category_id in category_ids {
        stmt.execute([story_id, *category_id])?;
    }
    Ok(())
}

/// Returns the number of rows deleted.
pub fn delete_story_row(conn: &Connection, id: i64) -> Result<usize> {
    Ok(conn.execute("DELETE FROM story WHERE id = ?1", [id])?)
}

pub fn story_category_count(conn: &Connection, story_id: i64) -> Result<i64> {
    Ok(conn.query_row(
        "SELECT COUNT(*) FROM story_category WHERE story_id = ?1",
        [story_id],
        |row| row.get(0),
    )?)
}

// -- Row mapping --

fn map_user_row(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        active: row.get(3)?,
    })
}

fn map_category_row(row: &Row<'_>) -> rusqlite::Result<CategoryRow> {
    Ok(CategoryRow {
        id: row.get(0)?,
        label: row.get(1)?,
        description: row.get(2)?,
    })
}

fn map_story_row(row: &Row<'_>) -> rusqlite::Result<StoryRow> {
    let image = match row.get::<_, Option<i64>>(8)? {
        Some(id) => Some(UploadFileRow {
            id,
            filename: row.get(9)?,
            url: row.get(10)?,
        }),
        None => None,
    };

    Ok(StoryRow {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        story_text: row.get(3)?,
        published: row.get(4)?,
        date_created: row.get(5)?,
        date_last_modified: row.get(6)?,
        user_id: row.get(7)?,
        image,
        categories: Vec::new(),
    })
}

fn query_story_by_id(conn: &Connection, id: i64) -> Result<Option<StoryRow>> {
    let sql = format!("{} WHERE s.id = ?1", STORY_SELECT);
    let story = conn.query_row(&sql, [id], map_story_row).optional()?;

    match story {
        Some(story) => {
            let mut stories = vec![story];
            attach_categories(conn, &mut stories)?;
            Ok(stories.pop())
        }
        None => Ok(None),
    }
}

fn query_stories(conn: &Connection, filter: &StoryFilter) -> Result<Vec<StoryRow>> {
    let mut clauses: Vec<String> = Vec::new();
    let mut params: Vec<Value> = Vec::new();

    if filter.published_only {
        clauses.push("s.published = 1".to_string());
    }
    if let Some(category_id) = filter.category_id {
        params.push(Value::Integer(category_id));
        clauses.push(format!(
            "EXISTS (SELECT 1 FROM story_category sc WHERE sc.story_id = s.id AND sc.category_id = ?{})",
            params.len()
        ));
    }
    if let Some(user_id) = filter.user_id {
        params.push(Value::Integer(user_id));
        clauses.push(format!("s.user_id = ?{}", params.len()));
    }

    let mut sql = String::from(STORY_SELECT);
    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }
    sql.push_str(match filter.order {
        StoryOrder::Created => " ORDER BY s.date_created DESC, s.id DESC",
        StoryOrder::LastModified => " ORDER BY s.date_last_modified DESC, s.id DESC",
    });
    if let Some(limit) = filter.limit {
        params.push(Value::Integer(i64::from(limit)));
        sql.push_str(&format!(" LIMIT ?{}", params.len()));
    }

    let mut stmt = conn.prepare(&sql)?;
    let mut stories = stmt
        .query_map(rusqlite::params_from_iter(params.iter()), map_story_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    attach_categories(conn, &mut stories)?;
    Ok(stories)
}

/// Batch-load category links for a set of stories (one query, no N+1).
fn attach_categories(conn: &Connection, stories: &mut [StoryRow]) -> Result<()> {
    if stories.is_empty() {
        return Ok(());
    }

    let placeholders: Vec<String> = (1..=stories.len()).map(|i| format!("?{}", i)).collect();
    let sql = format!(
        "SELECT sc.story_id, c.id, c.label, c.description
         FROM story_category sc
         JOIN category c ON c.id = sc.category_id
         WHERE sc.story_id IN ({})
         ORDER BY c.label ASC",
        placeholders.join(", ")
    );

    let mut stmt = conn.prepare(&sql)?;
    let ids: Vec<i64> = stories.iter().map(|s| s.id).collect();
    let links = stmt
        .query_map(rusqlite::params_from_iter(ids.iter()), |row| {
            Ok((
                row.get::<_, i64>(0)?,
                CategoryRow {
                    id: row.get(1)?,
                    label: row.get(2)?,
                    description: row.get(3)?,
                },
            ))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut by_story: HashMap<i64, Vec<CategoryRow>> = HashMap::new();
    for (story_id, category) in links {
        by_story.entry(story_id).or_default().push(category);
    }
    for story in stories.iter_mut() {
        story.categories = by_story.remove(&story.id).unwrap_or_default();
    }

    Ok(())
}

/// Extension trait for optional query results
pub(crate) trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
