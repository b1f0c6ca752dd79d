use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

use crate::models::NewStory;
use crate::queries::{insert_category, insert_story, set_story_categories};
use crate::Database;

const PLACEHOLDER_TEXT: &str = "Lorem ipsum dolor sit amet, consectetur adipiscing elit. \
Sed do eiusmod tempor incididunt ut labore et dolore magna aliqua. Ut enim ad minim veniam, \
quis nostrud exercitation ullamco laboris nisi ut aliquip ex ea commodo consequat.";

#[derive(Debug, Default, PartialEq, Eq)]
pub struct SeedSummary {
    pub users: usize,
    pub categories: usize,
    pub stories: usize,
}

/// Wipes users, categories and stories, then recreates the sample data set
/// used for development and tests. Runs as a single transaction.
pub fn seed_sample_data(db: &Database) -> Result<SeedSummary> {
    let summary = db.transaction(|tx| {
        let deleted = delete_all(tx)?;
        info!("Deleted {} stories before seeding", deleted);
        create_sample_data(tx)
    })?;

    info!(
        "Seeded {} users, {} categories, {} stories",
        summary.users, summary.categories, summary.stories
    );
    Ok(summary)
}

fn delete_all(conn: &Connection) -> Result<usize> {
    conn.execute("DELETE FROM story_category", [])?;
    let stories = conn.execute("DELETE FROM story", [])?;
    conn.execute("DELETE FROM upload_file", [])?;
    conn.execute("DELETE FROM category", [])?;
    conn.execute("DELETE FROM sec_user", [])?;
    Ok(stories)
}

fn create_sample_data(conn: &Connection) -> Result<SeedSummary> {
    let mut summary = SeedSummary::default();

    let mut users = Vec::new();
    for (name, email) in [
        ("gregdferrell", "gferrell20@gmail.com"),
        ("Jane Doe", "janedoe@email.com"),
        ("John Smith", "jonsmith@email.com"),
    ] {
        conn.execute(
            "INSERT INTO sec_user (name, email, active) VALUES (?1, ?2, 1)",
            (name, email),
        )?;
        users.push(conn.last_insert_rowid());
    }
    summary.users = users.len();

    let scary = insert_category(conn, "Scary", Some("Scary stories!"))?;
    let funny = insert_category(conn, "Funny", Some("Funny stories!"))?;
    let animals = insert_category(conn, "Animals", Some("Stories about animals!"))?;
    let musical = insert_category(conn, "Musical", Some("Stories that can be sung to music!"))?;
    let history = insert_category(
        conn,
        "History",
        Some("Stories based on true historical events."),
    )?;
    summary.categories = 5;

    let stories: [(&str, &str, i64, Vec<i64>); 5] = [
        (
            "Animal Escape",
            "See how all the animals escape from the zoo!",
            users[0],
            vec![funny, animals],
        ),
        (
            "Fresh Prince",
            "A tune from the prince himself!",
            users[1],
            vec![funny, musical],
        ),
        (
            "The Big Bad Wolf",
            "A story about a scary wolf in the woods!",
            users[0],
            vec![scary],
        ),
        (
            "Americans vs Pirates",
            "A story about the young American country's fight with the Tripoli pirates.",
            users[2],
            vec![history],
        ),
        (
            "Benjamin Franklin",
            "A not so well known story about one of America's founding fathers, Benjamin Franklin.",
            users[2],
            vec![history],
        ),
    ];

    for (title, description, user_id, categories) in stories {
        let id = insert_story(
            conn,
            &NewStory {
                title: title.to_string(),
                description: description.to_string(),
                story_text: PLACEHOLDER_TEXT.to_string(),
                published: true,
                user_id,
            },
            None,
        )?;
        set_story_categories(conn, id, &categories)?;
        summary.stories += 1;
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reseeding_replaces_previous_data() {
        let db = Database::open_in_memory().unwrap();
        let first = seed_sample_data(&db).unwrap();
        let second = seed_sample_data(&db).unwrap();
        assert_eq!(first, second);
        assert_eq!(
            second,
            SeedSummary {
                users: 3,
                categories: 5,
                stories: 5
            }
        );
        assert_eq!(db.get_published_stories(None).unwrap().len(), 5);
    }
}
