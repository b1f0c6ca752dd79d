//! Reset the database to the sample data set.

use std::path::Path;

use tracing::info;

use storytime_db::Database;
use storytime_db::seed::seed_sample_data;

fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    storytime_server::init_tracing();

    let db_path = std::env::var("STORYTIME_DB_PATH").unwrap_or_else(|_| "storytime.db".into());
    let db = Database::open(Path::new(&db_path))?;

    let summary = seed_sample_data(&db)?;
    info!(
        "Sample data ready in {}: {} users, {} categories, {} stories",
        db_path, summary.users, summary.categories, summary.stories
    );
    Ok(())
}
