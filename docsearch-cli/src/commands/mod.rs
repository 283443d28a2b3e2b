pub mod admin;
pub mod reindex;
pub mod search;

pub use admin::{run_drop, run_exists};
pub use reindex::{run_reindex, DocumentSource};
pub use search::{run_count, run_cover, run_get, run_search, run_suggest};

use anyhow::Result;
use serde::Serialize;

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
