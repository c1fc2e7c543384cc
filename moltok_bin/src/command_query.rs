use anyhow::{Context, Result};
use moltok::prelude::*;
use std::path::Path;

pub(super) fn command_query(token_map: &Path, frame: usize) -> Result<()> {
    let query = TokenQuery::load(token_map)
        .with_context(|| format!("loading token map '{}'", token_map.display()))?;

    let value = match query.frame(frame) {
        Ok(tokens) => serde_json::to_value(tokens)?,
        Err(e) => serde_json::json!({ "error": e.to_string() }),
    };
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}
