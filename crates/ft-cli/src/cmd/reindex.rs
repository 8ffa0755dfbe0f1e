use crate::output::{print_json, print_list};
use anyhow::Context;
use ft_core::store;
use std::path::Path;

pub fn run(root: &Path, json: bool) -> anyhow::Result<()> {
    let (index, skipped) = store::rebuild_index(root).context("failed to rebuild index")?;

    if json {
        print_json(&serde_json::json!({
            "feats": index.feats,
            "skipped": skipped,
        }))?;
    } else {
        println!("Rebuilt index: {} feat(s)", index.feats.len());
        print_list("Skipped (unreadable state or wrong store)", &skipped);
    }
    Ok(())
}
