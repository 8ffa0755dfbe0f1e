use crate::output::{print_json, print_list};
use anyhow::Context;
use ft_core::validate;
use std::path::Path;

pub fn run(root: &Path, json: bool) -> anyhow::Result<()> {
    let report = validate::validate_all(root).context("failed to run validation")?;

    if json {
        print_json(&report)?;
    } else if report.is_ok() {
        println!("OK: {} feat(s) checked, no drift found.", report.feats_checked);
    } else {
        println!(
            "FAIL: {} error(s) across {} feat(s)",
            report.errors.len(),
            report.feats_checked
        );
        print_list("Errors", &report.errors);
    }

    report.into_result()?;
    Ok(())
}
