use crate::output::{print_json, print_list};
use anyhow::Context;
use ft_core::validate::{self, NEXT_STEPS};
use std::path::Path;

pub fn run(root: &Path, json: bool) -> anyhow::Result<()> {
    let report = validate::doctor(root).context("failed to run doctor")?;

    if json {
        print_json(&serde_json::json!({
            "validation": report.validation,
            "warnings": report.warnings,
            "next_steps": NEXT_STEPS,
        }))?;
    } else if !report.validation.is_ok() {
        print_list("Validation errors", &report.validation.errors);
    } else {
        println!(
            "Validation passed ({} feat(s) checked).",
            report.validation.feats_checked
        );
        if report.warnings.is_empty() {
            println!("No warnings.");
        } else {
            print_list("Warnings", &report.warnings);
        }
        println!();
        println!("Next steps:");
        for (i, step) in NEXT_STEPS.iter().enumerate() {
            println!("  {}. {step}", i + 1);
        }
    }

    report.validation.into_result()?;
    Ok(())
}
