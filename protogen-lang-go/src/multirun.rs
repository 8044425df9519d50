//! Maintains the `multirun` rule that runs every generated `go_protogen` rule.
//!
//! The target file is reloaded from disk and the rule rebuilt from scratch on every run, so the
//! result only depends on what was collected, never on what the file used to say.

use std::path::PathBuf;

use anyhow::Context;
use protogen_build_file::{BuildFile, Expr, Load, Rule};
use protogen_core::FinishArgs;
use protogen_types::{Label, PackagePath};

use crate::{MULTIRUN_RULE_NAME, MULTIRUN_RULE_PATH, gen_comment};

pub(crate) const MULTIRUN_KIND: &str = "multirun";
pub(crate) const MULTIRUN_MODULE: &str = "@rules_multirun//:defs.bzl";
pub(crate) const MULTIRUN_SYMBOLS: &[&str] = &["command", "multirun"];

const USAGE_COMMENT: &str = "# Used to run all go_proto_library rules in the Workspace";

pub(crate) fn commit(args: FinishArgs<'_>) -> Result<Option<PathBuf>, anyhow::Error> {
    let FinishArgs {
        repo_root,
        directives,
        build_file_names,
        aggregate,
        dry_run,
    } = args;

    let rule_name = MULTIRUN_RULE_NAME.read(directives);
    let package = PackagePath::new(&MULTIRUN_RULE_PATH.read(directives))?;
    let dir = package.to_path(repo_root);
    let default_name = build_file_names
        .first()
        .context("no BUILD file names configured")?;

    let existing = match protogen_core::load_build_file(&dir, build_file_names) {
        Ok(existing) => existing,
        Err(err) => {
            tracing::error!(?dir, "failed to load multirun BUILD file: {err}");
            return Err(err.into());
        }
    };
    let has_rule = existing
        .as_ref()
        .is_some_and(|file| file.find_rule(MULTIRUN_KIND, &rule_name).is_some());
    if aggregate.is_empty() && !has_rule {
        tracing::debug!(?dir, "no go_protogen rules, skipping multirun rule");
        return Ok(None);
    }
    let mut file = existing.unwrap_or_else(|| BuildFile::empty(dir.join(default_name.as_str())));

    let position = file.delete_rules(|rule| {
        rule.kind() == MULTIRUN_KIND && rule.name() == Some(rule_name.as_str())
    });
    let rule = multirun_rule(&rule_name, &aggregate[..]);
    match position {
        Some(idx) => file.insert_rule(idx, rule),
        None => file.add_rule(rule),
    }

    let mut load = Load::new(MULTIRUN_MODULE);
    for symbol in MULTIRUN_SYMBOLS {
        load.add(symbol);
    }
    load.add_comment(&gen_comment("Load"));
    file.insert_load(0, load);

    if !file.is_changed() {
        tracing::debug!(path = ?file.path(), "multirun rule up to date");
        return Ok(None);
    }
    if dry_run {
        tracing::info!(path = ?file.path(), commands = aggregate.len(), "would update multirun rule");
        return Ok(Some(file.path().to_path_buf()));
    }
    if let Err(err) = file.save() {
        tracing::error!(path = ?file.path(), "failed to save multirun BUILD file: {err}");
        return Err(err.into());
    }
    tracing::info!(path = ?file.path(), commands = aggregate.len(), "updated multirun rule");

    Ok(Some(file.path().to_path_buf()))
}

fn multirun_rule(name: &str, commands: &[Label]) -> Rule {
    let commands: Vec<Expr> = commands
        .iter()
        .map(|label| Expr::from(label.to_string()))
        .collect();

    let mut rule = Rule::new(MULTIRUN_KIND, name);
    rule.set_attr("commands", commands);
    rule.set_attr("jobs", 0i64);
    rule.add_comment(&gen_comment("Rule"));
    rule.add_comment(USAGE_COMMENT);
    rule
}
