//! Generates a `go_protogen` rule next to every `go_proto_library`, and a single `multirun` rule
//! that runs all of them.
//!
//! ```text
//! # gazelle:protogen_multirun_rule_path tools
//! # gazelle:protogen_multirun_rule_name all_protos
//! ```
//!
//! Both directives are only honored in the BUILD file at the root of the repository.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use protogen_build_file::{BuildFile, Rule};
use protogen_cfg::{Config, ConfigSet, ConfigSetBuilder};
use protogen_core::{
    ConfigureArgs, FinishArgs, GenerateArgs, GenerateResult, KindInfo, Language, LoadInfo,
};
use protogen_types::{Label, PackagePath, validate_target_name};

mod multirun;

#[cfg(test)]
mod tests;

const MULTIRUN_RULE_PATH_KEY: &str = "protogen_multirun_rule_path";
const MULTIRUN_RULE_NAME_KEY: &str = "protogen_multirun_rule_name";

pub static MULTIRUN_RULE_PATH: Config<&'static str> = Config::new(
    MULTIRUN_RULE_PATH_KEY,
    "Package, relative to the repository root, that holds the multirun rule.",
    "",
);

pub static MULTIRUN_RULE_NAME: Config<&'static str> = Config::new(
    MULTIRUN_RULE_NAME_KEY,
    "Name of the multirun rule that runs every go_protogen rule.",
    "go_protogen",
);

/// Kind of the rules we look for.
pub const PROTO_LIBRARY_KIND: &str = "go_proto_library";
/// Kind of the rules we generate.
pub const PROTOGEN_KIND: &str = "go_protogen";
pub const PROTOGEN_MODULE: &str = "@go_protogen//proto:proto.bzl";

const PROTOGEN_VERSION: &str = "v1";
const GEN_SUFFIX: &str = "_gen";

/// Comment attached to everything we generate, `what` is e.g. "Rule" or "Load".
pub(crate) fn gen_comment(what: &str) -> String {
    format!("# {what} statement generated by go_protogen + gazelle")
}

/// The `go_protogen` [`Language`].
///
/// Holds no state of its own, directives live in the run's directive store and generated labels
/// in the run's accumulator.
#[derive(Debug, Clone, Copy, Default)]
pub struct GoProtogen;

impl GoProtogen {
    pub fn new() -> Self {
        GoProtogen
    }
}

impl Language for GoProtogen {
    fn name(&self) -> &'static str {
        "go_protogen"
    }

    fn kinds(&self) -> BTreeMap<&'static str, KindInfo> {
        BTreeMap::from([(
            PROTOGEN_KIND,
            KindInfo {
                owned_attrs: &["dep", "version"],
            },
        )])
    }

    fn loads(&self) -> Vec<LoadInfo> {
        vec![LoadInfo {
            module: PROTOGEN_MODULE,
            symbols: &[PROTOGEN_KIND],
        }]
    }

    fn known_directives(&self) -> &'static [&'static str] {
        &[MULTIRUN_RULE_PATH_KEY, MULTIRUN_RULE_NAME_KEY]
    }

    fn register_directives(&self, builder: &mut ConfigSetBuilder) {
        builder
            .register(&MULTIRUN_RULE_PATH)
            .register(&MULTIRUN_RULE_NAME);
    }

    fn configure(&self, args: ConfigureArgs<'_>) {
        let Some(file) = args.file else {
            return;
        };
        if !args.rel.is_root() {
            for directive in file.directives(args.directive_prefix) {
                if self.known_directives().contains(&directive.key.as_str()) {
                    tracing::debug!(
                        path = ?file.path(),
                        key = %directive.key,
                        "ignoring directive outside of the repository root"
                    );
                }
            }
            return;
        }

        for directive in file.directives(args.directive_prefix) {
            let key = directive.key.as_str();
            let value = directive.value.as_str();

            let validated = match key {
                MULTIRUN_RULE_PATH_KEY => PackagePath::new(value).map(|path| path.to_string()),
                MULTIRUN_RULE_NAME_KEY => validate_target_name(value).map(|()| value.to_string()),
                _ => continue,
            };

            match validated {
                Ok(value) => set_directive(args.directives, key, &value),
                Err(err) => {
                    tracing::warn!(path = ?file.path(), key, "ignoring directive: {err}");
                }
            }
        }
    }

    fn generate_rules(&self, args: GenerateArgs<'_>) -> GenerateResult {
        let mut result = GenerateResult::default();
        let mut sources: BTreeSet<&str> = BTreeSet::new();

        for rule in args.known_rules() {
            if rule.kind() != PROTO_LIBRARY_KIND {
                continue;
            }
            let Some(source) = rule.name() else {
                continue;
            };
            if !sources.insert(source) {
                continue;
            }

            let gen_name = format!("{source}{GEN_SUFFIX}");
            let label = match Label::new(args.rel.clone(), &gen_name) {
                Ok(label) => label,
                Err(err) => {
                    tracing::warn!(rel = %args.rel, "skipping {PROTO_LIBRARY_KIND}: {err}");
                    continue;
                }
            };
            tracing::trace!(%label, "synthesized rule");

            result.rules.push(protogen_rule(source, &gen_name));
            result.imports.push(None);
            result.aggregate.push(label);
        }

        if let Some(file) = args.file {
            result.empty = stale_companions(file, args.rel, &sources);
        }

        result
    }

    fn finish(&self, args: FinishArgs<'_>) -> Result<Option<PathBuf>, anyhow::Error> {
        multirun::commit(args)
    }
}

fn set_directive(directives: &ConfigSet, key: &str, value: &str) {
    if let Err(err) = directives.try_update(key, value) {
        tracing::warn!(key, "failed to apply directive: {err:#}");
    }
}

/// A `go_protogen` rule for the `go_proto_library` named `source`.
fn protogen_rule(source: &str, name: &str) -> Rule {
    let mut rule = Rule::new(PROTOGEN_KIND, name);
    rule.set_attr("dep", format!(":{source}"));
    rule.set_attr("version", PROTOGEN_VERSION);
    rule.set_attr("visibility", ["//visibility:public"]);
    rule.add_comment(&gen_comment("Rule"));
    rule
}

/// Generated `go_protogen` rules in `file` whose `go_proto_library` no longer exists.
///
/// Only rules that look exactly like ones we would generate are considered, i.e. `<x>_gen` with a
/// `dep` on `<x>` in the same package. Anything written by hand is left alone.
fn stale_companions(file: &BuildFile, rel: &PackagePath, sources: &BTreeSet<&str>) -> Vec<Rule> {
    file.rules()
        .filter(|rule| rule.kind() == PROTOGEN_KIND)
        .filter_map(|rule| {
            let name = rule.name()?;
            let source = name.strip_suffix(GEN_SUFFIX)?;
            let dep = Label::parse_relative(rule.attr_str("dep")?, rel).ok()?;
            let companion = dep.repo().is_none() && dep.package() == rel && dep.name() == source;
            (companion && !sources.contains(source)).then(|| Rule::new(PROTOGEN_KIND, name))
        })
        .collect()
}
