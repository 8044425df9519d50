use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Context;
use compact_str::CompactString;
use protogen_cfg::{Config, ConfigSet, ConfigSetBuilder};
use serde::Deserialize;

/// Name of the optional file at the repository root that overrides [`Config`] defaults.
pub static TOOL_FILENAME: &str = "protogen.toml";

pub static BUILD_FILE_NAMES: Config<&'static str> = Config::new(
    "build_file_names",
    "Comma separated names of BUILD files, in priority order.",
    "BUILD.bazel,BUILD",
);

pub static IGNORE_GLOBS: Config<&'static str> = Config::new(
    "ignore_globs",
    "Comma separated globs of directories to skip when walking the repository.",
    "**/.*,**/bazel-*,**/node_modules",
);

pub static DIRECTIVE_PREFIX: Config<&'static str> = Config::new(
    "directive_prefix",
    "Prefix of directive comments, e.g. '# gazelle:<key> <value>'.",
    "gazelle",
);

pub static DRY_RUN: Config<bool> = Config::new(
    "dry_run",
    "Compute every change but don't write any files.",
    false,
);

pub(crate) fn register_configs(builder: &mut ConfigSetBuilder) {
    builder
        .register(&BUILD_FILE_NAMES)
        .register(&IGNORE_GLOBS)
        .register(&DIRECTIVE_PREFIX)
        .register(&DRY_RUN);
}

/// Split a comma separated config value, dropping empty entries.
pub fn split_list(raw: &str) -> Vec<CompactString> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(CompactString::new)
        .collect()
}

/// Build a [`globset::GlobSet`] from a comma separated list of globs.
pub fn ignore_set(raw: &str) -> Result<globset::GlobSet, anyhow::Error> {
    let mut builder = globset::GlobSetBuilder::new();
    for pattern in split_list(raw) {
        let glob = globset::GlobBuilder::new(&pattern)
            .literal_separator(true)
            .build()
            .with_context(|| format!("invalid ignore glob '{pattern}'"))?;
        builder.add(glob);
    }
    Ok(builder.build()?)
}

/// Definition of the tool settings, parsed from a [`TOOL_FILENAME`].
///
/// ```toml
/// [configs]
/// build_file_names = ["BUILD.bazel"]
/// dry_run = true
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToolSpec {
    /// Overrides for registered [`Config`]s, by name.
    #[serde(default)]
    pub configs: BTreeMap<String, ConfigValueSpec>,
}

impl ToolSpec {
    pub fn from_toml(raw: &str) -> Result<Self, anyhow::Error> {
        let spec = toml::from_str(raw)?;
        Ok(spec)
    }

    /// Read the [`TOOL_FILENAME`] in `repo_root`, if there is one.
    pub fn load(repo_root: &Path) -> Result<Option<Self>, anyhow::Error> {
        let path = repo_root.join(TOOL_FILENAME);
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err).with_context(|| format!("reading {}", path.display())),
        };
        tracing::info!(?path, "reading tool spec");
        let spec = ToolSpec::from_toml(&raw).with_context(|| format!("parsing {}", path.display()))?;
        Ok(Some(spec))
    }

    /// Apply every override in this spec to `configs`.
    pub fn apply(&self, configs: &ConfigSet) -> Result<(), anyhow::Error> {
        for (name, value) in &self.configs {
            configs
                .try_update(name, &value.to_config_string())
                .with_context(|| format!("applying '{name}' from {TOOL_FILENAME}"))?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ConfigValueSpec {
    Bool(bool),
    String(String),
    List(Vec<String>),
}

impl ConfigValueSpec {
    fn to_config_string(&self) -> String {
        match self {
            ConfigValueSpec::Bool(val) => val.to_string(),
            ConfigValueSpec::String(val) => val.clone(),
            ConfigValueSpec::List(items) => items.join(","),
        }
    }
}
