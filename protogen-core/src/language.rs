//! The interface between the [`Engine`] and a language extension.
//!
//! A run happens in phases. Every package is first configured in pre-order so directives in a
//! parent are visible to its children, then rules are generated in post-order. Each language can
//! contribute labels to a run-wide [`Accumulator`] while generating, and once the whole tree has
//! been visited [`Language::finish`] is called exactly once with everything that was collected.
//!
//! [`Engine`]: crate::engine::Engine
//! [`Accumulator`]: crate::accumulator::Accumulator

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use compact_str::CompactString;
use protogen_build_file::{BuildFile, Rule};
use protogen_cfg::{ConfigSet, ConfigSetBuilder};
use protogen_types::{Label, PackagePath};

/// How the [`Engine`] merges rules of a kind that a language generates.
///
/// [`Engine`]: crate::engine::Engine
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KindInfo {
    /// Attributes the language owns. On an existing rule these get overwritten with the generated
    /// values, every other attribute is left as the user wrote it.
    pub owned_attrs: &'static [&'static str],
}

/// A `.bzl` file and the symbols a language may need loaded from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadInfo {
    pub module: &'static str,
    pub symbols: &'static [&'static str],
}

pub struct ConfigureArgs<'a> {
    /// Directive store shared by every language for the run.
    pub directives: &'a ConfigSet,
    /// Prefix of directive comments, e.g. `gazelle`.
    pub directive_prefix: &'a str,
    pub rel: &'a PackagePath,
    /// The package's BUILD file, if it has one.
    pub file: Option<&'a BuildFile>,
}

pub struct GenerateArgs<'a> {
    pub repo_root: &'a Path,
    pub rel: &'a PackagePath,
    /// Absolute path of the package's directory.
    pub dir: &'a Path,
    pub file: Option<&'a BuildFile>,
    pub directives: &'a ConfigSet,
    /// Rules generated for this package by languages that ran earlier.
    pub other_gen: &'a [Rule],
}

impl GenerateArgs<'_> {
    /// Every rule known for this package: the existing file's rules, then the ones generated by
    /// other languages.
    pub fn known_rules(&self) -> impl Iterator<Item = &Rule> {
        self.file
            .into_iter()
            .flat_map(BuildFile::rules)
            .chain(self.other_gen.iter())
    }
}

/// Output of [`Language::generate_rules`] for a single package.
#[derive(Debug, Default)]
pub struct GenerateResult {
    /// Rules to merge into the package's BUILD file.
    pub rules: Vec<Rule>,
    /// Dependency information for each entry in `rules`, correlated by position.
    pub imports: Vec<Option<Vec<Label>>>,
    /// Rules that should be deleted from the package's BUILD file if they exist.
    pub empty: Vec<Rule>,
    /// This package's contribution to the run-wide [`Accumulator`].
    ///
    /// [`Accumulator`]: crate::accumulator::Accumulator
    pub aggregate: Vec<Label>,
}

pub struct FinishArgs<'a> {
    pub repo_root: &'a Path,
    pub directives: &'a ConfigSet,
    /// Names of BUILD files, in priority order. Never empty.
    pub build_file_names: &'a [CompactString],
    /// Snapshot of every label this language contributed during the run, in visitation order
    /// without duplicates.
    pub aggregate: Vec<Label>,
    pub dry_run: bool,
}

pub trait Language {
    fn name(&self) -> &'static str;

    /// Rule kinds this language generates.
    fn kinds(&self) -> BTreeMap<&'static str, KindInfo>;

    /// Where the rule kinds from [`Language::kinds`] are loaded from.
    fn loads(&self) -> Vec<LoadInfo>;

    /// Directive keys this language understands.
    fn known_directives(&self) -> &'static [&'static str];

    /// Register a [`Config`] for every directive in [`Language::known_directives`].
    ///
    /// [`Config`]: protogen_cfg::Config
    fn register_directives(&self, builder: &mut ConfigSetBuilder);

    /// Called once per package, parents before children.
    fn configure(&self, args: ConfigureArgs<'_>);

    /// Called once per package, children before parents.
    fn generate_rules(&self, args: GenerateArgs<'_>) -> GenerateResult;

    /// Called exactly once per run after every package has been visited.
    ///
    /// Returns the path of a file that changed, or would have changed in a dry run.
    fn finish(&self, args: FinishArgs<'_>) -> Result<Option<PathBuf>, anyhow::Error>;
}
