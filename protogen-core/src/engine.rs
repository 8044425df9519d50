//! The main loop for `protogen`.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use anyhow::Context;
use derivative::Derivative;
use protogen_build_file::{BuildFile, Rule};
use protogen_cfg::ConfigSet;
use protogen_types::{Label, PackagePath};

use crate::accumulator::Accumulator;
use crate::defs::{BUILD_FILE_NAMES, DIRECTIVE_PREFIX, DRY_RUN, IGNORE_GLOBS};
use crate::language::{ConfigureArgs, FinishArgs, GenerateArgs, KindInfo, Language, LoadInfo};
use crate::{merge, walk};

/// Configuration for creating an [`Engine`].
pub struct EngineConfig {
    /// Root directory of the repository, where the user's files live.
    pub repo_root: PathBuf,
    /// Tool configs, see [`crate::defs`].
    pub configs: ConfigSet,
}

#[derive(Derivative)]
#[derivative(Debug)]
pub struct Engine {
    /// Root directory of the repository, where the user's files live.
    repo_root: PathBuf,
    /// Tool configs.
    configs: ConfigSet,
    /// Registered language extensions, run in order for every package.
    #[derivative(Debug = "ignore")]
    languages: Vec<Box<dyn Language>>,
}

/// Result of [`Language::finish`] for a single language.
#[derive(Debug)]
pub struct FinishOutcome {
    pub language: &'static str,
    pub result: Result<Option<PathBuf>, anyhow::Error>,
}

/// Summary of a single [`Engine::run`].
#[derive(Debug, Default)]
pub struct RunReport {
    /// Every package visited, in pre-order.
    pub packages: Vec<PackagePath>,
    /// Packages whose BUILD file couldn't be parsed.
    pub skipped: Vec<PackagePath>,
    /// Labels each package contributed to an [`Accumulator`].
    pub generated: BTreeMap<PackagePath, Vec<Label>>,
    /// Files that changed, or would have in a dry run.
    pub written: Vec<PathBuf>,
    /// Failures saving a package's BUILD file.
    pub errors: Vec<anyhow::Error>,
    pub finished: Vec<FinishOutcome>,
    pub dry_run: bool,
}

impl RunReport {
    /// Returns `true` if nothing failed.
    pub fn is_success(&self) -> bool {
        self.errors.is_empty() && self.finished.iter().all(|outcome| outcome.result.is_ok())
    }
}

impl Engine {
    pub fn new(
        config: EngineConfig,
        languages: Vec<Box<dyn Language>>,
    ) -> Result<Self, anyhow::Error> {
        let EngineConfig { repo_root, configs } = config;

        anyhow::ensure!(
            repo_root.is_dir(),
            "repository root {} is not a directory",
            repo_root.display()
        );
        let names: Vec<_> = languages.iter().map(|lang| lang.name()).collect();
        tracing::debug!(?repo_root, ?names, "created engine");

        Ok(Engine {
            repo_root,
            configs,
            languages,
        })
    }

    pub fn repo_root(&self) -> &Path {
        &self.repo_root
    }

    pub fn configs(&self) -> &ConfigSet {
        &self.configs
    }

    /// A fresh directive store with every language's directives at their defaults.
    pub fn directive_set(&self) -> ConfigSet {
        let mut builder = ConfigSet::builder();
        for language in &self.languages {
            language.register_directives(&mut builder);
        }
        builder.build()
    }

    /// Run every language over the repository.
    ///
    /// Failures to save an individual file, or in a language's finish step, are logged and
    /// recorded in the returned [`RunReport`] rather than stopping the run.
    pub fn run(&self) -> Result<RunReport, anyhow::Error> {
        let build_file_names = crate::defs::split_list(&BUILD_FILE_NAMES.read(&self.configs));
        anyhow::ensure!(
            !build_file_names.is_empty(),
            "'{}' must name at least one file",
            BUILD_FILE_NAMES.name()
        );
        let ignore = crate::defs::ignore_set(&IGNORE_GLOBS.read(&self.configs))?;
        let directive_prefix = DIRECTIVE_PREFIX.read(&self.configs);
        let dry_run = DRY_RUN.read(&self.configs);

        // All state for this run lives on the stack.
        let directives = self.directive_set();
        let mut accumulators: Vec<Accumulator> =
            self.languages.iter().map(|_| Accumulator::new()).collect();
        let mut report = RunReport {
            dry_run,
            ..Default::default()
        };

        let namespaces = directive_namespaces(
            self.languages
                .iter()
                .flat_map(|lang| lang.known_directives().iter().copied()),
        );
        let kinds: BTreeMap<&'static str, KindInfo> = self
            .languages
            .iter()
            .flat_map(|lang| lang.kinds())
            .collect();
        let loads: Vec<LoadInfo> = self.languages.iter().flat_map(|lang| lang.loads()).collect();

        let packages = walk::walk(&self.repo_root, &ignore)?;
        tracing::info!(count = packages.len(), "walked repository");
        report.packages = packages.iter().map(|package| package.rel.clone()).collect();

        // Configure, parents before children.
        let mut files: Vec<Option<BuildFile>> = Vec::with_capacity(packages.len());
        let mut skipped = vec![false; packages.len()];
        for (idx, package) in packages.iter().enumerate() {
            let file = match crate::load_build_file(&package.dir, &build_file_names) {
                Ok(file) => file,
                Err(err) => {
                    tracing::warn!(rel = %package.rel, "skipping package: {err}");
                    skipped[idx] = true;
                    report.skipped.push(package.rel.clone());
                    files.push(None);
                    continue;
                }
            };

            if let Some(file) = &file {
                for directive in file.directives(&directive_prefix) {
                    let key = directive.key.as_str();
                    if directives.contains(key) {
                        continue;
                    }
                    // Most directives are meant for other gazelle extensions.
                    if is_own_directive(&namespaces, key) {
                        tracing::warn!(path = ?file.path(), key, "unknown directive");
                    } else {
                        tracing::debug!(path = ?file.path(), key, "ignoring directive");
                    }
                }
            }
            for language in &self.languages {
                language.configure(ConfigureArgs {
                    directives: &directives,
                    directive_prefix: &directive_prefix,
                    rel: &package.rel,
                    file: file.as_ref(),
                });
            }
            files.push(file);
        }

        // Generate, children before parents.
        for idx in walk::post_order(&packages) {
            if skipped[idx] {
                continue;
            }
            let package = &packages[idx];
            let file = files[idx].take();

            let mut generated: Vec<Rule> = Vec::new();
            let mut empty: Vec<Rule> = Vec::new();
            for (language, accumulator) in self.languages.iter().zip(accumulators.iter_mut()) {
                let result = language.generate_rules(GenerateArgs {
                    repo_root: &self.repo_root,
                    rel: &package.rel,
                    dir: &package.dir,
                    file: file.as_ref(),
                    directives: &directives,
                    other_gen: &generated[..],
                });
                assert_eq!(
                    result.rules.len(),
                    result.imports.len(),
                    "programming error, '{}' returned mismatched rules and imports",
                    language.name(),
                );

                if !result.aggregate.is_empty() {
                    report
                        .generated
                        .entry(package.rel.clone())
                        .or_default()
                        .extend(result.aggregate.iter().cloned());
                    accumulator.extend(result.aggregate);
                }
                generated.extend(result.rules);
                empty.extend(result.empty);
            }

            if generated.is_empty() && empty.is_empty() {
                continue;
            }
            let mut file = match file {
                Some(file) => file,
                // Nothing to delete from a file that doesn't exist.
                None if generated.is_empty() => continue,
                None => BuildFile::empty(package.dir.join(build_file_names[0].as_str())),
            };

            merge::merge_rules(&mut file, &generated, &empty, &kinds);
            merge::fix_loads(&mut file, &loads);
            if !file.is_changed() {
                tracing::debug!(rel = %package.rel, "BUILD file unchanged");
                continue;
            }

            report.written.push(file.path().to_path_buf());
            if dry_run {
                tracing::info!(path = ?file.path(), "would update BUILD file");
                continue;
            }
            match file.save() {
                Ok(()) => tracing::info!(path = ?file.path(), "updated BUILD file"),
                Err(err) => {
                    let err = anyhow::Error::new(err).context(format!("package '{}'", package.rel));
                    tracing::error!("{err:#}");
                    report.errors.push(err);
                }
            }
        }

        // Finish, exactly once per language.
        for (language, accumulator) in self.languages.iter().zip(accumulators) {
            let name = language.name();
            tracing::debug!(language = name, count = accumulator.len(), "finishing");
            let result = language
                .finish(FinishArgs {
                    repo_root: &self.repo_root,
                    directives: &directives,
                    build_file_names: &build_file_names[..],
                    aggregate: accumulator.snapshot(),
                    dry_run,
                })
                .with_context(|| format!("finishing '{name}'"));

            match &result {
                Ok(Some(path)) => report.written.push(path.clone()),
                Ok(None) => {}
                Err(err) => tracing::warn!(language = name, "finish failed: {err:#}"),
            }
            report.finished.push(FinishOutcome {
                language: name,
                result,
            });
        }

        Ok(report)
    }
}

/// Namespaces of directive keys, the part up to and including the first `_`, e.g. `protogen_`
/// for `protogen_multirun_rule_path`.
fn directive_namespaces<'a>(keys: impl Iterator<Item = &'a str>) -> BTreeSet<&'a str> {
    keys.filter_map(|key| key.find('_').map(|idx| &key[..=idx]))
        .collect()
}

/// Returns `true` if `key` falls in the namespace of one of our languages' directives.
fn is_own_directive(namespaces: &BTreeSet<&str>, key: &str) -> bool {
    namespaces.iter().any(|namespace| key.starts_with(namespace))
}
