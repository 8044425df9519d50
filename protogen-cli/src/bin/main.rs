use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use protogen_cfg::ConfigSet;
use protogen_core::defs::{DRY_RUN, ToolSpec};
use protogen_core::{Engine, EngineConfig, Language, RunReport};
use protogen_lang_go::GoProtogen;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;

/// Generate go_protogen rules for every go_proto_library in a repository.
#[derive(Debug, Parser)]
#[command(name = "protogen", version, about, long_about = None)]
struct Args {
    /// Root of the repository.
    #[arg(long, default_value = ".")]
    repo_root: PathBuf,

    /// Override a config, e.g. `--config build_file_names=BUILD`. Can be repeated.
    #[arg(long = "config", value_name = "NAME=VALUE", value_parser = parse_config_flag)]
    configs: Vec<(String, String)>,

    /// Compute every change but don't write any files.
    #[arg(long)]
    dry_run: bool,

    /// Print a tree of everything that was generated.
    #[arg(long)]
    tree: bool,

    /// Print every config with its current value and exit.
    #[arg(long)]
    list_configs: bool,

    /// Print every directive with its default value and exit.
    #[arg(long)]
    list_directives: bool,
}

fn main() -> ExitCode {
    init_logging();
    let args = Args::parse();

    match run(args) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            tracing::error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

/// Returns `true` if the run succeeded.
fn run(args: Args) -> Result<bool, anyhow::Error> {
    let configs = load_configs(&args)?;

    let languages: Vec<Box<dyn Language>> = vec![Box::new(GoProtogen::new())];
    let engine = Engine::new(
        EngineConfig {
            repo_root: args.repo_root.clone(),
            configs: configs.clone(),
        },
        languages,
    )?;

    if args.list_configs || args.list_directives {
        if args.list_configs {
            print!("{configs}");
        }
        if args.list_directives {
            print!("{}", engine.directive_set());
        }
        return Ok(true);
    }

    let spinner = spinner("Generating rules...")?;
    let report = engine.run();
    spinner.finish_and_clear();
    let report = report?;

    if args.tree {
        ptree::print_tree(&report_tree(&report, engine.repo_root()))?;
    }
    tracing::info!(
        packages = report.packages.len(),
        files = report.written.len(),
        dry_run = report.dry_run,
        "done"
    );

    Ok(report.is_success())
}

/// Tool configs, lowest precedence first: defaults, `protogen.toml`, then the command line.
fn load_configs(args: &Args) -> Result<ConfigSet, anyhow::Error> {
    let configs = protogen_core::cfgs::default_set();

    if let Some(spec) = ToolSpec::load(&args.repo_root)? {
        spec.apply(&configs)?;
    }
    for (name, value) in &args.configs {
        configs
            .try_update(name, value)
            .with_context(|| format!("invalid --config {name}={value}"))?;
    }
    if args.dry_run {
        configs.update(&DRY_RUN, true);
    }

    Ok(configs)
}

fn parse_config_flag(raw: &str) -> Result<(String, String), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, found '{raw}'"))?;
    Ok((name.trim().to_string(), value.to_string()))
}

fn init_logging() {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(!is_truthy("NO_COLOR"))
        .with_writer(std::io::stderr)
        .init();
}

/// Returns `true` if the environment variable `var` is set to something other than a "falsey"
/// value, e.g. `0` or `false`.
fn is_truthy<K: AsRef<OsStr>>(var: K) -> bool {
    static FALSEY: &[&str] = &["0", "", "no", "false"];

    let Some(mut value) = std::env::var_os(var) else {
        return false;
    };
    value.make_ascii_lowercase();
    !FALSEY.iter().any(|falsey| value == *falsey)
}

fn spinner(msg: &'static str) -> Result<ProgressBar, anyhow::Error> {
    let spinner = ProgressBar::new_spinner().with_message(msg);
    spinner.set_style(
        ProgressStyle::with_template("{spinner:.blue} {msg}")?
            // For more spinners check out the cli-spinners project:
            // https://github.com/sindresorhus/cli-spinners/blob/master/spinners.json
            .tick_strings(&["⣾", "⣽", "⣻", "⢿", "⡿", "⣟", "⣯", "⣷"]),
    );
    spinner.enable_steady_tick(Duration::from_millis(100));
    Ok(spinner)
}

fn report_tree(report: &RunReport, repo_root: &Path) -> ptree::item::StringItem {
    let title = if report.dry_run {
        "protogen (dry run)"
    } else {
        "protogen"
    };
    let mut tree = ptree::TreeBuilder::new(title.to_string());

    tree.add_empty_child(format!(
        "{} packages, {} skipped",
        report.packages.len(),
        report.skipped.len()
    ));

    tree.begin_child("generated".to_string());
    for (rel, labels) in &report.generated {
        let rel = if rel.is_root() { "//" } else { rel.as_str() };
        tree.begin_child(rel.to_string());
        for label in labels {
            tree.add_empty_child(label.to_string());
        }
        tree.end_child();
    }
    tree.end_child();

    let written = if report.dry_run { "would write" } else { "wrote" };
    tree.begin_child(written.to_string());
    for path in &report.written {
        let path = path.strip_prefix(repo_root).unwrap_or(path);
        tree.add_empty_child(path.display().to_string());
    }
    tree.end_child();

    tree.begin_child("finish".to_string());
    for outcome in &report.finished {
        let status = match &outcome.result {
            Ok(Some(_)) => "updated".to_string(),
            Ok(None) => "unchanged".to_string(),
            Err(err) => format!("failed: {err:#}"),
        };
        tree.add_empty_child(format!("{}: {status}", outcome.language));
    }
    for err in &report.errors {
        tree.add_empty_child(format!("failed: {err:#}"));
    }
    tree.end_child();

    tree.build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_flags() {
        assert_eq!(
            parse_config_flag("dry_run=true"),
            Ok(("dry_run".to_string(), "true".to_string()))
        );
        assert_eq!(
            parse_config_flag("ignore_globs=**/a,**/b=c"),
            Ok(("ignore_globs".to_string(), "**/a,**/b=c".to_string()))
        );
        assert!(parse_config_flag("dry_run").is_err());
    }

    #[test]
    fn config_precedence() {
        let temp = tempfile::TempDir::new().unwrap();
        std::fs::write(
            temp.path().join("protogen.toml"),
            "[configs]\nbuild_file_names = \"BUILD\"\ndirective_prefix = \"protogen\"\n",
        )
        .unwrap();

        let args = Args::parse_from([
            "protogen",
            "--repo-root",
            temp.path().to_str().unwrap(),
            "--config",
            "directive_prefix=custom",
            "--dry-run",
        ]);
        let configs = load_configs(&args).unwrap();

        let rendered = configs.to_string();
        assert!(rendered.contains("build_file_names => 'BUILD'"));
        assert!(rendered.contains("directive_prefix => 'custom'"));
        assert!(DRY_RUN.read(&configs));

        let args = Args::parse_from(["protogen", "--config", "nope=1"]);
        assert!(load_configs(&args).is_err());
    }

    #[test]
    fn smoketest_tree() {
        let temp = tempfile::TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join("a")).unwrap();
        std::fs::write(
            temp.path().join("a/BUILD.bazel"),
            "go_proto_library(\n    name = \"foo\",\n)\n",
        )
        .unwrap();

        let args = Args::parse_from([
            "protogen",
            "--repo-root",
            temp.path().to_str().unwrap(),
            "--dry-run",
        ]);
        let configs = load_configs(&args).unwrap();
        let languages: Vec<Box<dyn Language>> = vec![Box::new(GoProtogen::new())];
        let config = EngineConfig {
            repo_root: args.repo_root.clone(),
            configs,
        };
        let engine = Engine::new(config, languages).unwrap();
        let report = engine.run().unwrap();

        let mut buf = Vec::new();
        ptree::write_tree(&report_tree(&report, engine.repo_root()), &mut buf).unwrap();
        let rendered = String::from_utf8(buf).unwrap();
        assert!(rendered.starts_with("protogen (dry run)"));
        assert!(rendered.contains("//a:foo_gen"));
        assert!(rendered.contains("go_protogen: updated"));
    }

    #[test]
    fn truthy_env() {
        assert!(!is_truthy("PROTOGEN_TEST_SURELY_UNSET_VARIABLE"));
    }
}
