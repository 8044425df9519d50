//! End to end runs of the [`Engine`] over temporary repositories.

use std::path::Path;

use protogen_build_file::BuildFile;
use protogen_core::defs::DRY_RUN;
use protogen_core::{Engine, EngineConfig, GenerateArgs, Language, RunReport};
use protogen_types::PackagePath;

use crate::GoProtogen;

const A_BUILD: &str = r#"load("@io_bazel_rules_go//proto:def.bzl", "go_proto_library")

go_proto_library(
    name = "foo",
    importpath = "example.com/a",
    proto = ":foo_proto",
)
"#;

const B_BUILD: &str = r#"load("@io_bazel_rules_go//proto:def.bzl", "go_proto_library")

go_proto_library(
    name = "bar",
    proto = ":bar_proto",
)

go_proto_library(
    name = "baz",
    proto = ":baz_proto",
)
"#;

fn write(root: &Path, rel: &str, contents: &str) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, contents).unwrap();
}

fn read(root: &Path, rel: &str) -> String {
    std::fs::read_to_string(root.join(rel)).unwrap()
}

fn engine(root: &Path) -> Engine {
    let language: Box<dyn Language> = Box::new(GoProtogen::new());
    let config = EngineConfig {
        repo_root: root.to_path_buf(),
        configs: protogen_core::cfgs::default_set(),
    };
    Engine::new(config, vec![language]).unwrap()
}

fn run(root: &Path) -> RunReport {
    engine(root).run().unwrap()
}

/// Commands of the multirun rule named `name` in the BUILD file at `rel`.
fn commands(root: &Path, rel: &str, name: &str) -> Vec<String> {
    let file = BuildFile::load(root.join(rel)).unwrap();
    let rule = file.find_rule("multirun", name).unwrap();
    rule.attr("commands")
        .and_then(|commands| commands.as_string_list())
        .unwrap()
        .into_iter()
        .map(String::from)
        .collect()
}

fn setup_example() -> tempfile::TempDir {
    let temp = tempfile::TempDir::new().unwrap();
    write(temp.path(), "a/BUILD.bazel", A_BUILD);
    write(temp.path(), "b/BUILD.bazel", B_BUILD);
    temp
}

#[test]
fn smoketest_example() {
    let temp = setup_example();
    let root = temp.path();

    let report = run(root);
    assert!(report.is_success());
    assert_eq!(report.finished.len(), 1);

    let generated: Vec<(String, Vec<String>)> = report
        .generated
        .iter()
        .map(|(rel, labels)| {
            let labels = labels.iter().map(ToString::to_string).collect();
            (rel.to_string(), labels)
        })
        .collect();
    assert_eq!(
        generated,
        vec![
            ("a".to_string(), vec!["//a:foo_gen".to_string()]),
            (
                "b".to_string(),
                vec!["//b:bar_gen".to_string(), "//b:baz_gen".to_string()]
            ),
        ]
    );

    let expected_root = r#"# Load statement generated by go_protogen + gazelle
load("@rules_multirun//:defs.bzl", "command", "multirun")

# Rule statement generated by go_protogen + gazelle
# Used to run all go_proto_library rules in the Workspace
multirun(
    name = "go_protogen",
    commands = [
        "//a:foo_gen",
        "//b:bar_gen",
        "//b:baz_gen",
    ],
    jobs = 0,
)
"#;
    assert_eq!(read(root, "BUILD.bazel"), expected_root);

    let expected_a = r#"load("@io_bazel_rules_go//proto:def.bzl", "go_proto_library")
load("@go_protogen//proto:proto.bzl", "go_protogen")

go_proto_library(
    name = "foo",
    importpath = "example.com/a",
    proto = ":foo_proto",
)

# Rule statement generated by go_protogen + gazelle
go_protogen(
    name = "foo_gen",
    dep = ":foo",
    version = "v1",
    visibility = ["//visibility:public"],
)
"#;
    assert_eq!(read(root, "a/BUILD.bazel"), expected_a);

    let b = BuildFile::load(root.join("b/BUILD.bazel")).unwrap();
    let deps: Vec<_> = b
        .rules()
        .filter(|rule| rule.kind() == "go_protogen")
        .map(|rule| (rule.name().unwrap(), rule.attr_str("dep").unwrap()))
        .collect();
    assert_eq!(deps, vec![("bar_gen", ":bar"), ("baz_gen", ":baz")]);
}

#[test]
fn second_run_changes_nothing() {
    let temp = setup_example();
    let root = temp.path();

    run(root);
    let first_root = read(root, "BUILD.bazel");
    let first_b = read(root, "b/BUILD.bazel");

    let report = run(root);
    assert!(report.is_success());
    assert!(report.written.is_empty(), "{:?}", report.written);
    assert!(matches!(report.finished[0].result, Ok(None)));

    let second_root = read(root, "BUILD.bazel");
    assert_eq!(first_root, second_root);
    assert_eq!(first_b, read(root, "b/BUILD.bazel"));
    assert_eq!(second_root.matches("load(\"@rules_multirun//:defs.bzl\"").count(), 1);
    assert_eq!(second_root.matches("multirun(").count(), 1);
}

#[test]
fn stale_multirun_rule_is_replaced() {
    let temp = setup_example();
    let root = temp.path();
    write(
        root,
        "BUILD.bazel",
        r#"load("@rules_multirun//:defs.bzl", "multirun")

multirun(
    name = "go_protogen",
    commands = ["//old:stale_gen"],
    jobs = 4,
)

multirun(
    name = "other",
    commands = ["//tools:lint"],
)

sh_binary(
    name = "tool",
    srcs = ["tool.sh"],
)
"#,
    );

    assert!(run(root).is_success());
    let contents = read(root, "BUILD.bazel");

    assert!(!contents.contains("stale_gen"));
    assert!(!contents.contains("jobs = 4"));
    assert_eq!(
        commands(root, "BUILD.bazel", "go_protogen"),
        vec!["//a:foo_gen", "//b:bar_gen", "//b:baz_gen"]
    );
    assert_eq!(commands(root, "BUILD.bazel", "other"), vec!["//tools:lint"]);

    // The existing load is reused, and the rule keeps its place in the file.
    assert_eq!(contents.matches("load(").count(), 1);
    assert!(contents.contains(
        "# Load statement generated by go_protogen + gazelle\nload(\"@rules_multirun//:defs.bzl\", \"multirun\", \"command\")\n"
    ));
    let rule_pos = contents.find("name = \"go_protogen\"").unwrap();
    let other_pos = contents.find("name = \"other\"").unwrap();
    assert!(rule_pos < other_pos);
}

#[test]
fn commented_multirun_load_is_reused() {
    let temp = setup_example();
    let root = temp.path();
    write(
        root,
        "BUILD.bazel",
        r#"load(
    "@rules_multirun//:defs.bzl",  # pinned in MODULE.bazel
    # only the aggregate for now
    "multirun",
)
"#,
    );

    assert!(run(root).is_success());
    let contents = read(root, "BUILD.bazel");
    assert_eq!(contents.matches("load(").count(), 1, "{contents}");
    assert!(contents.contains("# pinned in MODULE.bazel"));
    assert!(contents.contains("    \"multirun\",\n    \"command\",\n)"));

    let load_symbols: Vec<String> = BuildFile::load(root.join("BUILD.bazel"))
        .unwrap()
        .find_load("@rules_multirun//:defs.bzl")
        .unwrap()
        .symbols()
        .map(String::from)
        .collect();
    assert_eq!(load_symbols, vec!["multirun", "command"]);

    let report = run(root);
    assert!(report.written.is_empty(), "{:?}", report.written);
    assert_eq!(read(root, "BUILD.bazel"), contents);
}

#[test]
fn root_directives_move_the_rule() {
    let temp = setup_example();
    let root = temp.path();
    let root_build = "# gazelle:protogen_multirun_rule_path tools\n# gazelle:protogen_multirun_rule_name all_protos\n";
    write(root, "BUILD.bazel", root_build);
    std::fs::create_dir_all(root.join("tools")).unwrap();

    assert!(run(root).is_success());

    assert_eq!(read(root, "BUILD.bazel"), root_build);
    assert_eq!(
        commands(root, "tools/BUILD.bazel", "all_protos"),
        vec!["//a:foo_gen", "//b:bar_gen", "//b:baz_gen"]
    );
}

#[test]
fn nested_directives_are_ignored() {
    let temp = tempfile::TempDir::new().unwrap();
    let root = temp.path();
    let a_build = format!(
        "# gazelle:protogen_multirun_rule_name ignored\n# gazelle:protogen_multirun_rule_path a\n\n{A_BUILD}"
    );
    write(root, "a/BUILD.bazel", &a_build);

    assert!(run(root).is_success());

    assert_eq!(commands(root, "BUILD.bazel", "go_protogen"), vec!["//a:foo_gen"]);
    let a = BuildFile::load(root.join("a/BUILD.bazel")).unwrap();
    assert!(a.rules().all(|rule| rule.kind() != "multirun"));
}

#[test]
fn invalid_directives_keep_defaults() {
    let temp = setup_example();
    let root = temp.path();
    write(
        root,
        "BUILD.bazel",
        "# gazelle:protogen_multirun_rule_path ../outside\n# gazelle:protogen_multirun_rule_name bad:name\n",
    );

    assert!(run(root).is_success());

    assert_eq!(commands(root, "BUILD.bazel", "go_protogen").len(), 3);
    assert!(!root.parent().unwrap().join("outside").exists());
    let contents = read(root, "BUILD.bazel");
    assert!(contents.contains("# gazelle:protogen_multirun_rule_path ../outside"));
}

#[test]
fn unrelated_kinds_are_ignored() {
    let temp = tempfile::TempDir::new().unwrap();
    let root = temp.path();
    let build = r#"go_library(
    name = "lib",
    srcs = ["lib.go"],
)

proto_library(
    name = "lib_proto",
    srcs = ["lib.proto"],
)
"#;
    write(root, "lib/BUILD.bazel", build);

    let report = run(root);
    assert!(report.is_success());
    assert!(report.generated.is_empty());
    assert!(report.written.is_empty());
    assert_eq!(read(root, "lib/BUILD.bazel"), build);
    assert!(!root.join("BUILD.bazel").exists());
}

#[test]
fn root_package_labels() {
    let temp = tempfile::TempDir::new().unwrap();
    let root = temp.path();
    write(root, "BUILD", "go_proto_library(\n    name = \"api\",\n)\n");

    assert!(run(root).is_success());

    // `BUILD` is the only build file, so both the companion and the multirun rule go there.
    assert!(!root.join("BUILD.bazel").exists());
    let file = BuildFile::load(root.join("BUILD")).unwrap();
    assert_eq!(
        file.find_rule("go_protogen", "api_gen").and_then(|rule| rule.attr_str("dep")),
        Some(":api")
    );
    assert_eq!(commands(root, "BUILD", "go_protogen"), vec!["//:api_gen"]);
}

#[test]
fn stale_companions_are_removed() {
    let temp = tempfile::TempDir::new().unwrap();
    let root = temp.path();
    run_with_a(root, A_BUILD);

    // Rename the library and add a hand written rule that happens to share the kind.
    let mut contents = read(root, "a/BUILD.bazel").replace("name = \"foo\"", "name = \"renamed\"");
    contents.push_str("\ngo_protogen(\n    name = \"custom\",\n    dep = \"//other:lib\",\n)\n");
    // Absolute labels into the same package count as companions, other packages don't.
    contents.push_str("\ngo_protogen(\n    name = \"old_gen\",\n    dep = \"//a:old\",\n)\n");
    contents.push_str("\ngo_protogen(\n    name = \"lib_gen\",\n    dep = \"//other:lib\",\n)\n");
    write(root, "a/BUILD.bazel", &contents);

    assert!(run(root).is_success());

    let a = BuildFile::load(root.join("a/BUILD.bazel")).unwrap();
    let names: Vec<_> = a
        .rules()
        .filter(|rule| rule.kind() == "go_protogen")
        .filter_map(|rule| rule.name())
        .collect();
    assert_eq!(names, vec!["custom", "lib_gen", "renamed_gen"]);
    assert_eq!(commands(root, "BUILD.bazel", "go_protogen"), vec!["//a:renamed_gen"]);
}

#[test]
fn removing_every_library_empties_the_rule() {
    let temp = tempfile::TempDir::new().unwrap();
    let root = temp.path();
    run_with_a(root, A_BUILD);
    assert_eq!(commands(root, "BUILD.bazel", "go_protogen"), vec!["//a:foo_gen"]);

    std::fs::remove_file(root.join("a/BUILD.bazel")).unwrap();
    assert!(run(root).is_success());

    assert!(commands(root, "BUILD.bazel", "go_protogen").is_empty());
    assert!(read(root, "BUILD.bazel").contains("    commands = [],\n"));
}

fn run_with_a(root: &Path, a_build: &str) {
    write(root, "a/BUILD.bazel", a_build);
    assert!(run(root).is_success());
}

#[test]
fn dry_run_writes_nothing() {
    let temp = setup_example();
    let root = temp.path();

    let engine = engine(root);
    engine.configs().update(&DRY_RUN, true);
    let report = engine.run().unwrap();

    assert!(report.is_success());
    assert!(report.dry_run);
    assert!(report.written.contains(&root.join("a/BUILD.bazel")));
    assert!(report.written.contains(&root.join("BUILD.bazel")));
    assert_eq!(read(root, "a/BUILD.bazel"), A_BUILD);
    assert!(!root.join("BUILD.bazel").exists());
}

#[test]
fn commit_failures_are_reported() {
    let temp = setup_example();
    let root = temp.path();
    // The directory for the multirun rule doesn't exist, so saving fails.
    write(root, "BUILD.bazel", "# gazelle:protogen_multirun_rule_path missing/pkg\n");

    let report = run(root);
    assert!(!report.is_success());
    assert!(report.finished[0].result.is_err());
    // Everything else still ran.
    assert!(read(root, "a/BUILD.bazel").contains("foo_gen"));

    // An unparsable target file fails to load.
    write(root, "BUILD.bazel", "multirun(\n");
    let report = run(root);
    assert_eq!(report.skipped, vec![PackagePath::root()]);
    let err = report.finished[0].result.as_ref().unwrap_err();
    assert!(format!("{err:#}").contains("unclosed bracket"));
    assert_eq!(read(root, "BUILD.bazel"), "multirun(\n");
}

#[test]
fn generate_rules_deduplicates_sources() {
    let language = GoProtogen::new();
    let mut builder = protogen_cfg::ConfigSet::builder();
    language.register_directives(&mut builder);
    let directives = builder.build();

    let src = "go_proto_library(name = \"api\")\n\ngo_proto_library(name = \"api\")\n\ngo_library(name = \"lib\")\n";
    let file = BuildFile::parse("pkg/BUILD.bazel", src).unwrap();
    let other_gen = [protogen_build_file::Rule::new("go_proto_library", "extra")];
    let rel = PackagePath::new("pkg").unwrap();

    let result = language.generate_rules(GenerateArgs {
        repo_root: Path::new("/repo"),
        rel: &rel,
        dir: Path::new("/repo/pkg"),
        file: Some(&file),
        directives: &directives,
        other_gen: &other_gen[..],
    });

    let names: Vec<_> = result.rules.iter().filter_map(|rule| rule.name()).collect();
    assert_eq!(names, vec!["api_gen", "extra_gen"]);
    assert_eq!(result.imports, vec![None, None]);
    let labels: Vec<_> = result.aggregate.iter().map(ToString::to_string).collect();
    assert_eq!(labels, vec!["//pkg:api_gen", "//pkg:extra_gen"]);
    assert!(result.empty.is_empty());
}
