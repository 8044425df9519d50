//! Renders statements back to text.
//!
//! Output loosely follows `buildifier`: one argument per line, four space indent, and multi-element
//! lists broken one element per line. Printing is a fixed point, parsing the output and printing it
//! again yields the same text.

use crate::rule::{Comments, Expr, Load, Rule};
use crate::{Node, Stmt};

const INDENT: usize = 4;

pub(crate) fn format(stmts: &[Stmt]) -> String {
    let mut out = String::new();
    for (idx, stmt) in stmts.iter().enumerate() {
        if idx > 0 {
            out.push('\n');
            if stmt.blank_before {
                out.push('\n');
            }
        }
        write_node(&mut out, &stmt.node);
    }
    if !stmts.is_empty() {
        out.push('\n');
    }
    out
}

fn write_node(out: &mut String, node: &Node) {
    match node {
        Node::Comment(lines) => {
            for (idx, line) in lines.iter().enumerate() {
                if idx > 0 {
                    out.push('\n');
                }
                out.push_str(line);
            }
        }
        Node::Load(load) => {
            write_before(out, load.comments(), 0);
            write_load(out, load);
            write_suffix(out, load.comments());
        }
        Node::Rule(rule) => {
            write_before(out, rule.comments(), 0);
            write_rule(out, rule);
            write_suffix(out, rule.comments());
        }
        Node::Raw { text, comments } => {
            write_before(out, comments, 0);
            out.push_str(text);
            write_suffix(out, comments);
        }
    }
}

fn write_before(out: &mut String, comments: &Comments, indent: usize) {
    for line in &comments.before {
        push_indent(out, indent);
        out.push_str(line);
        out.push('\n');
    }
}

fn write_suffix(out: &mut String, comments: &Comments) {
    if let Some(suffix) = &comments.suffix {
        out.push_str("  ");
        out.push_str(suffix);
    }
}

fn write_load(out: &mut String, load: &Load) {
    if load.has_inner_comments() {
        write_load_multiline(out, load);
        return;
    }

    out.push_str("load(");
    write_quoted(out, load.module());
    for symbol in load.raw_symbols() {
        out.push_str(", ");
        if symbol.local != symbol.exported {
            out.push_str(&symbol.local);
            out.push_str(" = ");
        }
        write_quoted(out, &symbol.exported);
    }
    out.push(')');
}

fn write_load_multiline(out: &mut String, load: &Load) {
    out.push_str("load(\n");
    write_before(out, &load.module_comments, INDENT);
    push_indent(out, INDENT);
    write_quoted(out, load.module());
    out.push(',');
    write_suffix(out, &load.module_comments);
    out.push('\n');

    for symbol in load.raw_symbols() {
        write_before(out, &symbol.comments, INDENT);
        push_indent(out, INDENT);
        if symbol.local != symbol.exported {
            out.push_str(&symbol.local);
            out.push_str(" = ");
        }
        write_quoted(out, &symbol.exported);
        out.push(',');
        write_suffix(out, &symbol.comments);
        out.push('\n');
    }
    for line in &load.end_comments {
        push_indent(out, INDENT);
        out.push_str(line);
        out.push('\n');
    }
    out.push(')');
}

fn write_rule(out: &mut String, rule: &Rule) {
    out.push_str(rule.kind());
    out.push('(');
    if rule.args().is_empty() && rule.end_comments.is_empty() {
        out.push(')');
        return;
    }

    out.push('\n');
    for arg in rule.args() {
        write_before(out, &arg.comments, INDENT);
        push_indent(out, INDENT);
        if let Some(key) = &arg.key {
            out.push_str(key);
            out.push_str(" = ");
        }
        write_expr(out, &arg.value, INDENT);
        out.push(',');
        write_suffix(out, &arg.comments);
        out.push('\n');
    }
    for line in &rule.end_comments {
        push_indent(out, INDENT);
        out.push_str(line);
        out.push('\n');
    }
    out.push(')');
}

fn write_expr(out: &mut String, expr: &Expr, indent: usize) {
    match expr {
        Expr::String(value) => write_quoted(out, value),
        Expr::Int(value) => out.push_str(&value.to_string()),
        Expr::Ident(ident) => out.push_str(ident),
        Expr::Raw(text) => out.push_str(text),
        Expr::List(items) => match &items[..] {
            [] => out.push_str("[]"),
            [item] if item.is_simple() => {
                out.push('[');
                write_expr(out, item, indent);
                out.push(']');
            }
            items => {
                out.push_str("[\n");
                for item in items {
                    push_indent(out, indent + INDENT);
                    write_expr(out, item, indent + INDENT);
                    out.push_str(",\n");
                }
                push_indent(out, indent);
                out.push(']');
            }
        },
        Expr::Dict(entries) => {
            if entries.is_empty() {
                out.push_str("{}");
                return;
            }
            out.push_str("{\n");
            for (key, value) in entries {
                push_indent(out, indent + INDENT);
                write_expr(out, key, indent + INDENT);
                out.push_str(": ");
                write_expr(out, value, indent + INDENT);
                out.push_str(",\n");
            }
            push_indent(out, indent);
            out.push('}');
        }
    }
}

fn write_quoted(out: &mut String, value: &str) {
    out.push('"');
    for c in value.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
    out.push('"');
}

fn push_indent(out: &mut String, indent: usize) {
    out.extend(std::iter::repeat_n(' ', indent));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn reformat(src: &str) -> String {
        format(&parse(src).unwrap())
    }

    #[test]
    fn canonical_rule() {
        let mut rule = Rule::new("go_protogen", "api_gen");
        rule.set_attr("dep", ":api");
        rule.set_attr("version", "v1");
        rule.set_attr("visibility", ["//visibility:public"]);
        rule.add_comment("# Rule statement generated by go_protogen + gazelle");

        let stmts = vec![Stmt {
            node: Node::Rule(rule),
            blank_before: false,
        }];
        let expected = r#"# Rule statement generated by go_protogen + gazelle
go_protogen(
    name = "api_gen",
    dep = ":api",
    version = "v1",
    visibility = ["//visibility:public"],
)
"#;
        assert_eq!(format(&stmts), expected);
    }

    #[test]
    fn lists_break_across_lines() {
        let mut rule = Rule::new("multirun", "go_protogen");
        rule.set_attr("commands", ["//a:foo_gen", "//b:bar_gen"]);
        rule.set_attr("jobs", 0i64);
        rule.set_attr("empty", Vec::<Expr>::new());

        let stmts = vec![Stmt {
            node: Node::Rule(rule),
            blank_before: false,
        }];
        let expected = r#"multirun(
    name = "go_protogen",
    commands = [
        "//a:foo_gen",
        "//b:bar_gen",
    ],
    jobs = 0,
    empty = [],
)
"#;
        assert_eq!(format(&stmts), expected);
    }

    #[test]
    fn formatting_is_a_fixed_point() {
        let src = r#"# Header comment.

load("@rules_multirun//:defs.bzl", "command", "multirun")
load(":defs.bzl", local = "exported")

X = 1
Y = [
    "weird",   "spacing"]

go_proto_library(name='api', deps=[":a", ':b'], tags = {"k": "v"})  # trailing

def helper():
    pass

empty()
"#;
        let once = reformat(src);
        let twice = reformat(&once);
        assert_eq!(once, twice);

        assert!(once.contains("X = 1\nY = [\n    \"weird\",   \"spacing\"]\n"));
        assert!(once.contains("    name = \"api\",\n"));
        assert!(once.contains(")  # trailing\n"));
        assert!(once.contains("load(\":defs.bzl\", local = \"exported\")"));
        assert!(once.ends_with("empty()\n"));
    }

    #[test]
    fn commented_loads() {
        let src = r#"load("@rules_multirun//:defs.bzl", # runs things
    # together
    "multirun", cmd = "command"
    # nothing else
)  # after
"#;
        let stmts = parse(src).unwrap();
        let Node::Load(load) = &stmts[0].node else {
            panic!("expected load, found {:?}", stmts[0].node);
        };
        assert_eq!(load.symbols().collect::<Vec<_>>(), vec!["multirun", "cmd"]);

        let expected = r#"load(
    "@rules_multirun//:defs.bzl",  # runs things
    # together
    "multirun",
    cmd = "command",
    # nothing else
)  # after
"#;
        let once = format(&stmts);
        assert_eq!(once, expected);
        assert_eq!(reformat(&once), once);
    }

    #[test]
    fn escapes_strings() {
        let mut out = String::new();
        write_quoted(&mut out, "a\"b\\c\n");
        assert_eq!(out, r#""a\"b\\c\n""#);
    }
}
