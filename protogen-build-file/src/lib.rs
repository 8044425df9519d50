//! Reading, editing, and writing BUILD files.
//!
//! A [`BuildFile`] is a list of top-level statements. Rule calls and `load(...)` statements are
//! parsed into [`Rule`]s and [`Load`]s that can be edited, everything else is carried along as
//! source text. Comments directly above a statement stay attached to it, so deleting a rule also
//! deletes the comments that describe it.

use std::path::{Path, PathBuf};

use compact_str::CompactString;

mod lexer;
mod parser;
mod printer;
mod rule;

pub use rule::{Arg, Comments, Expr, Load, LoadSymbol, Rule};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{}:{line}:{col}: {message}", path.display())]
    Syntax {
        path: PathBuf,
        line: usize,
        col: usize,
        message: &'static str,
    },
    #[error("failed to read {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write {}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A `# <prefix>:<key> <value>` comment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directive {
    pub key: CompactString,
    pub value: CompactString,
}

impl Directive {
    /// Parse `line` as a directive with the provided `prefix`, e.g. `gazelle`.
    pub fn parse(line: &str, prefix: &str) -> Option<Directive> {
        let rest = line.trim().strip_prefix('#')?.trim_start();
        let rest = rest.strip_prefix(prefix)?.strip_prefix(':')?;
        let (key, value) = match rest.split_once(char::is_whitespace) {
            Some((key, value)) => (key, value.trim()),
            None => (rest.trim_end(), ""),
        };
        let is_word = |c: char| c.is_ascii_alphanumeric() || c == '_';
        if key.is_empty() || !key.chars().all(is_word) {
            return None;
        }

        Some(Directive {
            key: CompactString::new(key),
            value: CompactString::new(value),
        })
    }
}

/// A single top-level statement.
#[derive(Debug, Clone)]
pub(crate) struct Stmt {
    pub(crate) node: Node,
    /// Whether a blank line separates this statement from the previous one.
    pub(crate) blank_before: bool,
}

#[derive(Debug, Clone)]
pub(crate) enum Node {
    Load(Load),
    Rule(Rule),
    /// A block of comments not attached to any statement.
    Comment(Vec<CompactString>),
    /// Any statement we don't model, kept as source text.
    Raw { text: String, comments: Comments },
}

/// A parsed BUILD file.
#[derive(Debug, Clone)]
pub struct BuildFile {
    /// Where this file was loaded from, or will be saved to.
    path: PathBuf,
    stmts: Vec<Stmt>,
    /// The text this file was parsed from, empty for new files.
    source: String,
}

impl BuildFile {
    /// A new, empty, [`BuildFile`] that will be saved at `path`.
    pub fn empty<P: Into<PathBuf>>(path: P) -> Self {
        BuildFile {
            path: path.into(),
            stmts: Vec::new(),
            source: String::new(),
        }
    }

    /// Parse `source` as the contents of the file at `path`.
    pub fn parse<P: Into<PathBuf>>(path: P, source: &str) -> Result<Self, Error> {
        let path = path.into();
        let stmts = match parser::parse(source) {
            Ok(stmts) => stmts,
            Err(err) => {
                return Err(Error::Syntax {
                    path,
                    line: err.line,
                    col: err.col,
                    message: err.message,
                });
            }
        };

        Ok(BuildFile {
            path,
            stmts,
            source: source.to_string(),
        })
    }

    /// Read and parse the file at `path`.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| Error::Read {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::trace!(?path, len = source.len(), "loaded BUILD file");
        BuildFile::parse(path, &source)
    }

    /// Write this file to [`BuildFile::path`].
    pub fn save(&self) -> Result<(), Error> {
        let path = &self.path;
        std::fs::write(path, self.format()).map_err(|source| Error::Write {
            path: path.clone(),
            source,
        })?;
        tracing::debug!(?path, "saved BUILD file");
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Render this file as text.
    pub fn format(&self) -> String {
        printer::format(&self.stmts[..])
    }

    /// Returns `true` if rendering this file would produce different text than it was loaded from.
    pub fn is_changed(&self) -> bool {
        self.format() != self.source
    }

    /// All of the rules in this file, in order.
    pub fn rules(&self) -> impl Iterator<Item = &Rule> {
        self.stmts.iter().filter_map(|stmt| match &stmt.node {
            Node::Rule(rule) => Some(rule),
            _ => None,
        })
    }

    pub fn rules_mut(&mut self) -> impl Iterator<Item = &mut Rule> {
        self.stmts.iter_mut().filter_map(|stmt| match &mut stmt.node {
            Node::Rule(rule) => Some(rule),
            _ => None,
        })
    }

    /// Find the rule of `kind` named `name`.
    pub fn find_rule(&self, kind: &str, name: &str) -> Option<&Rule> {
        self.rules()
            .find(|rule| rule.kind() == kind && rule.name() == Some(name))
    }

    pub fn find_rule_mut(&mut self, kind: &str, name: &str) -> Option<&mut Rule> {
        self.rules_mut()
            .find(|rule| rule.kind() == kind && rule.name() == Some(name))
    }

    /// All of the load statements in this file, in order.
    pub fn loads(&self) -> impl Iterator<Item = &Load> {
        self.stmts.iter().filter_map(|stmt| match &stmt.node {
            Node::Load(load) => Some(load),
            _ => None,
        })
    }

    pub fn find_load(&self, module: &str) -> Option<&Load> {
        self.loads().find(|load| load.module() == module)
    }

    /// Every directive with `prefix` in top-level comments, in order.
    pub fn directives(&self, prefix: &str) -> Vec<Directive> {
        let mut lines: Vec<&str> = Vec::new();
        for stmt in &self.stmts {
            let comments = match &stmt.node {
                Node::Comment(block) => {
                    lines.extend(block.iter().map(|line| line.as_str()));
                    continue;
                }
                Node::Load(load) => load.comments(),
                Node::Rule(rule) => rule.comments(),
                Node::Raw { comments, .. } => comments,
            };
            lines.extend(comments.before.iter().map(|line| line.as_str()));
            lines.extend(comments.suffix.as_deref());
        }

        lines
            .into_iter()
            .filter_map(|line| Directive::parse(line, prefix))
            .collect()
    }

    /// Delete every rule matching `predicate`, along with its comments.
    ///
    /// Returns the statement index of the first deleted rule, which can be passed to
    /// [`BuildFile::insert_rule`] to put a replacement in the same place.
    pub fn delete_rules<F>(&mut self, mut predicate: F) -> Option<usize>
    where
        F: FnMut(&Rule) -> bool,
    {
        let mut first = None;
        let mut idx = 0;
        self.stmts.retain(|stmt| {
            let delete = matches!(&stmt.node, Node::Rule(rule) if predicate(rule));
            if delete {
                first.get_or_insert(idx);
            } else {
                idx += 1;
            }
            !delete
        });
        first
    }

    /// Insert `rule` at statement index `idx`, clamped to the end of the file.
    pub fn insert_rule(&mut self, idx: usize, rule: Rule) {
        self.insert_stmt(idx, Node::Rule(rule));
    }

    /// Append `rule` to the end of the file.
    pub fn add_rule(&mut self, rule: Rule) {
        self.insert_stmt(self.stmts.len(), Node::Rule(rule));
    }

    /// Insert `load` at statement index `idx`.
    ///
    /// If the file already loads from the same module the symbols are merged into the existing
    /// statement instead, so inserting the same load repeatedly never creates duplicates.
    ///
    /// Returns `true` if the file changed.
    pub fn insert_load(&mut self, idx: usize, load: Load) -> bool {
        let existing = self.stmts.iter_mut().find_map(|stmt| match &mut stmt.node {
            Node::Load(existing) if existing.module() == load.module() => Some(existing),
            _ => None,
        });

        match existing {
            Some(existing) => {
                let mut changed = false;
                for symbol in load.symbols() {
                    changed |= existing.add(symbol);
                }
                if existing.comments().is_empty() && !load.comments().is_empty() {
                    *existing.comments_mut() = load.comments().clone();
                    changed = true;
                }
                changed
            }
            None => {
                self.insert_stmt(idx, Node::Load(load));
                true
            }
        }
    }

    /// Remove `symbols` from the load of `module`, deleting the statement if nothing is left.
    ///
    /// Returns `true` if the file changed.
    pub fn remove_load_symbols(&mut self, module: &str, symbols: &[&str]) -> bool {
        let mut changed = false;
        let mut emptied = false;
        for stmt in &mut self.stmts {
            if let Node::Load(load) = &mut stmt.node {
                if load.module() != module {
                    continue;
                }
                for symbol in symbols {
                    changed |= load.remove(symbol);
                }
                emptied |= load.is_empty();
            }
        }

        if emptied {
            self.stmts.retain(|stmt| {
                !matches!(&stmt.node, Node::Load(load) if load.module() == module && load.is_empty())
            });
        }
        changed
    }

    /// Statement index where a new load should go: after the last existing load, or after any
    /// leading comment blocks.
    pub fn load_insertion_index(&self) -> usize {
        let last_load = self
            .stmts
            .iter()
            .rposition(|stmt| matches!(stmt.node, Node::Load(_)));
        match last_load {
            Some(idx) => idx + 1,
            None => self
                .stmts
                .iter()
                .position(|stmt| !matches!(stmt.node, Node::Comment(_)))
                .unwrap_or(self.stmts.len()),
        }
    }

    fn insert_stmt(&mut self, idx: usize, node: Node) {
        let idx = idx.min(self.stmts.len());
        let is_load = matches!(node, Node::Load(_));

        // Keep runs of loads together, everything else gets a blank line.
        let prev_is_load = idx
            .checked_sub(1)
            .and_then(|prev| self.stmts.get(prev))
            .is_some_and(|prev| matches!(prev.node, Node::Load(_)));
        let blank_before = idx > 0 && !(is_load && prev_is_load);

        if let Some(next) = self.stmts.get_mut(idx) {
            let next_is_load = matches!(next.node, Node::Load(_));
            if !(is_load && next_is_load) {
                next.blank_before = true;
            }
        }

        self.stmts.insert(idx, Stmt { node, blank_before });
    }
}
