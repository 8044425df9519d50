//! The structured pieces of a BUILD file: rules, loads, expressions, and comments.

use compact_str::{CompactString, format_compact};
use smallvec::SmallVec;

/// Comments attached to a statement or to a single argument.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Comments {
    /// Full-line comments directly above, including the leading `#`.
    pub before: Vec<CompactString>,
    /// Comment at the end of the same line, including the leading `#`.
    pub suffix: Option<CompactString>,
}

impl Comments {
    pub fn is_empty(&self) -> bool {
        self.before.is_empty() && self.suffix.is_none()
    }
}

/// Normalize free text into a comment line.
pub(crate) fn comment_line(text: &str) -> CompactString {
    let text = text.trim_end();
    if text.starts_with('#') {
        CompactString::new(text)
    } else {
        format_compact!("# {text}")
    }
}

/// Value of an argument to a rule.
///
/// Only the shapes we need to inspect or generate are modelled, everything else is kept verbatim
/// as [`Expr::Raw`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    String(CompactString),
    Int(i64),
    /// A bare identifier, e.g. `True` or a constant defined elsewhere in the file.
    Ident(CompactString),
    List(Vec<Expr>),
    Dict(Vec<(Expr, Expr)>),
    /// Source text of an expression we don't model, e.g. `glob(["*.go"])`.
    Raw(String),
}

impl Expr {
    /// Returns the value if this is a string literal.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Expr::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Expr]> {
        match self {
            Expr::List(items) => Some(&items[..]),
            _ => None,
        }
    }

    /// Returns the values if this is a list made up entirely of string literals.
    pub fn as_string_list(&self) -> Option<Vec<&str>> {
        self.as_list()?.iter().map(Expr::as_str).collect()
    }

    /// Whether this expression renders on a single line.
    pub(crate) fn is_simple(&self) -> bool {
        match self {
            Expr::String(_) | Expr::Int(_) | Expr::Ident(_) => true,
            Expr::Raw(text) => !text.contains('\n'),
            Expr::List(items) => items.is_empty(),
            Expr::Dict(entries) => entries.is_empty(),
        }
    }
}

impl From<&str> for Expr {
    fn from(value: &str) -> Self {
        Expr::String(CompactString::new(value))
    }
}

impl From<String> for Expr {
    fn from(value: String) -> Self {
        Expr::String(CompactString::from(value))
    }
}

impl From<CompactString> for Expr {
    fn from(value: CompactString) -> Self {
        Expr::String(value)
    }
}

impl From<i64> for Expr {
    fn from(value: i64) -> Self {
        Expr::Int(value)
    }
}

impl From<bool> for Expr {
    fn from(value: bool) -> Self {
        let ident = if value { "True" } else { "False" };
        Expr::Ident(CompactString::const_new(ident))
    }
}

impl<T: Into<Expr>> From<Vec<T>> for Expr {
    fn from(value: Vec<T>) -> Self {
        Expr::List(value.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Expr>, const N: usize> From<[T; N]> for Expr {
    fn from(value: [T; N]) -> Self {
        Expr::List(value.into_iter().map(Into::into).collect())
    }
}

/// A single argument in a rule call, either positional or `key = value`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Arg {
    pub key: Option<CompactString>,
    pub value: Expr,
    pub comments: Comments,
}

/// A call to a rule, e.g. `go_proto_library(name = "api", ...)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    kind: CompactString,
    args: Vec<Arg>,
    comments: Comments,
    /// Comments after the last argument, before the closing paren.
    pub(crate) end_comments: Vec<CompactString>,
}

impl Rule {
    /// Create a new [`Rule`] of `kind` with a `name` attribute.
    pub fn new(kind: &str, name: &str) -> Self {
        let mut rule = Rule {
            kind: CompactString::new(kind),
            args: Vec::new(),
            comments: Comments::default(),
            end_comments: Vec::new(),
        };
        rule.set_attr("name", name);
        rule
    }

    pub(crate) fn from_parts(kind: CompactString, args: Vec<Arg>, end_comments: Vec<CompactString>) -> Self {
        Rule {
            kind,
            args,
            comments: Comments::default(),
            end_comments,
        }
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Value of the `name` attribute, if it's a string literal.
    pub fn name(&self) -> Option<&str> {
        self.attr_str("name")
    }

    pub fn attr(&self, key: &str) -> Option<&Expr> {
        self.args
            .iter()
            .find(|arg| arg.key.as_deref() == Some(key))
            .map(|arg| &arg.value)
    }

    /// Value of the attribute `key`, if it's a string literal.
    pub fn attr_str(&self, key: &str) -> Option<&str> {
        self.attr(key).and_then(Expr::as_str)
    }

    pub fn args(&self) -> &[Arg] {
        &self.args[..]
    }

    /// Set the attribute `key`, replacing the value in place if it already exists.
    ///
    /// Returns `true` if the rule changed.
    pub fn set_attr<V: Into<Expr>>(&mut self, key: &str, value: V) -> bool {
        let value = value.into();
        match self
            .args
            .iter_mut()
            .find(|arg| arg.key.as_deref() == Some(key))
        {
            Some(arg) if arg.value == value => false,
            Some(arg) => {
                arg.value = value;
                true
            }
            None => {
                self.args.push(Arg {
                    key: Some(CompactString::new(key)),
                    value,
                    comments: Comments::default(),
                });
                true
            }
        }
    }

    /// Remove the attribute `key`, returning its previous value.
    pub fn del_attr(&mut self, key: &str) -> Option<Expr> {
        let idx = self
            .args
            .iter()
            .position(|arg| arg.key.as_deref() == Some(key))?;
        Some(self.args.remove(idx).value)
    }

    /// Attach a full-line comment above this rule.
    pub fn add_comment(&mut self, text: &str) {
        self.comments.before.push(comment_line(text));
    }

    pub fn comments(&self) -> &Comments {
        &self.comments
    }

    pub(crate) fn comments_mut(&mut self) -> &mut Comments {
        &mut self.comments
    }
}

/// A symbol imported by a [`Load`], `local = "exported"` when the two differ.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadSymbol {
    pub local: CompactString,
    pub exported: CompactString,
    pub comments: Comments,
}

/// A `load("<module>", "<symbol>", ...)` statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Load {
    module: CompactString,
    symbols: SmallVec<[LoadSymbol; 4]>,
    comments: Comments,
    /// Comments inside the parens around the module argument.
    pub(crate) module_comments: Comments,
    /// Comments after the last symbol, before the closing paren.
    pub(crate) end_comments: Vec<CompactString>,
}

impl Load {
    pub fn new(module: &str) -> Self {
        Load {
            module: CompactString::new(module),
            symbols: SmallVec::new(),
            comments: Comments::default(),
            module_comments: Comments::default(),
            end_comments: Vec::new(),
        }
    }

    pub(crate) fn from_parts(
        module: CompactString,
        module_comments: Comments,
        symbols: SmallVec<[LoadSymbol; 4]>,
        end_comments: Vec<CompactString>,
    ) -> Self {
        Load {
            module,
            symbols,
            comments: Comments::default(),
            module_comments,
            end_comments,
        }
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    /// Local names of every symbol this statement binds.
    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.symbols.iter().map(|sym| sym.local.as_str())
    }

    pub fn has(&self, symbol: &str) -> bool {
        self.symbols.iter().any(|sym| sym.local == symbol)
    }

    /// Add `symbol`, returns `false` if it was already loaded.
    pub fn add(&mut self, symbol: &str) -> bool {
        if self.has(symbol) {
            return false;
        }
        self.symbols.push(LoadSymbol {
            local: CompactString::new(symbol),
            exported: CompactString::new(symbol),
            comments: Comments::default(),
        });
        true
    }

    /// Remove `symbol`, returns `false` if it wasn't loaded.
    pub fn remove(&mut self, symbol: &str) -> bool {
        let before = self.symbols.len();
        self.symbols.retain(|sym| sym.local != symbol);
        before != self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub(crate) fn raw_symbols(&self) -> &[LoadSymbol] {
        &self.symbols[..]
    }

    /// Whether any comments live inside the parens, which forces one argument per line.
    pub(crate) fn has_inner_comments(&self) -> bool {
        !self.module_comments.is_empty()
            || !self.end_comments.is_empty()
            || self.symbols.iter().any(|sym| !sym.comments.is_empty())
    }

    /// Attach a full-line comment above this load.
    pub fn add_comment(&mut self, text: &str) {
        self.comments.before.push(comment_line(text));
    }

    pub fn comments(&self) -> &Comments {
        &self.comments
    }

    pub(crate) fn comments_mut(&mut self) -> &mut Comments {
        &mut self.comments
    }
}
