//! Types used throughout `protogen`.
//!
//! The goal of this crate is to be very lightweight, so take care with adding dependencies.

use std::fmt;
use std::path::{Component, Path, PathBuf};

use compact_str::CompactString;

/// Errors from parsing a [`PackagePath`] or [`Label`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LabelError {
    #[error("invalid package path '{path}': {reason}")]
    InvalidPackage { path: String, reason: &'static str },
    #[error("invalid target name '{name}': {reason}")]
    InvalidName { name: String, reason: &'static str },
    #[error("invalid label '{label}': {reason}")]
    InvalidLabel { label: String, reason: &'static str },
}

/// Path of a package (a directory containing a BUILD file) relative to the repository root.
///
/// ### Specification
/// * Components are separated by `/`, regardless of platform.
/// * No empty, `.`, or `..` components.
/// * The repository root is the empty path.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PackagePath(CompactString);

impl PackagePath {
    /// The [`PackagePath`] of the repository root.
    pub const fn root() -> Self {
        PackagePath(CompactString::const_new(""))
    }

    /// Parse a slash-separated relative path, normalizing away empty and `.` components.
    ///
    /// # Errors
    ///
    /// * If the path is absolute.
    /// * If the path contains a `..` component.
    pub fn new(raw: &str) -> Result<Self, LabelError> {
        let invalid = |reason| LabelError::InvalidPackage {
            path: raw.to_string(),
            reason,
        };

        if raw.starts_with('/') {
            return Err(invalid("must be relative to the repository root"));
        }

        let mut normalized = CompactString::default();
        for component in raw.split('/') {
            match component {
                "" | "." => continue,
                ".." => return Err(invalid("must not contain '..'")),
                component => {
                    if component.chars().any(char::is_whitespace) {
                        return Err(invalid("must not contain whitespace"));
                    }
                    if !normalized.is_empty() {
                        normalized.push('/');
                    }
                    normalized.push_str(component);
                }
            }
        }

        Ok(PackagePath(normalized))
    }

    /// Create a [`PackagePath`] from a filesystem path that is relative to the repository root.
    pub fn from_relative_path<P: AsRef<Path>>(path: P) -> Result<Self, LabelError> {
        let path = path.as_ref();
        let invalid = |reason| LabelError::InvalidPackage {
            path: path.display().to_string(),
            reason,
        };

        let mut normalized = CompactString::default();
        for component in path.components() {
            match component {
                Component::CurDir => continue,
                Component::Normal(part) => {
                    let part = part.to_str().ok_or_else(|| invalid("non UTF-8 path"))?;
                    if !normalized.is_empty() {
                        normalized.push('/');
                    }
                    normalized.push_str(part);
                }
                Component::ParentDir => return Err(invalid("must not contain '..'")),
                Component::RootDir | Component::Prefix(_) => {
                    return Err(invalid("must be relative to the repository root"));
                }
            }
        }

        Ok(PackagePath(normalized))
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Iterate over the `/` separated components of this path.
    pub fn components(&self) -> impl Iterator<Item = &str> {
        self.0.split('/').filter(|c| !c.is_empty())
    }

    /// Number of components in this path, the root has a depth of 0.
    pub fn depth(&self) -> usize {
        self.components().count()
    }

    /// The last component of this path, `None` for the root.
    pub fn last_component(&self) -> Option<&str> {
        self.components().last()
    }

    /// Resolve this package to a directory underneath `root`.
    pub fn to_path<P: AsRef<Path>>(&self, root: P) -> PathBuf {
        let mut path = root.as_ref().to_path_buf();
        path.extend(self.components());
        path
    }
}

impl fmt::Display for PackagePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Validate the name of a build target.
///
/// We're intentionally lenient here, names only need to survive being embedded in a label.
pub fn validate_target_name(name: &str) -> Result<(), LabelError> {
    let invalid = |reason| LabelError::InvalidName {
        name: name.to_string(),
        reason,
    };

    if name.is_empty() {
        return Err(invalid("must not be empty"));
    }
    if name.contains(':') {
        return Err(invalid("must not contain ':'"));
    }
    if name.starts_with('/') || name.ends_with('/') {
        return Err(invalid("must not start or end with '/'"));
    }
    if name.chars().any(|c| c.is_whitespace() || c == '"' || c == '\\') {
        return Err(invalid("must not contain whitespace, quotes, or backslashes"));
    }
    Ok(())
}

/// A fully-qualified identifier for a build target, e.g. `//proto/api:api_gen`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Label {
    /// External repository, `None` for the main repository.
    repo: Option<CompactString>,
    /// Package the target is declared in.
    package: PackagePath,
    /// Name of the target.
    name: CompactString,
}

impl Label {
    /// Create a [`Label`] for target `name` in `package` of the main repository.
    pub fn new(package: PackagePath, name: &str) -> Result<Self, LabelError> {
        validate_target_name(name)?;
        Ok(Label {
            repo: None,
            package,
            name: CompactString::new(name),
        })
    }

    /// Parse a label as written in package `from`, e.g. `:foo`, `//a/b:c`, `@repo//a:b`, or
    /// `//a/b`.
    pub fn parse_relative(raw: &str, from: &PackagePath) -> Result<Self, LabelError> {
        let invalid = |reason| LabelError::InvalidLabel {
            label: raw.to_string(),
            reason,
        };

        if let Some(name) = raw.strip_prefix(':') {
            validate_target_name(name)?;
            return Ok(Label {
                repo: None,
                package: from.clone(),
                name: CompactString::new(name),
            });
        }

        let (repo, rest) = match raw.strip_prefix('@') {
            Some(qualified) => {
                let Some(idx) = qualified.find("//") else {
                    return Err(invalid("missing '//' after repository"));
                };
                let (repo, rest) = qualified.split_at(idx);
                let repo = repo.strip_prefix('@').unwrap_or(repo);
                if repo.is_empty() {
                    (None, rest)
                } else {
                    (Some(CompactString::new(repo)), rest)
                }
            }
            None => (None, raw),
        };

        let Some(rest) = rest.strip_prefix("//") else {
            return Err(invalid("must start with '//', '@', or ':'"));
        };

        let (package, name) = match rest.split_once(':') {
            Some((package, name)) => (PackagePath::new(package)?, CompactString::new(name)),
            None => {
                let package = PackagePath::new(rest)?;
                let name = package
                    .last_component()
                    .map(CompactString::new)
                    .or_else(|| repo.clone())
                    .ok_or_else(|| invalid("no target name"))?;
                (package, name)
            }
        };
        validate_target_name(&name)?;

        Ok(Label {
            repo,
            package,
            name,
        })
    }

    pub fn repo(&self) -> Option<&str> {
        self.repo.as_deref()
    }

    pub fn package(&self) -> &PackagePath {
        &self.package
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(repo) = &self.repo {
            write!(f, "@{repo}")?;
        }
        write!(f, "//{}:{}", self.package, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn package_path_normalizes() {
        assert_eq!(PackagePath::new("").unwrap(), PackagePath::root());
        assert_eq!(PackagePath::new("./").unwrap(), PackagePath::root());
        assert_eq!(PackagePath::new("a//b/./c/").unwrap().as_str(), "a/b/c");
        assert_eq!(PackagePath::new("a/b").unwrap().depth(), 2);
        assert_eq!(PackagePath::new("a/b").unwrap().last_component(), Some("b"));
        assert!(PackagePath::root().is_root());
    }

    #[test]
    fn package_path_rejects_escapes() {
        assert!(PackagePath::new("../outside").is_err());
        assert!(PackagePath::new("a/../../b").is_err());
        assert!(PackagePath::new("/abs/path").is_err());
        assert!(PackagePath::new("has space").is_err());
        assert!(PackagePath::from_relative_path("/abs").is_err());
        assert!(PackagePath::from_relative_path("a/../b").is_err());
    }

    #[test]
    fn package_path_from_filesystem() {
        let path = PackagePath::from_relative_path(Path::new("proto").join("api")).unwrap();
        assert_eq!(path.as_str(), "proto/api");
        assert_eq!(
            path.to_path("/repo"),
            Path::new("/repo").join("proto").join("api")
        );
    }

    #[test]
    fn label_display() {
        let root = Label::new(PackagePath::root(), "foo_gen").unwrap();
        assert_eq!(root.to_string(), "//:foo_gen");

        let nested = Label::new(PackagePath::new("a/b").unwrap(), "bar_gen").unwrap();
        assert_eq!(nested.to_string(), "//a/b:bar_gen");
    }

    #[test]
    fn label_parse() {
        let root = PackagePath::root();
        let label = Label::parse_relative("//a/b:c", &root).unwrap();
        assert_eq!(label.package().as_str(), "a/b");
        assert_eq!(label.name(), "c");
        assert_eq!(label.repo(), None);

        let label = Label::parse_relative("//a/b", &root).unwrap();
        assert_eq!(label.name(), "b");

        let label = Label::parse_relative("@rules_multirun//:defs.bzl", &root).unwrap();
        assert_eq!(label.repo(), Some("rules_multirun"));
        assert!(label.package().is_root());
        assert_eq!(label.name(), "defs.bzl");
        assert_eq!(label.to_string(), "@rules_multirun//:defs.bzl");

        let from = PackagePath::new("proto").unwrap();
        let label = Label::parse_relative(":api", &from).unwrap();
        assert_eq!(label.to_string(), "//proto:api");
        assert_eq!(label, Label::parse_relative("//proto:api", &root).unwrap());

        assert!(Label::parse_relative(":", &from).is_err());
        assert!(Label::parse_relative("a/b:c", &from).is_err());
        assert!(Label::parse_relative("//a:", &from).is_err());
        assert!(Label::parse_relative("//:", &from).is_err());
    }

    #[test]
    fn target_names() {
        assert!(validate_target_name("go_protogen").is_ok());
        assert!(validate_target_name("nested/name").is_ok());
        assert!(validate_target_name("").is_err());
        assert!(validate_target_name("a:b").is_err());
        assert!(validate_target_name("has space").is_err());
    }
}
