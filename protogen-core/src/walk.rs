//! Discovering the packages of a repository.

use std::path::{Path, PathBuf};

use anyhow::Context;
use globset::GlobSet;
use protogen_types::PackagePath;

/// A directory visited by the walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Package {
    pub rel: PackagePath,
    /// Absolute path of the directory.
    pub dir: PathBuf,
}

/// Every directory underneath `root` that isn't matched by `ignore`, in pre-order.
///
/// Siblings are visited sorted by name, and symlinks are not followed.
pub fn walk(root: &Path, ignore: &GlobSet) -> Result<Vec<Package>, anyhow::Error> {
    let walker = walkdir::WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            if entry.depth() == 0 || !entry.file_type().is_dir() {
                return true;
            }
            let rel = entry.path().strip_prefix(root).unwrap_or(entry.path());
            let ignored = ignore.is_match(rel);
            if ignored {
                tracing::trace!(?rel, "ignoring directory");
            }
            !ignored
        });

    let mut packages = Vec::new();
    for entry in walker {
        let entry = entry.with_context(|| format!("walking {}", root.display()))?;
        if !entry.file_type().is_dir() {
            continue;
        }
        let rel = entry.path().strip_prefix(root)?;
        packages.push(Package {
            rel: PackagePath::from_relative_path(rel)?,
            dir: entry.into_path(),
        });
    }

    Ok(packages)
}

/// Indexes into a pre-order list of `packages`, reordered so children come before parents.
pub fn post_order(packages: &[Package]) -> Vec<usize> {
    let mut order = Vec::with_capacity(packages.len());
    let mut stack: Vec<usize> = Vec::new();

    for (idx, package) in packages.iter().enumerate() {
        let depth = package.rel.depth();
        while let Some(&top) = stack.last() {
            if packages[top].rel.depth() < depth {
                break;
            }
            order.push(top);
            stack.pop();
        }
        stack.push(idx);
    }
    order.extend(stack.into_iter().rev());

    order
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rels(packages: &[Package]) -> Vec<&str> {
        packages.iter().map(|package| package.rel.as_str()).collect()
    }

    #[test]
    fn smoketest_walk() {
        let temp = tempfile::TempDir::new().unwrap();
        for dir in ["b/baz", "a", ".git/objects", "web/node_modules/x", "bazel-out"] {
            std::fs::create_dir_all(temp.path().join(dir)).unwrap();
        }
        std::fs::write(temp.path().join("a/BUILD.bazel"), "").unwrap();

        let ignore = crate::defs::ignore_set("**/.*,**/bazel-*,**/node_modules").unwrap();
        let packages = walk(temp.path(), &ignore).unwrap();
        assert_eq!(rels(&packages), vec!["", "a", "b", "b/baz", "web"]);
        assert_eq!(packages[1].dir, temp.path().join("a"));

        let order: Vec<_> = post_order(&packages)
            .into_iter()
            .map(|idx| packages[idx].rel.as_str())
            .collect();
        assert_eq!(order, vec!["a", "b/baz", "b", "web", ""]);
    }

    #[test]
    fn missing_root_is_an_error() {
        let temp = tempfile::TempDir::new().unwrap();
        let ignore = GlobSet::empty();
        assert!(walk(&temp.path().join("nope"), &ignore).is_err());
    }
}
