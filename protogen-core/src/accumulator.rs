use std::collections::BTreeSet;

use protogen_types::Label;

/// Labels collected from every package during a single run.
///
/// Append-only, keeps the order labels were first seen in, and ignores duplicates.
#[derive(Debug, Default)]
pub struct Accumulator {
    labels: Vec<Label>,
    seen: BTreeSet<Label>,
}

impl Accumulator {
    pub fn new() -> Self {
        Accumulator::default()
    }

    /// Add `label`, returns `false` if it was already collected.
    pub fn push(&mut self, label: Label) -> bool {
        if self.seen.contains(&label) {
            return false;
        }
        self.seen.insert(label.clone());
        self.labels.push(label);
        true
    }

    /// Add every label from `labels`, returns how many were new.
    pub fn extend<I: IntoIterator<Item = Label>>(&mut self, labels: I) -> usize {
        labels
            .into_iter()
            .map(|label| self.push(label))
            .filter(|added| *added)
            .count()
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Copy of everything collected so far.
    pub fn snapshot(&self) -> Vec<Label> {
        self.labels.clone()
    }
}
