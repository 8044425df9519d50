//! Merging generated rules into an existing BUILD file.

use std::collections::{BTreeMap, BTreeSet};

use protogen_build_file::{BuildFile, Load, Rule};

use crate::language::{KindInfo, LoadInfo};

/// Merge `generated` and `empty` rules into `file`.
///
/// * Rules in `empty` are deleted, unless a rule with the same kind and name was also generated.
/// * Generated rules that already exist have their owned attributes overwritten.
/// * Everything else is appended to the end of the file.
///
/// Returns `true` if the file changed.
pub fn merge_rules(
    file: &mut BuildFile,
    generated: &[Rule],
    empty: &[Rule],
    kinds: &BTreeMap<&'static str, KindInfo>,
) -> bool {
    let mut changed = false;

    let stale: Vec<&Rule> = empty
        .iter()
        .filter(|rule| rule.name().is_some())
        .filter(|rule| !generated.iter().any(|other| same_rule(rule, other)))
        .collect();
    if !stale.is_empty() {
        let deleted = file.delete_rules(|rule| stale.iter().any(|other| same_rule(rule, other)));
        if deleted.is_some() {
            tracing::debug!(path = ?file.path(), count = stale.len(), "deleted stale rules");
            changed = true;
        }
    }

    for rule in generated {
        let Some(name) = rule.name() else {
            file.add_rule(rule.clone());
            changed = true;
            continue;
        };
        let Some(existing) = file.find_rule_mut(rule.kind(), name) else {
            file.add_rule(rule.clone());
            changed = true;
            continue;
        };

        let info = kinds.get(rule.kind()).copied().unwrap_or_default();
        for attr in info.owned_attrs {
            changed |= match rule.attr(attr) {
                Some(value) => existing.set_attr(attr, value.clone()),
                None => existing.del_attr(attr).is_some(),
            };
        }
    }

    changed
}

fn same_rule(a: &Rule, b: &Rule) -> bool {
    a.kind() == b.kind() && a.name() == b.name()
}

/// Make the loads of `file` match the rule kinds it uses.
///
/// Symbols from `loads` that a rule in the file uses get loaded, ones that are no longer used get
/// removed. Loads of modules we don't know about are left alone.
///
/// Returns `true` if the file changed.
pub fn fix_loads(file: &mut BuildFile, loads: &[LoadInfo]) -> bool {
    let used: BTreeSet<String> = file.rules().map(|rule| rule.kind().to_string()).collect();
    let mut changed = false;

    for info in loads {
        let (needed, unused): (Vec<&str>, Vec<&str>) = info
            .symbols
            .iter()
            .copied()
            .partition(|symbol| used.contains(*symbol));

        if !unused.is_empty() && file.find_load(info.module).is_some() {
            changed |= file.remove_load_symbols(info.module, &unused[..]);
        }
        if !needed.is_empty() {
            let mut load = Load::new(info.module);
            for symbol in needed {
                load.add(symbol);
            }
            let idx = file.load_insertion_index();
            changed |= file.insert_load(idx, load);
        }
    }

    changed
}
