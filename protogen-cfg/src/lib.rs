//! Typed configuration for `protogen`.
//!
//! The same machinery backs two different kinds of settings:
//!
//! * Flags for the tool itself, e.g. which filenames count as BUILD files. These are seeded from
//!   defaults, `protogen.toml`, and the command line.
//! * Directives for language extensions, which are read out of `# gazelle:<key> <value>` comments
//!   in a workspace's BUILD files.
//!
//! Every setting is declared once as a `static` [`Config`] and registered into a
//! [`ConfigSetBuilder`]. The resulting [`ConfigSet`] is cheap to clone and all clones observe
//! updates.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use compact_str::CompactString;

/// A single configuration setting.
pub struct Config<V: ConfigValue> {
    name: &'static str,
    desc: &'static str,
    default: V,
}

impl<V: ConfigValue> Config<V> {
    /// Define a new [`Config`] with a default value.
    pub const fn new(name: &'static str, desc: &'static str, default: V) -> Self {
        Config {
            name,
            desc,
            default,
        }
    }

    /// Name this [`Config`] is registered under.
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Read the value of this [`Config`] from the provided [`ConfigSet`].
    ///
    /// # Panics
    /// * If this [`Config`] was never registered with the [`ConfigSetBuilder`] for `set`.
    pub fn read(&self, set: &ConfigSet) -> V::Owned {
        let value = set.entry(self.name).get();
        match V::from_value(&value) {
            Some(val) => val,
            None => panic!("programming error, found {value:?} for config {}", self.name),
        }
    }
}

/// Types a [`Config`] can hold.
pub trait ConfigValue: Copy {
    /// What reading the config returns.
    type Owned;

    fn into_value(self) -> Value;
    fn from_value(value: &Value) -> Option<Self::Owned>;
}

impl ConfigValue for bool {
    type Owned = bool;

    fn into_value(self) -> Value {
        Value::Bool(self)
    }

    fn from_value(value: &Value) -> Option<bool> {
        match value {
            Value::Bool(val) => Some(*val),
            Value::String(_) => None,
        }
    }
}

impl ConfigValue for &'static str {
    type Owned = CompactString;

    fn into_value(self) -> Value {
        Value::String(CompactString::const_new(self))
    }

    fn from_value(value: &Value) -> Option<CompactString> {
        match value {
            Value::String(val) => Some(val.clone()),
            Value::Bool(_) => None,
        }
    }
}

/// The current value of a config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Bool(bool),
    String(CompactString),
}

impl Value {
    /// Parse `raw` into a value of the same type as `self`.
    fn parse_same(&self, raw: &str) -> Result<Value, anyhow::Error> {
        match self {
            Value::Bool(_) => Ok(Value::Bool(raw.trim().parse()?)),
            Value::String(_) => Ok(Value::String(CompactString::new(raw))),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(val) => write!(f, "{val}"),
            Value::String(val) => write!(f, "'{val}'"),
        }
    }
}

#[derive(Debug)]
struct Entry {
    desc: &'static str,
    value: RwLock<Value>,
}

impl Entry {
    fn get(&self) -> Value {
        self.value
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set(&self, value: Value) {
        *self.value.write().unwrap_or_else(PoisonError::into_inner) = value;
    }
}

/// A thread-safe shareable set of [`Config`]s.
#[derive(Clone, Debug)]
pub struct ConfigSet {
    entries: Arc<BTreeMap<&'static str, Entry>>,
}

impl ConfigSet {
    /// Returns a new [`ConfigSetBuilder`].
    pub fn builder() -> ConfigSetBuilder {
        ConfigSetBuilder::default()
    }

    fn entry(&self, name: &str) -> &Entry {
        match self.entries.get(name) {
            Some(entry) => entry,
            None => panic!("tried to access unregistered config {name}"),
        }
    }

    /// Update [`Config`] in this [`ConfigSet`] with the specified value.
    ///
    /// # Panics
    /// * If [`Config`] was not previously registered with the [`ConfigSetBuilder`] that built this set.
    pub fn update<V: ConfigValue>(&self, config: &'static Config<V>, value: V) {
        self.entry(config.name).set(value.into_value());
    }

    /// Update the [`Config`] in this [`ConfigSet`] with `name` to `value`.
    ///
    /// # Errors
    ///
    /// * If no config named `name` exists in this set.
    /// * If the config specified by `name` cannot parse `value`.
    ///
    pub fn try_update(&self, name: &str, value: &str) -> Result<(), anyhow::Error> {
        let entry = self
            .entries
            .get(name)
            .ok_or_else(|| anyhow::anyhow!("no config named '{name}' found"))?;
        let value = entry.get().parse_same(value)?;
        entry.set(value);
        Ok(())
    }

    /// Returns `true` if a [`Config`] named `name` is registered in this set.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }
}

impl fmt::Display for ConfigSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, entry) in self.entries.iter() {
            writeln!(f, "{name} => {}\n\t└─ '{}'", entry.get(), entry.desc)?;
        }
        Ok(())
    }
}

/// A builder for a [`ConfigSet`].
#[derive(Default, Debug)]
pub struct ConfigSetBuilder {
    entries: BTreeMap<&'static str, Entry>,
}

impl ConfigSetBuilder {
    /// Register a [`Config`] into this [`ConfigSetBuilder`] with the default value.
    ///
    /// # Panics
    /// * If a [`Config`] with the same name was already registered.
    pub fn register<V: ConfigValue>(&mut self, config: &'static Config<V>) -> &mut Self {
        let entry = Entry {
            desc: config.desc,
            value: RwLock::new(config.default.into_value()),
        };
        if let Some(prev) = self.entries.insert(config.name, entry) {
            panic!(
                "config '{}' registered more than once, previous {:?}",
                config.name,
                prev.get()
            );
        }
        self
    }

    /// Consumes this [`ConfigSetBuilder`] constructing a [`ConfigSet`].
    pub fn build(self) -> ConfigSet {
        ConfigSet {
            entries: Arc::new(self.entries),
        }
    }
}
