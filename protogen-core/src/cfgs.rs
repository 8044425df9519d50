//! Single interface for registering all of the tool [`Config`]s.
//!
//! Directives for language extensions live in a separate [`ConfigSet`], see
//! [`Engine::directive_set`].
//!
//! [`Config`]: protogen_cfg::Config
//! [`ConfigSet`]: protogen_cfg::ConfigSet
//! [`Engine::directive_set`]: crate::engine::Engine::directive_set

use protogen_cfg::{ConfigSet, ConfigSetBuilder};

pub fn all_cfgs(builder: &mut ConfigSetBuilder) {
    crate::defs::register_configs(builder);
}

/// A [`ConfigSet`] with every tool config at its default.
pub fn default_set() -> ConfigSet {
    let mut builder = ConfigSet::builder();
    all_cfgs(&mut builder);
    builder.build()
}
