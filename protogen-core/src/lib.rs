//! Host driver for `protogen`.
//!
//! The [`Engine`] walks a repository, hands each package to every registered [`Language`], merges
//! what they generate back into the package's BUILD file, and finally gives every language one
//! chance to act on what it collected across the whole run.

use std::path::Path;

use compact_str::CompactString;
use protogen_build_file::BuildFile;

pub mod accumulator;
pub mod cfgs;
pub mod defs;
pub mod engine;
pub mod language;
pub mod merge;
pub mod walk;

pub use accumulator::Accumulator;
pub use engine::{Engine, EngineConfig, FinishOutcome, RunReport};
pub use language::{
    ConfigureArgs, FinishArgs, GenerateArgs, GenerateResult, KindInfo, Language, LoadInfo,
};

/// Load the BUILD file in `dir`, the first of `names` that exists wins.
pub fn load_build_file(
    dir: &Path,
    names: &[CompactString],
) -> Result<Option<BuildFile>, protogen_build_file::Error> {
    for name in names {
        let path = dir.join(name.as_str());
        if path.is_file() {
            return BuildFile::load(path).map(Some);
        }
    }
    Ok(None)
}
