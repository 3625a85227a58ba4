//! Site generator detection.
//!
//! The generator is chosen from marker files in the working tree. Each
//! [`BuildVariant`] owns its markers, its ordered build steps and its
//! output directory, so adding a generator means adding a variant and
//! filling in those three tables.

use std::path::Path;
use std::time::Duration;

use crate::process::CommandSpec;

/// Supported static site generators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuildVariant {
    /// Node based: install dependencies, then build.
    Docusaurus,
    /// Single binary: build directly.
    Retype,
}

/// One command in a variant's build sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildStep {
    pub program: &'static str,
    pub args: &'static [&'static str],
    /// If false, a failing step is logged and the sequence continues.
    pub required: bool,
}

impl BuildStep {
    /// Turns the step into a runnable command inside `tree`.
    pub fn command(&self, tree: &Path, timeout: Duration) -> CommandSpec {
        CommandSpec::new(self.program, timeout)
            .args(self.args.iter().copied())
            .current_dir(tree)
    }
}

const DOCUSAURUS_STEPS: &[BuildStep] = &[
    BuildStep {
        program: "npm",
        args: &["install"],
        required: false,
    },
    BuildStep {
        program: "npm",
        args: &["run", "build"],
        required: true,
    },
];

const RETYPE_STEPS: &[BuildStep] = &[BuildStep {
    program: "retype",
    args: &["build"],
    required: true,
}];

impl BuildVariant {
    /// Variants in detection priority order.
    pub const ALL: &'static [BuildVariant] = &[BuildVariant::Docusaurus, BuildVariant::Retype];

    /// Used when no variant's markers are present.
    pub const FALLBACK: BuildVariant = BuildVariant::Retype;

    /// Files whose presence at the tree root selects this variant.
    pub fn markers(self) -> &'static [&'static str] {
        match self {
            BuildVariant::Docusaurus => &[
                "docusaurus.config.ts",
                "docusaurus.config.js",
                "docusaurus.config.mjs",
            ],
            BuildVariant::Retype => &["retype.yml", "retype.yaml", "retype.json"],
        }
    }

    /// Commands to run, in order.
    pub fn steps(self) -> &'static [BuildStep] {
        match self {
            BuildVariant::Docusaurus => DOCUSAURUS_STEPS,
            BuildVariant::Retype => RETYPE_STEPS,
        }
    }

    /// Directory, relative to the tree root, holding the generated site.
    pub fn output_dir(self) -> &'static str {
        match self {
            BuildVariant::Docusaurus => "build",
            BuildVariant::Retype => ".retype",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            BuildVariant::Docusaurus => "docusaurus",
            BuildVariant::Retype => "retype",
        }
    }
}

impl std::fmt::Display for BuildVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Picks the generator for a working tree.
///
/// Checks each variant's markers in priority order and falls back to
/// [`BuildVariant::FALLBACK`].
pub fn detect_variant(tree: &Path) -> BuildVariant {
    detect_with(|marker| tree.join(marker).is_file())
}

/// Detection over an arbitrary "does this marker exist" predicate.
pub fn detect_with(exists: impl Fn(&str) -> bool) -> BuildVariant {
    BuildVariant::ALL
        .iter()
        .copied()
        .find(|variant| variant.markers().iter().any(|m| exists(m)))
        .unwrap_or(BuildVariant::FALLBACK)
}
