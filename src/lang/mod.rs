//! Language profiles and registry.
//!
//! The orchestration core stays language-agnostic. Profiles define the
//! compile/run/probe commands for each language; the registry is the one
//! place free-form language input is validated.

pub mod profile;
pub mod registry;

pub use profile::{CommandTemplate, LanguageId, LanguageProfile, RunnerSpec, TemplateArg};
pub use registry::ToolchainRegistry;
