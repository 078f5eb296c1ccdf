//! Registry of language toolchain profiles.
//!
//! The registry is an injected, immutable value: construct it once with
//! [`ToolchainRegistry::builtin`] and hand it to the components that need
//! it. Tests substitute fake toolchains via
//! [`ToolchainRegistry::with_profiles`].

use crate::error::{PadError, Result};
use crate::lang::profile::{
    python_command, CommandTemplate, LanguageId, LanguageProfile, RunnerSpec, TemplateArg,
};
use std::collections::HashMap;

/// Immutable table of supported languages and their toolchain commands.
pub struct ToolchainRegistry {
    profiles: HashMap<LanguageId, LanguageProfile>,
}

impl ToolchainRegistry {
    /// Registry with the stock C, C++, Java and Python profiles.
    pub fn builtin() -> Self {
        let mut registry = Self {
            profiles: HashMap::new(),
        };

        registry.register(c_profile());
        registry.register(cpp_profile());
        registry.register(java_profile());
        registry.register(python_profile());

        registry
    }

    /// Registry backed by the given profiles only. A profile registered
    /// for an id already present replaces the earlier one.
    pub fn with_profiles(profiles: Vec<LanguageProfile>) -> Self {
        let mut registry = Self {
            profiles: HashMap::new(),
        };
        for profile in profiles {
            registry.register(profile);
        }
        registry
    }

    fn register(&mut self, profile: LanguageProfile) {
        self.profiles.insert(profile.id, profile);
    }

    /// Look up the profile for a language.
    pub fn lookup(&self, id: LanguageId) -> Result<&LanguageProfile> {
        self.profiles
            .get(&id)
            .ok_or_else(|| PadError::UnsupportedLanguage(id.to_string()))
    }

    /// Check whether a language is registered.
    pub fn has(&self, id: LanguageId) -> bool {
        self.profiles.contains_key(&id)
    }

    /// All registered profiles, in [`LanguageId::ALL`] order.
    pub fn list(&self) -> Vec<&LanguageProfile> {
        LanguageId::ALL
            .iter()
            .filter_map(|id| self.profiles.get(id))
            .collect()
    }
}

impl Default for ToolchainRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

fn c_profile() -> LanguageProfile {
    LanguageProfile {
        id: LanguageId::C,
        extension: "c".to_string(),
        compile: Some(CommandTemplate::new(vec![
            TemplateArg::Lit("gcc".to_string()),
            TemplateArg::Lit("-o".to_string()),
            TemplateArg::ArtifactPath,
            TemplateArg::SourcePath,
        ])),
        probe: vec!["gcc".to_string(), "--version".to_string()],
        runner: RunnerSpec::NativeBinary,
    }
}

fn cpp_profile() -> LanguageProfile {
    LanguageProfile {
        id: LanguageId::Cpp,
        extension: "cpp".to_string(),
        compile: Some(CommandTemplate::new(vec![
            TemplateArg::Lit("g++".to_string()),
            TemplateArg::Lit("-o".to_string()),
            TemplateArg::ArtifactPath,
            TemplateArg::SourcePath,
        ])),
        probe: vec!["g++".to_string(), "--version".to_string()],
        runner: RunnerSpec::NativeBinary,
    }
}

fn java_profile() -> LanguageProfile {
    LanguageProfile {
        id: LanguageId::Java,
        extension: "java".to_string(),
        compile: Some(CommandTemplate::new(vec![
            TemplateArg::Lit("javac".to_string()),
            TemplateArg::SourcePath,
        ])),
        probe: vec!["javac".to_string(), "--version".to_string()],
        runner: RunnerSpec::JvmClass,
    }
}

fn python_profile() -> LanguageProfile {
    LanguageProfile {
        id: LanguageId::Python,
        extension: "py".to_string(),
        compile: None,
        probe: vec![python_command().to_string(), "--version".to_string()],
        runner: RunnerSpec::Interpreter {
            command: python_command().to_string(),
        },
    }
}
