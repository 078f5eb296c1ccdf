//! Language identifiers and per-language toolchain profiles.

use crate::error::{PadError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Closed set of supported languages.
///
/// Free-form language strings are validated into this enum exactly once, at
/// the boundary ([`FromStr`]); everything downstream matches exhaustively.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LanguageId {
    #[serde(rename = "c")]
    C,
    #[serde(rename = "cpp")]
    Cpp,
    #[serde(rename = "java")]
    Java,
    #[serde(rename = "python")]
    Python,
}

impl LanguageId {
    /// Every supported language, in display order.
    pub const ALL: [LanguageId; 4] = [
        LanguageId::C,
        LanguageId::Cpp,
        LanguageId::Java,
        LanguageId::Python,
    ];

    /// Display name, also the workspace subdirectory name.
    pub fn dir_name(&self) -> &'static str {
        match self {
            LanguageId::C => "C",
            LanguageId::Cpp => "C++",
            LanguageId::Java => "Java",
            LanguageId::Python => "Python",
        }
    }
}

impl fmt::Display for LanguageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.dir_name())
    }
}

impl FromStr for LanguageId {
    type Err = PadError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "c" => Ok(LanguageId::C),
            "cpp" | "c++" | "cxx" | "cc" => Ok(LanguageId::Cpp),
            "java" => Ok(LanguageId::Java),
            "python" | "py" | "python3" => Ok(LanguageId::Python),
            _ => Err(PadError::UnsupportedLanguage(s.to_string())),
        }
    }
}

/// One element of a compile command template.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TemplateArg {
    /// Literal argument passed through unchanged.
    Lit(String),
    /// Substituted with the written source file path.
    SourcePath,
    /// Substituted with the resolved artifact path.
    ArtifactPath,
}

/// Argv template rendered against resolved workspace paths.
///
/// Templates are data, not code: the full command line for every language
/// lives in its [`LanguageProfile`] and rendering happens in one place.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommandTemplate {
    args: Vec<TemplateArg>,
}

impl CommandTemplate {
    pub fn new(args: Vec<TemplateArg>) -> Self {
        Self { args }
    }

    /// Render the template into a concrete argv.
    pub fn render(&self, source_path: &Path, artifact_path: &Path) -> Vec<String> {
        self.args
            .iter()
            .map(|arg| match arg {
                TemplateArg::Lit(s) => s.clone(),
                TemplateArg::SourcePath => source_path.to_string_lossy().to_string(),
                TemplateArg::ArtifactPath => artifact_path.to_string_lossy().to_string(),
            })
            .collect()
    }
}

/// How a successfully built unit is launched.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RunnerSpec {
    /// Execute the compiled binary at the artifact path directly.
    NativeBinary,
    /// Execute `java -cp <workdir> <className>`; the class name is the
    /// source basename without its extension.
    JvmClass,
    /// Execute `<command> <source>`.
    Interpreter { command: String },
}

/// Immutable per-language toolchain descriptor.
///
/// Created once at registry construction and never mutated afterwards.
#[derive(Clone, Debug)]
pub struct LanguageProfile {
    /// Language this profile describes.
    pub id: LanguageId,
    /// Source file extension, without the dot.
    pub extension: String,
    /// Compile command template; `None` for interpreted languages.
    pub compile: Option<CommandTemplate>,
    /// Toolchain presence probe, e.g. `gcc --version`. Run in place of a
    /// compile step for interpreted languages and by toolchain diagnostics.
    pub probe: Vec<String>,
    /// Launch rule for a successful build.
    pub runner: RunnerSpec,
}

impl LanguageProfile {
    /// Whether this language has a separate compile step.
    pub fn needs_compile(&self) -> bool {
        self.compile.is_some()
    }

    /// The executable this language's build stage depends on.
    pub fn tool_name(&self) -> &str {
        self.probe.first().map(String::as_str).unwrap_or("")
    }
}

/// Interpreter command for Python on this platform.
pub(crate) fn python_command() -> &'static str {
    if cfg!(windows) {
        "python"
    } else {
        "python3"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_language_parsing() {
        assert_eq!("c".parse::<LanguageId>().unwrap(), LanguageId::C);
        assert_eq!("C".parse::<LanguageId>().unwrap(), LanguageId::C);
        assert_eq!("cpp".parse::<LanguageId>().unwrap(), LanguageId::Cpp);
        assert_eq!("C++".parse::<LanguageId>().unwrap(), LanguageId::Cpp);
        assert_eq!("cxx".parse::<LanguageId>().unwrap(), LanguageId::Cpp);
        assert_eq!("cc".parse::<LanguageId>().unwrap(), LanguageId::Cpp);
        assert_eq!("java".parse::<LanguageId>().unwrap(), LanguageId::Java);
        assert_eq!("Python".parse::<LanguageId>().unwrap(), LanguageId::Python);
        assert_eq!("py".parse::<LanguageId>().unwrap(), LanguageId::Python);
        assert_eq!("python3".parse::<LanguageId>().unwrap(), LanguageId::Python);
    }

    #[test]
    fn test_unknown_language_rejected() {
        let err = "cobol".parse::<LanguageId>().unwrap_err();
        assert!(err.to_string().contains("cobol"));
    }

    #[test]
    fn test_dir_names() {
        assert_eq!(LanguageId::C.dir_name(), "C");
        assert_eq!(LanguageId::Cpp.dir_name(), "C++");
        assert_eq!(LanguageId::Java.dir_name(), "Java");
        assert_eq!(LanguageId::Python.dir_name(), "Python");
    }

    #[test]
    fn test_template_render() {
        let template = CommandTemplate::new(vec![
            TemplateArg::Lit("gcc".to_string()),
            TemplateArg::Lit("-o".to_string()),
            TemplateArg::ArtifactPath,
            TemplateArg::SourcePath,
        ]);
        let source = PathBuf::from("/work/C/u1_abc.c");
        let artifact = PathBuf::from("/work/C/u1_abc");
        let argv = template.render(&source, &artifact);
        assert_eq!(argv, vec!["gcc", "-o", "/work/C/u1_abc", "/work/C/u1_abc.c"]);
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_string(&LanguageId::Cpp).unwrap();
        assert_eq!(json, "\"cpp\"");
        let back: LanguageId = serde_json::from_str("\"python\"").unwrap();
        assert_eq!(back, LanguageId::Python);
    }
}
