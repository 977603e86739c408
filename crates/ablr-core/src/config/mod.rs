//! Configuration for ablr
//!
//! Settings that change how source is read (escape handling, include
//! search path, preprocessor builtins) or where results go (rollback
//! directory, output directory). Every field has a default, so an empty
//! config file, or none at all, is valid.
//!
//! ## Configuration Files
//!
//! Discovered by walking up from the working directory, first match wins:
//! - `.ablrc.json` - JSON with comments and trailing commas
//! - `.ablrc.toml`
//! - `ablr.yaml` / `ablr.yml`
//! - `ablr.json`
//!
//! ## Example Configuration
//!
//! ```jsonc
//! {
//!   "opsys": "unix",
//!   "propath": [".", "src", "/opt/dlc/src"],
//!   "rollbackDir": ".ablr/rollback",
//!   "defines": { "DEBUG": "yes" },
//! }
//! ```

mod loader;

pub use loader::ConfigLoader;

use crate::error::RefactorError;
use crate::result::Result;
use indexmap::IndexMap;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Operating system the source is compiled on
///
/// On Unix a backslash escapes the following character, like `~` does on
/// every platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Opsys {
    Unix,
    Windows,
}

impl Opsys {
    pub fn host() -> Self {
        if cfg!(windows) {
            Opsys::Windows
        } else {
            Opsys::Unix
        }
    }

    /// Whether `\` is an escape character
    pub fn is_unix(self) -> bool {
        self == Opsys::Unix
    }

    /// Value of the `OPSYS` preprocessor builtin
    pub fn builtin_name(self) -> &'static str {
        match self {
            Opsys::Unix => "UNIX",
            Opsys::Windows => "WIN32",
        }
    }
}

impl Default for Opsys {
    fn default() -> Self {
        Self::host()
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct RefactorConfig {
    #[schemars(description = "Operating system the sources are compiled on (unix or windows)")]
    pub opsys: Opsys,

    #[schemars(description = "Ordered list of directories searched for include files")]
    pub propath: Vec<PathBuf>,

    #[schemars(description = "Directory that holds preserved copies of modified files")]
    pub rollback_dir: PathBuf,

    #[schemars(description = "Indent string used when indenting a range of lines")]
    pub indent: String,

    #[schemars(description = "Value of the PROVERSION preprocessor builtin")]
    pub proversion: String,

    #[schemars(description = "Maximum nesting of include files and macro expansions")]
    pub max_include_depth: usize,

    #[schemars(description = "Global preprocessor names defined before the main file is read")]
    pub defines: IndexMap<String, String>,

    /// Write refactored files here instead of in place
    #[schemars(description = "Directory for batch output instead of in-place writes")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<PathBuf>,
}

impl Default for RefactorConfig {
    fn default() -> Self {
        Self {
            opsys: Opsys::host(),
            propath: vec![PathBuf::from(".")],
            rollback_dir: PathBuf::from(".ablr/rollback"),
            indent: String::from("  "),
            proversion: String::from("12.8"),
            max_include_depth: 32,
            defines: IndexMap::new(),
            output_dir: None,
        }
    }
}

impl RefactorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_include_depth == 0 {
            return Err(RefactorError::config_error(
                "maxIncludeDepth must be at least 1",
            ));
        }
        if self.indent.is_empty() {
            return Err(RefactorError::config_error("indent must not be empty"));
        }
        Ok(())
    }

    /// JSON schema for config files
    pub fn json_schema() -> serde_json::Value {
        let schema = schemars::schema_for!(RefactorConfig);
        serde_json::to_value(&schema).unwrap_or_default()
    }

    /// Pretty JSON of the effective settings
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| RefactorError::config_error(format!("Failed to serialize config: {e}")))
    }
}
