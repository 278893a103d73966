use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use crate::engine::TypesetOptions;
use crate::error::{MathError, Result};
use crate::grammar::{DelimiterRule, default_delimiters, rule_for_mode};

/// Raw math of a freshly inserted widget.
pub const DEFAULT_MATH: &str = r"\(x = {-b \pm \sqrt{b^2-4ac} \over 2a}\)";

/// Configuration for math in one editor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MathConfig {
    /// Class marking an element as math.
    pub class: SmolStr,
    /// Recognized delimiters, highest priority first.
    pub delimiters: Vec<DelimiterRule>,
    /// Options passed to the typesetting engine.
    pub options: TypesetOptions,
    /// Stylesheet of the typesetting library.
    pub lib_css: Option<String>,
    /// Script of the typesetting library.
    pub lib_js: Option<String>,
    /// Raw math of a new widget.
    pub default_math: String,
}

impl Default for MathConfig {
    fn default() -> Self {
        Self {
            class: SmolStr::new_static("math-tex"),
            delimiters: default_delimiters(),
            options: TypesetOptions::default(),
            lib_css: None,
            lib_js: None,
            default_math: DEFAULT_MATH.to_string(),
        }
    }
}

impl MathConfig {
    /// Parse from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Location of the library stylesheet.
    pub fn lib_css(&self) -> Result<&str> {
        self.lib_css
            .as_deref()
            .filter(|path| !path.is_empty())
            .ok_or(MathError::MissingConfig("lib_css"))
    }

    /// Location of the library script.
    pub fn lib_js(&self) -> Result<&str> {
        self.lib_js
            .as_deref()
            .filter(|path| !path.is_empty())
            .ok_or(MathError::MissingConfig("lib_js"))
    }

    /// Display modes that no delimiter rule can generate.
    pub fn uncovered_modes(&self) -> Vec<bool> {
        [false, true]
            .into_iter()
            .filter(|mode| rule_for_mode(&self.delimiters, *mode).is_none())
            .collect()
    }
}
