//! Typesetting engine capability.
//!
//! The render pipeline only ever talks to a [`TypesetEngine`]. Engines are
//! expected to render TeX syntax errors as inline error markup; returning
//! `Err` means the engine itself faulted.

use markdown_weaver_escape::escape_html;
use serde::{Deserialize, Serialize};

/// Options passed to the engine for every render.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct TypesetOptions {
    /// Block (`true`) or inline (`false`) layout. Set per render from the expression.
    #[serde(skip)]
    pub display_mode: bool,
    /// Return an error for invalid TeX instead of rendering error markup.
    pub throw_on_error: bool,
}

impl TypesetOptions {
    /// These options with the display mode of one particular render.
    pub fn for_mode(&self, display_mode: bool) -> Self {
        Self {
            display_mode,
            ..self.clone()
        }
    }
}

/// Engine fault (as opposed to a TeX error the engine rendered).
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("typesetting engine failed: {message}")]
pub struct EngineError {
    pub message: String,
}

impl EngineError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Renders TeX to markup.
pub trait TypesetEngine {
    /// Render `expr` (no delimiters) to markup.
    fn render_to_string(
        &self,
        expr: &str,
        options: &TypesetOptions,
    ) -> Result<String, EngineError>;
}

impl<T: TypesetEngine + ?Sized> TypesetEngine for &T {
    fn render_to_string(
        &self,
        expr: &str,
        options: &TypesetOptions,
    ) -> Result<String, EngineError> {
        (**self).render_to_string(expr, options)
    }
}

/// Inline markup for TeX the engine could not typeset.
///
/// The error message goes in the `title` so hosts can show it on top of the
/// offending source.
pub fn error_markup(latex: &str, error: &str, display_mode: bool) -> String {
    let mode_class = if display_mode {
        "math-display"
    } else {
        "math-inline"
    };
    let mut escaped_latex = String::new();
    let mut escaped_error = String::new();
    // These won't fail writing to String
    let _ = escape_html(&mut escaped_latex, latex);
    let _ = escape_html(&mut escaped_error, error);
    format!(
        r#"<span class="math math-error {mode_class}" title="{escaped_error}"><code>{escaped_latex}</code></span>"#
    )
}

#[cfg(feature = "mathml-engine")]
pub use mathml::MathMlEngine;

#[cfg(feature = "mathml-engine")]
mod mathml {
    use pulldown_latex::{
        Parser, Storage, config::DisplayMode, config::RenderConfig, mathml::push_mathml,
    };

    use super::{EngineError, TypesetEngine, TypesetOptions, error_markup};

    /// LaTeX → MathML engine backed by pulldown-latex.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct MathMlEngine;

    impl TypesetEngine for MathMlEngine {
        fn render_to_string(
            &self,
            latex: &str,
            options: &TypesetOptions,
        ) -> Result<String, EngineError> {
            let storage = Storage::new();
            let parser = Parser::new(latex, &storage);
            let config = RenderConfig {
                display_mode: if options.display_mode {
                    DisplayMode::Block
                } else {
                    DisplayMode::Inline
                },
                ..Default::default()
            };

            // Collect events, tracking any errors
            let events: Vec<_> = parser.collect();
            let errors: Vec<String> = events
                .iter()
                .filter_map(|e| e.as_ref().err().map(|err| err.to_string()))
                .collect();

            if !errors.is_empty() {
                let message = errors.join("; ");
                if options.throw_on_error {
                    return Err(EngineError::new(message));
                }
                return Ok(error_markup(latex, &message, options.display_mode));
            }

            let mut mathml = String::new();
            push_mathml(&mut mathml, events.into_iter(), config)
                .map_err(|e| EngineError::new(e.to_string()))?;
            Ok(mathml)
        }
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_markup_escapes_source_and_message() {
        let html = error_markup("a<b", "bad \"thing\"", true);
        insta::assert_snapshot!(html, @r#"<span class="math math-error math-display" title="bad &quot;thing&quot;"><code>a&lt;b</code></span>"#);
    }

    #[test]
    fn options_keep_configuration_per_mode() {
        let base = TypesetOptions {
            display_mode: false,
            throw_on_error: true,
        };
        let display = base.for_mode(true);
        assert!(display.display_mode);
        assert!(display.throw_on_error);
    }
}
