//! Expression → markup, gated on library availability.

use markdown_weaver_escape::escape_html;

use crate::availability::{Availability, AvailabilityState};
use crate::engine::TypesetOptions;
use crate::error::{MathError, Result};
use crate::grammar::Expression;

/// Text typeset in place of an empty expression.
pub const EMPTY_EXPRESSION: &str = "(empty)";

/// Why placeholder markup was produced instead of typeset output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderReason {
    /// The library is not loaded (yet, or ever).
    Unavailable(AvailabilityState),
    /// The engine faulted on this expression.
    EngineFault,
}

/// Renders expressions for one session.
///
/// Rendering is synchronous and depends only on the expression and the
/// current availability state.
#[derive(Debug, Clone)]
pub struct RenderPipeline {
    availability: Availability,
    options: TypesetOptions,
}

impl RenderPipeline {
    pub fn new(availability: Availability, options: TypesetOptions) -> Self {
        Self {
            availability,
            options,
        }
    }

    pub fn availability(&self) -> &Availability {
        &self.availability
    }

    pub fn options(&self) -> &TypesetOptions {
        &self.options
    }

    /// Render `expr`, degrading to placeholder markup on any failure.
    pub fn render(&self, expr: &Expression) -> String {
        match self.try_render(expr) {
            Ok(markup) => markup,
            Err(err) => {
                tracing::warn!(
                    target: "weaver::math::render",
                    error = %err,
                    expr = %expr.text,
                    "engine faulted, rendering placeholder"
                );
                placeholder(expr, PlaceholderReason::EngineFault)
            }
        }
    }

    /// Render `expr`, surfacing engine faults.
    ///
    /// An unavailable library is not an error here: it yields placeholder
    /// markup annotated with the availability state.
    pub fn try_render(&self, expr: &Expression) -> Result<String> {
        let Some(engine) = self.availability.engine() else {
            let state = self.availability.state();
            tracing::trace!(target: "weaver::math::render", %state, "library unavailable");
            return Ok(placeholder(expr, PlaceholderReason::Unavailable(state)));
        };

        let source = if expr.is_empty() {
            EMPTY_EXPRESSION
        } else {
            expr.text.as_str()
        };
        let options = self.options.for_mode(expr.display_mode);
        tracing::trace!(
            target: "weaver::math::render",
            source,
            display_mode = expr.display_mode,
            "typesetting"
        );
        engine
            .render_to_string(source, &options)
            .map_err(MathError::EngineInvocation)
    }
}

/// Fallback markup embedding the escaped source text.
pub fn placeholder(expr: &Expression, reason: PlaceholderReason) -> String {
    let mut content = String::new();
    // Writing to a String can't fail
    let _ = escape_html(&mut content, &expr.text);
    match reason {
        PlaceholderReason::Unavailable(state) => format!(
            r#"<span class="math-placeholder" data-no-typeset="{state}">{content}</span>"#
        ),
        PlaceholderReason::EngineFault => format!(
            r#"<span class="math-placeholder" data-typeset-fault="engine">{content}</span>"#
        ),
    }
}
