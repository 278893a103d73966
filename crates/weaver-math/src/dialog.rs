//! Math edit form: expression field, display-mode radio and live preview.

use std::cell::RefCell;
use std::rc::Rc;

use crate::document::HostElement;
use crate::error::{MathError, Result};
use crate::grammar::{self, DelimiterRule, Expression};
use crate::pipeline::RenderPipeline;
use crate::preview::{MarkupCell, MathSource, PreviewSync, PreviewTarget};
use crate::widget::MathWidget;

#[derive(Debug, Default)]
struct Fields {
    expr: String,
    display_mode: bool,
    /// Set once a widget is loaded into the form.
    editing: bool,
}

impl Fields {
    fn expression(&self) -> Expression {
        Expression::new(self.expr.trim(), self.display_mode)
    }
}

impl PreviewTarget for Fields {
    fn read(&self) -> Option<MathSource> {
        self.editing
            .then(|| MathSource::Structured(self.expression()))
    }
}

/// Edit form for one widget at a time.
pub struct MathDialog {
    fields: Rc<RefCell<Fields>>,
    rules: Rc<[DelimiterRule]>,
    preview: Rc<RefCell<PreviewSync>>,
    view: MarkupCell,
}

impl MathDialog {
    pub fn new(pipeline: Rc<RenderPipeline>, rules: Rc<[DelimiterRule]>) -> Self {
        let fields = Rc::new(RefCell::new(Fields::default()));
        let view = MarkupCell::new();
        let mut preview = PreviewSync::new(pipeline, rules.clone(), fields.clone());
        preview.add_sink(view.clone());
        Self {
            fields,
            rules,
            preview: preview.bind(),
            view,
        }
    }

    /// Load `widget` into the form and render its preview.
    pub fn setup(&mut self, widget: &MathWidget) {
        let expr = widget.expression();
        {
            let mut fields = self.fields.borrow_mut();
            fields.expr = expr.text;
            fields.display_mode = expr.display_mode;
            fields.editing = true;
        }
        let mut preview = self.preview.borrow_mut();
        // Populating the radio fires a mode change that is not a user edit.
        preview.notify_mode_changed();
        preview.compute_and_publish();
    }

    pub fn expr(&self) -> String {
        self.fields.borrow().expr.clone()
    }

    pub fn display_mode(&self) -> bool {
        self.fields.borrow().display_mode
    }

    /// The expression field was edited.
    pub fn set_expr(&mut self, text: impl Into<String>) {
        self.fields.borrow_mut().expr = text.into();
        self.preview.borrow_mut().notify_field_changed();
    }

    /// The display-mode radio was changed.
    pub fn set_display_mode(&mut self, display_mode: bool) {
        self.fields.borrow_mut().display_mode = display_mode;
        self.preview.borrow_mut().notify_mode_changed();
    }

    /// Set the display mode from the radio's string value.
    pub fn set_display_mode_value(&mut self, value: &str) {
        self.set_display_mode(value == "true");
    }

    /// Preview markup.
    pub fn preview_markup(&self) -> String {
        self.view.markup()
    }

    pub fn validate(&self) -> Result<()> {
        if self.fields.borrow().expr.trim().is_empty() {
            return Err(MathError::EmptyExpression);
        }
        Ok(())
    }

    /// Raw math for the current field values.
    pub fn get_math(&self) -> Result<String> {
        let expr = self.fields.borrow().expression();
        grammar::generate(&expr, &self.rules)
    }

    /// Validate and write the fields back into `widget`.
    pub fn commit(&self, widget: &mut MathWidget, wrapper: &mut impl HostElement) -> Result<()> {
        self.validate()?;
        let math = self.get_math()?;
        tracing::debug!(target: "weaver::math::dialog", widget = %widget.id(), %math, "commit");
        widget.set_math(math, wrapper);
        Ok(())
    }
}

impl std::fmt::Debug for MathDialog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MathDialog")
            .field("fields", &self.fields.borrow())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::availability::{Availability, ReadyLoader};
    use crate::document::{DISPLAY_MODE_ATTR, Element};
    use crate::engine::{EngineError, TypesetEngine, TypesetOptions};
    use crate::grammar::default_delimiters;

    struct Bracket;

    impl TypesetEngine for Bracket {
        fn render_to_string(&self, expr: &str, o: &TypesetOptions) -> Result<String, EngineError> {
            Ok(format!("[{expr}|{}]", o.display_mode))
        }
    }

    fn fixture(rules: Vec<DelimiterRule>) -> (MathDialog, MathWidget) {
        let availability = Availability::new();
        availability.request_load(&ReadyLoader(Rc::new(Bracket)));
        let pipeline = Rc::new(RenderPipeline::new(availability, TypesetOptions::default()));
        let rules: Rc<[DelimiterRule]> = rules.into();
        let widget = MathWidget::new("w1", r"\(x^2\)", pipeline.clone(), rules.clone());
        (MathDialog::new(pipeline, rules), widget)
    }

    #[test]
    fn preview_is_empty_before_setup() {
        let (dialog, _widget) = fixture(default_delimiters());
        assert_eq!(dialog.preview_markup(), "");
    }

    #[test]
    fn setup_fills_fields_and_preview() {
        let (mut dialog, widget) = fixture(default_delimiters());
        dialog.setup(&widget);
        assert_eq!(dialog.expr(), "x^2");
        assert!(!dialog.display_mode());
        assert_eq!(dialog.preview_markup(), "[x^2|false]");
    }

    #[test]
    fn edits_update_preview() {
        let (mut dialog, widget) = fixture(default_delimiters());
        dialog.setup(&widget);

        dialog.set_expr("a+b");
        assert_eq!(dialog.preview_markup(), "[a+b|false]");

        dialog.set_display_mode_value("true");
        assert_eq!(dialog.preview_markup(), "[a+b|true]");
    }

    #[test]
    fn commit_writes_generated_math() {
        let (mut dialog, mut widget) = fixture(default_delimiters());
        let mut wrapper = Element::new("span");
        dialog.setup(&widget);
        dialog.set_expr("  \\frac{1}{2} ");
        dialog.set_display_mode(true);

        dialog.commit(&mut widget, &mut wrapper).unwrap();
        assert_eq!(widget.math(), r"\[\frac{1}{2}\]");
        assert_eq!(wrapper.attribute(DISPLAY_MODE_ATTR), Some("true"));
        assert_eq!(widget.markup(), r"[\frac{1}{2}|true]");
    }

    #[test]
    fn commit_rejects_empty_expression() {
        let (mut dialog, mut widget) = fixture(default_delimiters());
        let mut wrapper = Element::new("span");
        dialog.setup(&widget);
        dialog.set_expr("   ");

        let err = dialog.commit(&mut widget, &mut wrapper).unwrap_err();
        assert!(matches!(err, MathError::EmptyExpression));
        assert_eq!(widget.math(), r"\(x^2\)");
    }

    #[test]
    fn commit_without_rule_for_mode_fails() {
        let (mut dialog, mut widget) = fixture(vec![DelimiterRule::new(r"\(", r"\)", false)]);
        let mut wrapper = Element::new("span");
        dialog.setup(&widget);
        dialog.set_display_mode(true);

        let err = dialog.commit(&mut widget, &mut wrapper).unwrap_err();
        assert!(matches!(err, MathError::GrammarMismatch { display_mode: true }));
        assert_eq!(widget.math(), r"\(x^2\)");
    }
}
