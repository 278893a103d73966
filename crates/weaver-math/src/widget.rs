//! Inline math instances.
//!
//! A widget owns the verbatim raw math of one instance. Its rendered markup
//! lives in a [`MarkupCell`] kept current by the widget's own
//! [`PreviewSync`], so it re-renders by itself once the library loads.

use std::cell::RefCell;
use std::rc::Rc;

use smol_str::SmolStr;

use crate::document::{self, DecodedMath, HostElement};
use crate::grammar::{self, DelimiterRule, Expression};
use crate::pipeline::RenderPipeline;
use crate::preview::{MarkupCell, MathSource, PreviewSync, PreviewTarget, RenderedNode};

/// Raw math of a widget, shared with its preview.
#[derive(Debug, Clone, Default)]
struct RawMath(Rc<RefCell<String>>);

impl PreviewTarget for RawMath {
    fn read(&self) -> Option<MathSource> {
        Some(MathSource::Raw(self.0.borrow().clone()))
    }
}

/// One math instance in a document.
pub struct MathWidget {
    id: SmolStr,
    raw: RawMath,
    rules: Rc<[DelimiterRule]>,
    preview: Rc<RefCell<PreviewSync>>,
    view: MarkupCell,
}

impl MathWidget {
    pub fn new(
        id: impl Into<SmolStr>,
        raw: impl Into<String>,
        pipeline: Rc<RenderPipeline>,
        rules: Rc<[DelimiterRule]>,
    ) -> Self {
        let raw = RawMath(Rc::new(RefCell::new(raw.into())));
        let view = MarkupCell::new();
        let mut preview = PreviewSync::new(pipeline, rules.clone(), raw.clone());
        preview.add_sink(view.clone());
        preview.compute_and_publish();

        Self {
            id: id.into(),
            raw,
            rules,
            preview: preview.bind(),
            view,
        }
    }

    pub fn id(&self) -> &SmolStr {
        &self.id
    }

    /// Verbatim raw math, delimiters included.
    pub fn math(&self) -> String {
        self.raw.0.borrow().clone()
    }

    pub fn expression(&self) -> Expression {
        grammar::parse(&self.raw.0.borrow(), &self.rules)
    }

    pub fn decoded(&self) -> DecodedMath {
        DecodedMath::from_raw(self.math(), &self.rules)
    }

    /// Replace the raw math, update the wrapper's attributes and re-render.
    pub fn set_math(&mut self, raw: impl Into<String>, wrapper: &mut impl HostElement) {
        *self.raw.0.borrow_mut() = raw.into();
        self.sync_attributes(wrapper);
        self.refresh();
    }

    /// Write the persisted attributes onto `wrapper`.
    pub fn sync_attributes(&self, wrapper: &mut impl HostElement) {
        document::sync_attributes(&self.decoded(), wrapper);
    }

    /// Re-render if anything changed. Returns the current generation.
    pub fn refresh(&self) -> u64 {
        self.preview.borrow_mut().compute_and_publish()
    }

    /// Current markup of this widget.
    pub fn markup(&self) -> String {
        self.view.markup()
    }

    pub fn rendered(&self) -> Option<RenderedNode> {
        self.view.node()
    }

    /// Write the raw math back into its persisted fragment.
    pub fn downcast(&self, fragment: &mut impl HostElement) {
        document::encode(&self.decoded(), fragment);
    }
}

impl std::fmt::Debug for MathWidget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MathWidget")
            .field("id", &self.id)
            .field("math", &self.raw.0.borrow())
            .field("generation", &self.view.generation())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::availability::{Availability, ReadyLoader, UnavailableLoader};
    use crate::document::{DISPLAY_MODE_ATTR, Element, MATH_ATTR};
    use crate::engine::{EngineError, TypesetEngine, TypesetOptions};
    use crate::grammar::default_delimiters;

    struct Bracket;

    impl TypesetEngine for Bracket {
        fn render_to_string(&self, expr: &str, o: &TypesetOptions) -> Result<String, EngineError> {
            Ok(format!("[{expr}|{}]", o.display_mode))
        }
    }

    fn widget(availability: &Availability, raw: &str) -> MathWidget {
        let pipeline = Rc::new(RenderPipeline::new(
            availability.clone(),
            TypesetOptions::default(),
        ));
        MathWidget::new("w1", raw, pipeline, default_delimiters().into())
    }

    #[test]
    fn renders_on_creation() {
        let availability = Availability::new();
        let widget = widget(&availability, r"\(x\)");
        assert_eq!(widget.rendered().map(|n| n.generation), Some(1));
        assert!(widget.markup().contains(r#"data-no-typeset="NotRequested""#));
    }

    #[test]
    fn set_math_syncs_attributes_and_renders() {
        let availability = Availability::new();
        availability.request_load(&ReadyLoader(Rc::new(Bracket)));
        let mut widget = widget(&availability, r"\(x\)");
        let mut wrapper = Element::new("span");

        widget.set_math("$$ y $$", &mut wrapper);
        assert_eq!(widget.math(), "$$ y $$");
        assert_eq!(widget.expression(), Expression::display("y"));
        assert_eq!(wrapper.attribute(MATH_ATTR), Some("$$ y $$"));
        assert_eq!(wrapper.attribute(DISPLAY_MODE_ATTR), Some("true"));
        assert_eq!(widget.markup(), "[y|true]");
    }

    #[test]
    fn empty_math_typesets_marker() {
        let availability = Availability::new();
        availability.request_load(&ReadyLoader(Rc::new(Bracket)));
        let widget = widget(&availability, "");
        assert_eq!(widget.markup(), "[(empty)|false]");
    }

    #[test]
    fn rerenders_on_availability_change() {
        let availability = Availability::new();
        let widget = widget(&availability, "$x$");
        availability.request_load(&UnavailableLoader);
        assert!(widget.markup().contains(r#"data-no-typeset="Failed""#));
        // Loading, then Failed.
        assert_eq!(widget.rendered().map(|n| n.generation), Some(3));
    }

    #[test]
    fn refresh_without_change_is_noop() {
        let availability = Availability::new();
        let widget = widget(&availability, "$x$");
        assert_eq!(widget.refresh(), 1);
        assert_eq!(widget.refresh(), 1);
    }

    #[test]
    fn downcast_writes_raw_math() {
        let availability = Availability::new();
        let widget = widget(&availability, "$a<b$");
        let mut span = Element::new("span")
            .with_attribute("class", "math-tex")
            .with_text("stale");
        widget.downcast(&mut span);
        assert_eq!(span.to_html(), r#"<span class="math-tex">$a&lt;b$</span>"#);
    }
}
