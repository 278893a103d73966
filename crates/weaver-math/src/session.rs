//! One math editing session.
//!
//! A session owns the configuration, the single [`Availability`] and the
//! [`RenderPipeline`] every widget and dialog shares. Dropping the session
//! and everything created from it releases all subscriptions.

use std::cell::Cell;
use std::rc::Rc;

use smol_str::format_smolstr;

use crate::availability::{Availability, AvailabilityState, EngineLoader};
use crate::config::MathConfig;
use crate::dialog::MathDialog;
use crate::document::{self, HostElement};
use crate::grammar::DelimiterRule;
use crate::pipeline::RenderPipeline;
use crate::widget::MathWidget;

pub struct MathSession {
    config: MathConfig,
    rules: Rc<[DelimiterRule]>,
    pipeline: Rc<RenderPipeline>,
    next_widget: Cell<usize>,
}

impl MathSession {
    pub fn new(config: MathConfig) -> Self {
        for mode in config.uncovered_modes() {
            tracing::warn!(
                target: "weaver::math::session",
                display_mode = mode,
                "no delimiter rule for display mode, math in this mode cannot be saved"
            );
        }

        let rules: Rc<[DelimiterRule]> = config.delimiters.clone().into();
        let pipeline = Rc::new(RenderPipeline::new(
            Availability::new(),
            config.options.clone(),
        ));
        Self {
            config,
            rules,
            pipeline,
            next_widget: Cell::new(0),
        }
    }

    pub fn config(&self) -> &MathConfig {
        &self.config
    }

    pub fn rules(&self) -> &[DelimiterRule] {
        &self.rules
    }

    pub fn pipeline(&self) -> &Rc<RenderPipeline> {
        &self.pipeline
    }

    pub fn availability(&self) -> &Availability {
        self.pipeline.availability()
    }

    pub fn state(&self) -> AvailabilityState {
        self.availability().state()
    }

    /// Start loading the typesetting library. Only the first call does anything.
    pub fn request_load(&self, loader: &dyn EngineLoader) {
        self.availability().request_load(loader);
    }

    /// New widget with the given raw math.
    pub fn widget(&self, raw: impl Into<String>) -> MathWidget {
        let index = self.next_widget.get();
        self.next_widget.set(index + 1);
        MathWidget::new(
            format_smolstr!("math-{}", index),
            raw,
            self.pipeline.clone(),
            self.rules.clone(),
        )
    }

    /// New widget holding the configured default math.
    pub fn insert_widget(&self) -> MathWidget {
        self.widget(self.config.default_math.clone())
    }

    /// Turn a persisted math element into a widget.
    ///
    /// Elements that are not math, or whose math is empty, yield `None` and
    /// stay plain content.
    pub fn upcast(&self, element: &mut impl HostElement) -> Option<MathWidget> {
        let math = document::upcast(element, &self.config.class, &self.rules)?;
        Some(self.widget(math.raw))
    }

    /// Write a widget back into its persisted element.
    pub fn downcast(&self, widget: &MathWidget, element: &mut impl HostElement) {
        widget.downcast(element);
    }

    pub fn dialog(&self) -> MathDialog {
        MathDialog::new(self.pipeline.clone(), self.rules.clone())
    }
}

impl std::fmt::Debug for MathSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MathSession")
            .field("class", &self.config.class)
            .field("state", &self.state())
            .field("widgets", &self.next_widget.get())
            .finish()
    }
}
