//! Live preview synchronization.
//!
//! A [`PreviewSync`] reads one target, renders it through the session's
//! [`RenderPipeline`] and pushes the result to any number of sinks. Every
//! render is stamped with a generation; a sink only ever moves to a newer
//! generation, so a stale render published late is dropped.
//!
//! Re-rendering is driven from outside: field edits, display-mode edits and
//! availability transitions (see [`PreviewSync::bind`]).

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use crate::availability::{AvailabilityState, Subscription};
use crate::grammar::{self, DelimiterRule, Expression};
use crate::pipeline::RenderPipeline;

/// What a preview target currently holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MathSource {
    /// Already split into text and mode (editing fields).
    Structured(Expression),
    /// Raw authored math including delimiters (persisted form).
    Raw(String),
}

impl MathSource {
    fn into_expression(self, rules: &[DelimiterRule]) -> Expression {
        match self {
            MathSource::Structured(expr) => expr,
            MathSource::Raw(raw) => grammar::parse(&raw, rules),
        }
    }
}

/// Source of the previewed math.
pub trait PreviewTarget {
    /// Current value, `None` when there is nothing to preview.
    fn read(&self) -> Option<MathSource>;
}

impl<T: PreviewTarget + ?Sized> PreviewTarget for Rc<RefCell<T>> {
    fn read(&self) -> Option<MathSource> {
        self.borrow().read()
    }
}

/// Markup produced for one generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedNode {
    /// Expression that was rendered, `None` for a cleared preview.
    pub source: Option<Expression>,
    pub markup: String,
    pub generation: u64,
}

/// Somewhere rendered markup is displayed.
pub trait PreviewSink {
    fn apply(&mut self, node: &RenderedNode);
}

/// Shared cell holding the most recently applied node.
///
/// Clones share the cell, so one clone can be bound as a sink while another
/// is read by the host.
#[derive(Debug, Clone, Default)]
pub struct MarkupCell(Rc<RefCell<Option<RenderedNode>>>);

impl MarkupCell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node(&self) -> Option<RenderedNode> {
        self.0.borrow().clone()
    }

    /// Current markup, empty if nothing was applied yet.
    pub fn markup(&self) -> String {
        self.0
            .borrow()
            .as_ref()
            .map(|node| node.markup.clone())
            .unwrap_or_default()
    }

    /// Generation of the current markup, 0 if nothing was applied yet.
    pub fn generation(&self) -> u64 {
        self.0.borrow().as_ref().map_or(0, |node| node.generation)
    }
}

impl PreviewSink for MarkupCell {
    fn apply(&mut self, node: &RenderedNode) {
        *self.0.borrow_mut() = Some(node.clone());
    }
}

struct BoundSink {
    sink: Box<dyn PreviewSink>,
    applied: u64,
}

/// Inputs a render depends on.
#[derive(Debug, Clone, PartialEq, Eq)]
struct RenderKey {
    source: Option<Expression>,
    state: AvailabilityState,
}

/// Keeps a set of sinks showing the rendered value of one target.
pub struct PreviewSync {
    pipeline: Rc<RenderPipeline>,
    rules: Rc<[DelimiterRule]>,
    target: Box<dyn PreviewTarget>,
    sinks: Vec<BoundSink>,
    last: Option<(RenderKey, RenderedNode)>,
    generation: u64,
    mode_primed: bool,
    subscription: Option<Subscription>,
}

impl PreviewSync {
    pub fn new(
        pipeline: Rc<RenderPipeline>,
        rules: Rc<[DelimiterRule]>,
        target: impl PreviewTarget + 'static,
    ) -> Self {
        Self {
            pipeline,
            rules,
            target: Box::new(target),
            sinks: Vec::new(),
            last: None,
            generation: 0,
            mode_primed: false,
            subscription: None,
        }
    }

    /// Wrap in a shared handle and re-render on every availability transition.
    ///
    /// The subscription holds only a weak reference and ends when the
    /// returned handle is dropped. If the library already reached a terminal
    /// state, the preview renders immediately.
    pub fn bind(self) -> Rc<RefCell<Self>> {
        let availability = self.pipeline.availability().clone();
        let this = Rc::new(RefCell::new(self));
        let weak: Weak<RefCell<Self>> = Rc::downgrade(&this);
        let subscription = availability.subscribe(move |state| {
            let Some(this) = weak.upgrade() else {
                return;
            };
            match this.try_borrow_mut() {
                Ok(mut sync) => {
                    sync.compute_and_publish();
                }
                Err(_) => tracing::warn!(
                    target: "weaver::math::preview",
                    %state,
                    "preview busy during availability change, skipping refresh"
                ),
            };
        });
        this.borrow_mut().subscription = Some(subscription);
        this
    }

    /// Add a sink. It receives the next publish.
    pub fn add_sink(&mut self, sink: impl PreviewSink + 'static) {
        self.sinks.push(BoundSink {
            sink: Box::new(sink),
            applied: 0,
        });
    }

    /// Latest generation computed so far (0 before the first render).
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// The most recently computed node.
    pub fn last_node(&self) -> Option<&RenderedNode> {
        self.last.as_ref().map(|(_, node)| node)
    }

    /// Render the target without publishing.
    ///
    /// When neither the target nor the availability state changed since the
    /// previous call, the previous node is returned with its generation.
    pub fn stage(&mut self) -> RenderedNode {
        let source = self
            .target
            .read()
            .map(|source| source.into_expression(&self.rules));
        let key = RenderKey {
            source,
            state: self.pipeline.availability().state(),
        };

        if let Some((last_key, node)) = &self.last
            && *last_key == key
        {
            return node.clone();
        }

        self.generation += 1;
        let markup = match &key.source {
            Some(expr) => self.pipeline.render(expr),
            None => String::new(),
        };
        let node = RenderedNode {
            source: key.source.clone(),
            markup,
            generation: self.generation,
        };
        tracing::trace!(
            target: "weaver::math::preview",
            generation = node.generation,
            state = %key.state,
            "staged preview"
        );
        self.last = Some((key, node.clone()));
        node
    }

    /// Apply `node` to every sink still behind it. Returns how many sinks changed.
    pub fn publish(&mut self, node: &RenderedNode) -> usize {
        let mut applied = 0;
        for bound in &mut self.sinks {
            if bound.applied < node.generation {
                bound.sink.apply(node);
                bound.applied = node.generation;
                applied += 1;
            }
        }
        if applied > 0 {
            tracing::debug!(
                target: "weaver::math::preview",
                generation = node.generation,
                sinks = applied,
                "published preview"
            );
        } else {
            tracing::trace!(
                target: "weaver::math::preview",
                generation = node.generation,
                "publish skipped, sinks up to date"
            );
        }
        applied
    }

    /// Render the target and publish the result. Returns its generation.
    pub fn compute_and_publish(&mut self) -> u64 {
        let node = self.stage();
        self.publish(&node);
        node.generation
    }

    /// The previewed text changed.
    pub fn notify_field_changed(&mut self) -> u64 {
        self.compute_and_publish()
    }

    /// The display mode changed.
    ///
    /// The first notification only reflects the field being populated with
    /// its default and is ignored.
    pub fn notify_mode_changed(&mut self) -> Option<u64> {
        if !self.mode_primed {
            self.mode_primed = true;
            return None;
        }
        Some(self.compute_and_publish())
    }

    /// Whether this preview follows availability transitions.
    pub fn is_bound(&self) -> bool {
        self.subscription.as_ref().is_some_and(Subscription::is_active)
    }
}

impl std::fmt::Debug for PreviewSync {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreviewSync")
            .field("generation", &self.generation)
            .field("sinks", &self.sinks.len())
            .field("mode_primed", &self.mode_primed)
            .finish_non_exhaustive()
    }
}
