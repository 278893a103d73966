//! weaver-math: math expressions embedded in rich-text documents.
//!
//! This crate provides:
//! - a delimiter grammar converting raw authored math (`\(x^2\)`, `$$y$$`) to
//!   an [`Expression`] and back
//! - [`Availability`], the per-session load state of the typesetting engine
//! - [`RenderPipeline`], turning expressions into typeset or placeholder markup
//! - [`PreviewSync`], generation-stamped live previews
//! - a codec for math fragments persisted in the host document
//! - widget, edit dialog and session glue built on the above

pub mod availability;
pub mod config;
pub mod dialog;
pub mod document;
pub mod engine;
pub mod error;
pub mod grammar;
pub mod pipeline;
pub mod preview;
pub mod session;
pub mod widget;

pub use availability::{
    Availability, AvailabilityState, EngineHandle, EngineLoader, LoadCompletion, LoadError,
    ReadyLoader, Subscription, UnavailableLoader,
};
pub use config::MathConfig;
pub use dialog::MathDialog;
pub use document::{DecodedMath, Element, HostElement, Node};
#[cfg(feature = "mathml-engine")]
pub use engine::MathMlEngine;
pub use engine::{EngineError, TypesetEngine, TypesetOptions};
pub use error::{MathError, RejectReason, Result};
pub use grammar::{DelimiterRule, Expression, default_delimiters, generate, parse};
pub use pipeline::RenderPipeline;
pub use preview::{MarkupCell, MathSource, PreviewSink, PreviewSync, PreviewTarget, RenderedNode};
pub use session::MathSession;
pub use smol_str::SmolStr;
pub use widget::MathWidget;
