//! Turn recorded, annotated UI walkthroughs into guided-tour browser
//! extensions.
//!
//! - [`workflow`]: the workflow/step model the editor produces.
//! - [`annotation`]: screenshot overlays, the pointer-driven editor and the
//!   raster renderer.
//! - [`bundle`]: compiles a workflow into extension files and a zip archive.
//! - [`runtime`]: the guide state machine the shipped content script runs.

pub mod annotation;
pub mod bundle;
pub mod error;
pub mod geometry;
pub mod runtime;
pub mod workflow;

pub use annotation::{Annotation, Shape};
pub use bundle::{compile, AiFeatures, CompileOptions, GeneratedBundle, Variant};
pub use error::{Result, TourError};
pub use runtime::machine::{GuideHost, GuideMachine, Phase};
pub use runtime::TourConfig;
pub use workflow::{Step, Workflow};
