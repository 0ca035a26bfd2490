//! Markup shapes drawn over a captured screenshot.
//!
//! Coordinates are in the intrinsic pixel space of the screenshot, not the
//! scaled canvas it is displayed on.

use serde::{Deserialize, Serialize};

use crate::error::{Result, TourError};
use crate::geometry::{Point, Rect};

pub mod editor;
pub mod render;

/// Id carried by the in-progress annotation while a drag is under way.
pub const CANDIDATE_ID: &str = "temp";

pub const PALETTE: [&str; 5] = ["#ef4444", "#f59e0b", "#10b981", "#3b82f6", "#8b5cf6"];

pub const DEFAULT_COLOR: &str = PALETTE[0];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub id: String,
    #[serde(flatten)]
    pub shape: Shape,
    pub x: f64,
    pub y: f64,
    pub color: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Shape {
    Arrow {
        #[serde(rename = "endX")]
        end_x: f64,
        #[serde(rename = "endY")]
        end_y: f64,
    },
    Box {
        #[serde(default)]
        width: f64,
        #[serde(default)]
        height: f64,
    },
    Text {
        #[serde(default)]
        text: String,
    },
    Highlight {
        #[serde(default)]
        width: f64,
        #[serde(default)]
        height: f64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnnotationKind {
    Arrow,
    Box,
    Text,
    Highlight,
}

/// Editor tools. Exactly one is active at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tool {
    #[default]
    Select,
    Arrow,
    Box,
    Text,
    Highlight,
}

impl Annotation {
    pub fn boxed(id: &str, rect: Rect, color: &str) -> Self {
        Self::rect_shape(id, rect, color, false)
    }

    pub fn highlight(id: &str, rect: Rect, color: &str) -> Self {
        Self::rect_shape(id, rect, color, true)
    }

    fn rect_shape(id: &str, rect: Rect, color: &str, highlight: bool) -> Self {
        let rect = rect.normalized();
        let shape = if highlight {
            Shape::Highlight {
                width: rect.width,
                height: rect.height,
            }
        } else {
            Shape::Box {
                width: rect.width,
                height: rect.height,
            }
        };
        Self {
            id: id.to_string(),
            shape,
            x: rect.x,
            y: rect.y,
            color: color.to_string(),
        }
    }

    pub fn arrow(id: &str, from: Point, to: Point, color: &str) -> Self {
        Self {
            id: id.to_string(),
            shape: Shape::Arrow {
                end_x: to.x,
                end_y: to.y,
            },
            x: from.x,
            y: from.y,
            color: color.to_string(),
        }
    }

    pub fn text(id: &str, at: Point, text: &str, color: &str) -> Self {
        Self {
            id: id.to_string(),
            shape: Shape::Text {
                text: text.to_string(),
            },
            x: at.x,
            y: at.y,
            color: color.to_string(),
        }
    }

    pub fn kind(&self) -> AnnotationKind {
        match self.shape {
            Shape::Arrow { .. } => AnnotationKind::Arrow,
            Shape::Box { .. } => AnnotationKind::Box,
            Shape::Text { .. } => AnnotationKind::Text,
            Shape::Highlight { .. } => AnnotationKind::Highlight,
        }
    }

    pub fn origin(&self) -> Point {
        Point::new(self.x, self.y)
    }

    pub fn is_candidate(&self) -> bool {
        self.id == CANDIDATE_ID
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Normalized rectangle for box and highlight shapes.
    pub fn rect(&self) -> Option<Rect> {
        match self.shape {
            Shape::Box { width, height } | Shape::Highlight { width, height } => {
                Some(Rect::new(self.x, self.y, width, height).normalized())
            }
            _ => None,
        }
    }

    /// Area covered on the image, used for hit testing.
    pub fn bounds(&self) -> Rect {
        match &self.shape {
            Shape::Box { .. } | Shape::Highlight { .. } => {
                self.rect().unwrap_or_default()
            }
            Shape::Arrow { end_x, end_y } => {
                Rect::from_corners(self.origin(), Point::new(*end_x, *end_y))
            }
            Shape::Text { text } => {
                let (w, h) = render::text_extent(text);
                // text is anchored on its baseline
                Rect::new(self.x, self.y - h, w, h)
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        let fail = |reason: &str| {
            Err(TourError::InvalidAnnotation {
                id: self.id.clone(),
                reason: reason.to_string(),
            })
        };
        if !self.x.is_finite() || !self.y.is_finite() {
            return fail("origin must be finite");
        }
        match &self.shape {
            Shape::Arrow { end_x, end_y } => {
                if !end_x.is_finite() || !end_y.is_finite() {
                    return fail("arrow requires an end point");
                }
            }
            Shape::Box { width, height } | Shape::Highlight { width, height } => {
                if !(*width >= 0.0 && *height >= 0.0) {
                    return fail("width and height must be non-negative");
                }
            }
            Shape::Text { text } => {
                if text.trim().is_empty() {
                    return fail("text must not be empty");
                }
            }
        }
        Ok(())
    }
}
