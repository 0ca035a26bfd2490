use serde::{Deserialize, Serialize};

use crate::geometry::{Point, Rect};
use crate::workflow::Position;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

/// Viewport-relative bounding rect to document coordinates.
pub fn to_document(rect: Rect, scroll: Point) -> Rect {
    rect.translate(scroll.x, scroll.y)
}

/// Top-left corner of the tooltip in document coordinates.
///
/// The result is clamped to at least `padding` on both axes so the tooltip
/// never starts off the top or left edge. Bottom and right are not clamped.
pub fn tooltip_position(
    target: Rect,
    scroll: Point,
    tooltip: Size,
    position: Position,
    padding: f64,
) -> Point {
    let target = to_document(target, scroll);
    let centered_left = target.x + (target.width - tooltip.width) / 2.0;
    let centered_top = target.y + (target.height - tooltip.height) / 2.0;

    let (top, left) = match position {
        Position::Top => (target.y - tooltip.height - padding, centered_left),
        Position::Bottom => (target.bottom() + padding, centered_left),
        Position::Left => (centered_top, target.x - tooltip.width - padding),
        Position::Right => (centered_top, target.right() + padding),
    };

    Point::new(left.max(padding), top.max(padding))
}
