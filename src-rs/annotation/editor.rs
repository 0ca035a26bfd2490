//! Pointer-driven editing of a step's annotation list.
//!
//! The editor never owns the committed list. Every change is handed back as a
//! fresh `Vec<Annotation>`, the same way a controlled canvas reports through
//! `onAnnotationsChange`. The only state it keeps is the active tool and color,
//! the selection, and the candidate annotation of an ongoing drag.

use chrono::Utc;

use super::{Annotation, Tool, CANDIDATE_ID, DEFAULT_COLOR, PALETTE};
use crate::error::{Result, TourError};
use crate::geometry::{Point, Rect};

#[derive(Debug, Clone, PartialEq)]
pub enum PointerDown {
    Ignored,
    Drawing,
    Selected(Option<String>),
    /// The text tool needs a string from the user before anything is added.
    PromptText(Point),
}

#[derive(Debug)]
pub struct AnnotationEditor {
    tool: Tool,
    color: String,
    display_scale: f64,
    drag_start: Option<Point>,
    candidate: Option<Annotation>,
    selected: Option<String>,
    seq: u64,
}

impl Default for AnnotationEditor {
    fn default() -> Self {
        Self::new()
    }
}

impl AnnotationEditor {
    pub fn new() -> Self {
        Self {
            tool: Tool::Select,
            color: DEFAULT_COLOR.to_string(),
            display_scale: 1.0,
            drag_start: None,
            candidate: None,
            selected: None,
            seq: 0,
        }
    }

    pub fn tool(&self) -> Tool {
        self.tool
    }

    pub fn color(&self) -> &str {
        &self.color
    }

    pub fn candidate(&self) -> Option<&Annotation> {
        self.candidate.as_ref()
    }

    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    pub fn set_tool(&mut self, tool: Tool) {
        self.tool = tool;
        self.drag_start = None;
        self.candidate = None;
    }

    pub fn set_color(&mut self, color: &str) -> Result<()> {
        let Some(found) = PALETTE.iter().find(|c| c.eq_ignore_ascii_case(color)) else {
            return Err(TourError::InvalidAnnotation {
                id: CANDIDATE_ID.to_string(),
                reason: format!("color {color} is not in the palette"),
            });
        };
        self.color = (*found).to_string();
        Ok(())
    }

    /// Record how the canvas is scaled on screen so pointer positions map
    /// back to intrinsic image pixels.
    pub fn set_display_size(&mut self, displayed_width: f64, intrinsic_width: f64) {
        self.display_scale = if displayed_width > 0.0 && intrinsic_width > 0.0 {
            intrinsic_width / displayed_width
        } else {
            1.0
        };
    }

    fn to_image_space(&self, p: Point) -> Point {
        Point::new(p.x * self.display_scale, p.y * self.display_scale)
    }

    pub fn pointer_down(&mut self, annotations: &[Annotation], at: Point) -> PointerDown {
        let at = self.to_image_space(at);
        match self.tool {
            Tool::Select => {
                self.selected = hit_test(annotations, at).map(|a| a.id.clone());
                PointerDown::Selected(self.selected.clone())
            }
            Tool::Text => PointerDown::PromptText(at),
            Tool::Arrow | Tool::Box | Tool::Highlight => {
                self.drag_start = Some(at);
                self.candidate = None;
                PointerDown::Drawing
            }
        }
    }

    /// Rebuild the candidate from the drag start to `at`. Returns it so the
    /// caller can repaint with it on top of the committed list.
    pub fn pointer_move(&mut self, at: Point) -> Option<&Annotation> {
        let start = self.drag_start?;
        let at = self.to_image_space(at);
        let candidate = match self.tool {
            Tool::Box => Annotation::boxed(CANDIDATE_ID, Rect::from_corners(start, at), &self.color),
            Tool::Highlight => {
                Annotation::highlight(CANDIDATE_ID, Rect::from_corners(start, at), &self.color)
            }
            Tool::Arrow => Annotation::arrow(CANDIDATE_ID, start, at, &self.color),
            Tool::Select | Tool::Text => return None,
        };
        self.candidate = Some(candidate);
        self.candidate.as_ref()
    }

    /// Promote the candidate to a permanent annotation. Also used when the
    /// pointer leaves the canvas mid-drag.
    pub fn pointer_up(&mut self, annotations: &[Annotation]) -> Option<Vec<Annotation>> {
        self.drag_start = None;
        let candidate = self.candidate.take()?;
        let id = self.next_id();
        let mut next = annotations.to_vec();
        next.push(candidate.with_id(id));
        Some(next)
    }

    pub fn commit_text(
        &mut self,
        annotations: &[Annotation],
        at: Point,
        text: &str,
    ) -> Option<Vec<Annotation>> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        let id = self.next_id();
        let mut next = annotations.to_vec();
        next.push(Annotation::text(&id, at, text, &self.color));
        Some(next)
    }

    /// Drop the last committed annotation. `None` when there is nothing to undo.
    pub fn undo(&mut self, annotations: &[Annotation]) -> Option<Vec<Annotation>> {
        let (last, rest) = annotations.split_last()?;
        if self.selected.as_deref() == Some(last.id.as_str()) {
            self.selected = None;
        }
        Some(rest.to_vec())
    }

    pub fn clear(&mut self, annotations: &[Annotation]) -> Option<Vec<Annotation>> {
        if annotations.is_empty() {
            return None;
        }
        self.selected = None;
        Some(Vec::new())
    }

    pub fn delete_selected(&mut self, annotations: &[Annotation]) -> Option<Vec<Annotation>> {
        let id = self.selected.take()?;
        let next: Vec<Annotation> = annotations.iter().filter(|a| a.id != id).cloned().collect();
        (next.len() != annotations.len()).then_some(next)
    }

    /// Swap in `updated` for the annotation with the same id, keeping its
    /// position in the draw order.
    pub fn replace(
        &self,
        annotations: &[Annotation],
        updated: Annotation,
    ) -> Result<Option<Vec<Annotation>>> {
        updated.validate()?;
        let Some(pos) = annotations.iter().position(|a| a.id == updated.id) else {
            return Ok(None);
        };
        let mut next = annotations.to_vec();
        next[pos] = updated;
        Ok(Some(next))
    }

    /// Committed annotations followed by the candidate, in paint order.
    pub fn layers<'a>(&'a self, annotations: &'a [Annotation]) -> impl Iterator<Item = &'a Annotation> {
        annotations.iter().chain(self.candidate.iter())
    }

    fn next_id(&mut self) -> String {
        self.seq += 1;
        format!("{}-{}", Utc::now().timestamp_millis(), self.seq)
    }
}

/// Topmost annotation under `at`. Arrows get a few pixels of slack around
/// their shaft.
pub fn hit_test(annotations: &[Annotation], at: Point) -> Option<&Annotation> {
    annotations.iter().rev().find(|ann| {
        if let super::Shape::Arrow { end_x, end_y } = ann.shape {
            distance_to_segment(at, ann.origin(), Point::new(end_x, end_y)) <= 6.0
        } else {
            ann.bounds().contains(at)
        }
    })
}

fn distance_to_segment(p: Point, a: Point, b: Point) -> f64 {
    let (dx, dy) = (b.x - a.x, b.y - a.y);
    let len2 = dx * dx + dy * dy;
    let t = if len2 == 0.0 {
        0.0
    } else {
        (((p.x - a.x) * dx + (p.y - a.y) * dy) / len2).clamp(0.0, 1.0)
    };
    let (cx, cy) = (a.x + t * dx, a.y + t * dy);
    ((p.x - cx).powi(2) + (p.y - cy).powi(2)).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::{AnnotationKind, Shape};

    fn drag(editor: &mut AnnotationEditor, list: &[Annotation], from: Point, to: Point) -> Vec<Annotation> {
        assert_eq!(editor.pointer_down(list, from), PointerDown::Drawing);
        editor.pointer_move(to);
        editor.pointer_up(list).expect("drag should commit")
    }

    #[test]
    fn box_drags_normalize_in_all_directions() {
        let corners = [
            (Point::new(0.0, 0.0), Point::new(10.0, 10.0)),
            (Point::new(10.0, 10.0), Point::new(0.0, 0.0)),
            (Point::new(0.0, 10.0), Point::new(10.0, 0.0)),
            (Point::new(10.0, 0.0), Point::new(0.0, 10.0)),
        ];
        for (from, to) in corners {
            let mut editor = AnnotationEditor::new();
            editor.set_tool(Tool::Box);
            let list = drag(&mut editor, &[], from, to);
            assert_eq!(list[0].rect(), Some(Rect::new(0.0, 0.0, 10.0, 10.0)));
        }
    }

    #[test]
    fn candidate_is_temporary_until_pointer_up() {
        let mut editor = AnnotationEditor::new();
        editor.set_tool(Tool::Highlight);
        editor.pointer_down(&[], Point::new(5.0, 5.0));
        let candidate = editor.pointer_move(Point::new(15.0, 25.0)).unwrap();
        assert_eq!(candidate.id, CANDIDATE_ID);
        assert_eq!(editor.layers(&[]).count(), 1);

        let committed = editor.pointer_up(&[]).unwrap();
        assert_eq!(committed.len(), 1);
        assert_ne!(committed[0].id, CANDIDATE_ID);
        assert_eq!(committed[0].kind(), AnnotationKind::Highlight);
        assert!(editor.candidate().is_none());
    }

    #[test]
    fn click_without_move_commits_nothing() {
        let mut editor = AnnotationEditor::new();
        editor.set_tool(Tool::Arrow);
        editor.pointer_down(&[], Point::new(5.0, 5.0));
        assert!(editor.pointer_up(&[]).is_none());
    }

    #[test]
    fn undo_after_box_and_arrow_leaves_the_box() {
        let mut editor = AnnotationEditor::new();
        editor.set_tool(Tool::Box);
        let list = drag(&mut editor, &[], Point::new(0.0, 0.0), Point::new(10.0, 10.0));
        editor.set_tool(Tool::Arrow);
        let list = drag(&mut editor, &list, Point::new(0.0, 0.0), Point::new(20.0, 20.0));
        assert_eq!(list.len(), 2);

        let list = editor.undo(&list).unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].kind(), AnnotationKind::Box);
        assert_eq!(list[0].rect(), Some(Rect::new(0.0, 0.0, 10.0, 10.0)));
    }

    #[test]
    fn undo_and_clear_are_disabled_on_empty_lists() {
        let mut editor = AnnotationEditor::new();
        assert!(editor.undo(&[]).is_none());
        assert!(editor.clear(&[]).is_none());
    }

    #[test]
    fn text_tool_prompts_and_ignores_blank_input() {
        let mut editor = AnnotationEditor::new();
        editor.set_tool(Tool::Text);
        let at = match editor.pointer_down(&[], Point::new(12.0, 30.0)) {
            PointerDown::PromptText(at) => at,
            other => panic!("unexpected {other:?}"),
        };
        assert!(editor.commit_text(&[], at, "  ").is_none());
        let list = editor.commit_text(&[], at, " Save ").unwrap();
        assert_eq!(
            list[0].shape,
            Shape::Text {
                text: "Save".to_string()
            }
        );
    }

    #[test]
    fn pointer_positions_are_mapped_to_image_pixels() {
        let mut editor = AnnotationEditor::new();
        editor.set_display_size(500.0, 1000.0);
        editor.set_tool(Tool::Box);
        let list = drag(&mut editor, &[], Point::new(10.0, 10.0), Point::new(20.0, 30.0));
        assert_eq!(list[0].rect(), Some(Rect::new(20.0, 20.0, 20.0, 40.0)));
    }

    #[test]
    fn select_hits_topmost_and_delete_removes_it() {
        let list = vec![
            Annotation::boxed("under", Rect::new(0.0, 0.0, 50.0, 50.0), DEFAULT_COLOR),
            Annotation::highlight("over", Rect::new(10.0, 10.0, 10.0, 10.0), DEFAULT_COLOR),
        ];
        let mut editor = AnnotationEditor::new();
        let picked = editor.pointer_down(&list, Point::new(15.0, 15.0));
        assert_eq!(picked, PointerDown::Selected(Some("over".to_string())));

        let list = editor.delete_selected(&list).unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].id, "under");
        assert!(editor.delete_selected(&list).is_none());
    }

    #[test]
    fn arrows_are_hit_near_the_shaft_only() {
        let list = vec![Annotation::arrow(
            "a",
            Point::new(0.0, 0.0),
            Point::new(100.0, 100.0),
            DEFAULT_COLOR,
        )];
        assert!(hit_test(&list, Point::new(52.0, 50.0)).is_some());
        assert!(hit_test(&list, Point::new(90.0, 10.0)).is_none());
    }

    #[test]
    fn replace_keeps_draw_order() {
        let list = vec![
            Annotation::boxed("a", Rect::new(0.0, 0.0, 5.0, 5.0), DEFAULT_COLOR),
            Annotation::boxed("b", Rect::new(5.0, 5.0, 5.0, 5.0), DEFAULT_COLOR),
        ];
        let editor = AnnotationEditor::new();
        let updated = Annotation::boxed("a", Rect::new(1.0, 1.0, 2.0, 2.0), "#3b82f6");
        let next = editor.replace(&list, updated.clone()).unwrap().unwrap();
        assert_eq!(next[0], updated);
        assert_eq!(next[1].id, "b");

        let missing = Annotation::boxed("zzz", Rect::default(), DEFAULT_COLOR);
        assert!(editor.replace(&list, missing).unwrap().is_none());
    }

    #[test]
    fn colors_come_from_the_palette() {
        let mut editor = AnnotationEditor::new();
        assert!(editor.set_color("#3B82F6").is_ok());
        assert_eq!(editor.color(), "#3b82f6");
        assert!(editor.set_color("#123456").is_err());
        assert_eq!(editor.color(), "#3b82f6");
    }
}
