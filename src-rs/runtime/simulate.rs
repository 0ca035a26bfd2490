//! Play a tour against a recorded page layout instead of a live browser.
//!
//! The page is a static description of where each selector's element sits
//! (and optionally when it shows up). Time only moves when a locate timer is
//! due, so a full five-second miss plays out instantly.

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::layout::Size;
use super::machine::{Anchor, GuideHost, GuideMachine, NavKey, Phase, StepView, TimerId};
use super::{HostMessage, TourConfig};
use crate::error::{Result, TourError};
use crate::geometry::{Point, Rect};

const TOOLTIP_WIDTH: f64 = 320.0;
const TOOLTIP_HEIGHT: f64 = 160.0;
const SCREENSHOT_HEIGHT: f64 = 180.0;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StaticPage {
    pub viewport: Option<Size>,
    pub scroll: Point,
    pub body: Option<Rect>,
    /// Viewport-relative bounding rects keyed by selector.
    pub elements: BTreeMap<String, Rect>,
    /// Milliseconds after load before a selector starts matching.
    pub appears_after_ms: BTreeMap<String, u64>,
}

impl StaticPage {
    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn with_element(mut self, selector: &str, rect: Rect) -> Self {
        self.elements.insert(selector.to_string(), rect);
        self
    }

    fn viewport(&self) -> Size {
        self.viewport.unwrap_or(Size {
            width: 1280.0,
            height: 800.0,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum TraceEvent {
    #[serde(rename_all = "camelCase")]
    Transition { at_ms: u64, to: Phase },
    #[serde(rename_all = "camelCase")]
    Render {
        at_ms: u64,
        step: usize,
        title: String,
        highlight: Option<Rect>,
        image: Option<String>,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        insights: Vec<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        announcement: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Tooltip { at_ms: u64, x: f64, y: f64 },
    #[serde(rename_all = "camelCase")]
    Persist { at_ms: u64, completed: bool },
    #[serde(rename_all = "camelCase")]
    CompletionNotice { at_ms: u64 },
}

#[derive(Debug)]
pub struct SimulatedHost {
    page: StaticPage,
    clock: u64,
    next_timer: TimerId,
    timers: BTreeMap<TimerId, u64>,
    stored_completed: bool,
    mounted: bool,
    render_cycles: usize,
    events: Vec<TraceEvent>,
}

impl SimulatedHost {
    pub fn new(page: StaticPage, stored_completed: bool) -> Self {
        Self {
            page,
            clock: 0,
            next_timer: 0,
            timers: BTreeMap::new(),
            stored_completed,
            mounted: false,
            render_cycles: 0,
            events: Vec::new(),
        }
    }

    pub fn clock(&self) -> u64 {
        self.clock
    }

    pub fn stored_completed(&self) -> bool {
        self.stored_completed
    }

    pub fn render_cycles(&self) -> usize {
        self.render_cycles
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted
    }

    pub fn pending_timers(&self) -> usize {
        self.timers.len()
    }

    pub fn events(&self) -> &[TraceEvent] {
        &self.events
    }

    pub fn advance(&mut self, ms: u64) {
        self.clock += ms;
    }

    /// Jump the clock to the earliest live timer and hand back its id.
    pub fn pop_due_timer(&mut self) -> Option<TimerId> {
        let (&id, &due) = self.timers.iter().min_by_key(|(id, due)| (**due, **id))?;
        self.timers.remove(&id);
        self.clock = self.clock.max(due);
        Some(id)
    }
}

impl GuideHost for SimulatedHost {
    fn now_ms(&self) -> u64 {
        self.clock
    }

    fn query(&self, selector: &str) -> Option<Rect> {
        let visible_from = self.page.appears_after_ms.get(selector).copied().unwrap_or(0);
        if self.clock < visible_from {
            return None;
        }
        self.page.elements.get(selector).copied()
    }

    fn body_rect(&self) -> Rect {
        self.page.body.unwrap_or_else(|| {
            let vp = self.page.viewport();
            Rect::new(0.0, 0.0, vp.width, vp.height)
        })
    }

    fn scroll_offset(&self) -> Point {
        self.page.scroll
    }

    fn schedule_locate(&mut self, delay_ms: u64) -> TimerId {
        self.next_timer += 1;
        self.timers.insert(self.next_timer, self.clock + delay_ms);
        self.next_timer
    }

    fn cancel_timer(&mut self, id: TimerId) {
        self.timers.remove(&id);
    }

    fn render(&mut self, view: &StepView<'_>) -> Size {
        self.mounted = true;
        self.render_cycles += 1;
        self.events.push(TraceEvent::Render {
            at_ms: self.clock,
            step: view.index,
            title: view.step.title.clone(),
            highlight: view.highlight,
            image: view.step.image.clone(),
            insights: view.insights.clone(),
            announcement: view.announcement.clone(),
        });
        let extra = if view.step.image.is_some() {
            SCREENSHOT_HEIGHT
        } else {
            0.0
        };
        Size {
            width: TOOLTIP_WIDTH,
            height: TOOLTIP_HEIGHT + extra,
        }
    }

    fn place_tooltip(&mut self, at: Point) {
        self.events.push(TraceEvent::Tooltip {
            at_ms: self.clock,
            x: at.x,
            y: at.y,
        });
    }

    fn teardown(&mut self) {
        self.mounted = false;
    }

    fn persist_completed(&mut self, completed: bool) {
        self.stored_completed = completed;
        self.events.push(TraceEvent::Persist {
            at_ms: self.clock,
            completed,
        });
    }

    fn announce_completion(&mut self) {
        self.events.push(TraceEvent::CompletionNotice { at_ms: self.clock });
    }

    fn phase_changed(&mut self, phase: Phase) {
        self.events.push(TraceEvent::Transition {
            at_ms: self.clock,
            to: phase,
        });
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum PlayAction {
    Next,
    Previous,
    Close,
    Start,
    Reset,
    Key(NavKey),
}

impl FromStr for PlayAction {
    type Err = TourError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if let Some(key) = s.strip_prefix("key:") {
            return NavKey::from_key(key)
                .map(PlayAction::Key)
                .ok_or_else(|| TourError::InvalidWorkflow(format!("unknown key: {key}")));
        }
        match s.to_ascii_lowercase().as_str() {
            "next" => Ok(Self::Next),
            "previous" | "prev" => Ok(Self::Previous),
            "close" | "skip" => Ok(Self::Close),
            "start" => Ok(Self::Start),
            "reset" => Ok(Self::Reset),
            other => Err(TourError::InvalidWorkflow(format!("unknown action: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayReport {
    pub final_phase: Phase,
    pub anchor: Option<Anchor>,
    pub completed_flag: bool,
    pub render_cycles: usize,
    pub elapsed_ms: u64,
    pub events: Vec<TraceEvent>,
}

/// Fire due locate timers until the guide stops locating.
pub fn settle(guide: &mut GuideMachine, host: &mut SimulatedHost) {
    while guide.is_locating() {
        let Some(id) = host.pop_due_timer() else {
            break;
        };
        guide.timer_fired(host, id);
    }
}

pub fn apply(guide: &mut GuideMachine, host: &mut SimulatedHost, action: PlayAction) {
    match action {
        PlayAction::Next => guide.next(host),
        PlayAction::Previous => guide.previous(host),
        PlayAction::Close => guide.close(host),
        PlayAction::Start => guide.handle_message(host, HostMessage::Start),
        PlayAction::Reset => guide.handle_message(host, HostMessage::Reset),
        PlayAction::Key(key) => guide.key(host, key),
    }
    settle(guide, host);
}

pub fn play(
    config: TourConfig,
    page: StaticPage,
    actions: &[PlayAction],
    stored_completed: bool,
) -> PlayReport {
    let mut host = SimulatedHost::new(page, stored_completed);
    let mut guide = GuideMachine::new(config);
    guide.boot(&mut host, stored_completed);
    settle(&mut guide, &mut host);
    for action in actions {
        apply(&mut guide, &mut host, *action);
    }
    PlayReport {
        final_phase: guide.phase(),
        anchor: guide.anchor(),
        completed_flag: host.stored_completed(),
        render_cycles: host.render_cycles(),
        elapsed_ms: host.clock(),
        events: host.events,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_action_names() {
        assert_eq!("next".parse::<PlayAction>().unwrap(), PlayAction::Next);
        assert_eq!(" Prev ".parse::<PlayAction>().unwrap(), PlayAction::Previous);
        assert_eq!("skip".parse::<PlayAction>().unwrap(), PlayAction::Close);
        assert_eq!(
            "key:Alt+Escape".parse::<PlayAction>().unwrap(),
            PlayAction::Key(NavKey::Dismiss)
        );
        assert!("jump".parse::<PlayAction>().is_err());
        assert!("key:Alt+Tab".parse::<PlayAction>().is_err());
        assert!("key:ArrowRight".parse::<PlayAction>().is_err());
    }

    #[test]
    fn page_json_uses_camel_case() {
        let page = StaticPage::from_json(
            r##"{"scroll": {"x": 0, "y": 120},
                 "elements": {"#a": {"x": 1, "y": 2, "width": 3, "height": 4}},
                 "appearsAfterMs": {"#a": 300}}"##,
        )
        .unwrap();
        assert_eq!(page.scroll.y, 120.0);
        assert_eq!(page.appears_after_ms["#a"], 300);
    }

    #[test]
    fn timers_fire_in_due_order() {
        let mut host = SimulatedHost::new(StaticPage::default(), false);
        let a = host.schedule_locate(200);
        let b = host.schedule_locate(100);
        host.cancel_timer(a);
        assert_eq!(host.pop_due_timer(), Some(b));
        assert_eq!(host.clock(), 100);
        assert_eq!(host.pop_due_timer(), None);
    }

    #[test]
    fn elements_can_appear_late() {
        let mut page = StaticPage::default().with_element("#late", Rect::new(0.0, 0.0, 5.0, 5.0));
        page.appears_after_ms.insert("#late".to_string(), 250);
        let mut host = SimulatedHost::new(page, false);
        assert!(host.query("#late").is_none());
        host.advance(250);
        assert!(host.query("#late").is_some());
    }
}
