use serde::Serialize;
use tracing::{debug, info, warn};

use super::layout::{self, Size};
use super::{HostMessage, TourConfig, TourStep};
use crate::geometry::{Point, Rect};

pub type TimerId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", rename_all = "camelCase")]
pub enum Phase {
    Idle,
    Locating { step: usize },
    Shown { step: usize },
    Completed,
    Skipped,
}

/// What the tooltip of a shown step is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Anchor {
    Element,
    /// The selector never matched; the step is shown against the page body.
    Body,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum NavKey {
    Next,
    Previous,
    Dismiss,
}

impl NavKey {
    /// Map a keydown to a tour action. Only Alt chords count, and never while
    /// the user is typing into an editable element.
    pub fn from_event(key: &str, alt: bool, editable_target: bool) -> Option<Self> {
        if !alt || editable_target {
            return None;
        }
        match key {
            "ArrowRight" => Some(Self::Next),
            "ArrowLeft" => Some(Self::Previous),
            "Escape" => Some(Self::Dismiss),
            _ => None,
        }
    }

    /// Parse a chord such as `Alt+ArrowRight`. Bare keys are rejected.
    pub fn from_key(chord: &str) -> Option<Self> {
        let key = chord.strip_prefix("Alt+")?;
        Self::from_event(key, true, false)
    }
}

/// Everything the page needs to paint one step.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepView<'a> {
    pub index: usize,
    pub total: usize,
    pub step: &'a TourStep,
    /// Document-space box around the target; absent when anchored to the body.
    pub highlight: Option<Rect>,
    pub show_previous: bool,
    pub is_last: bool,
    /// Flow-analysis notes, rendered as a list under the description.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub insights: Vec<String>,
    /// Text for the polite live region, present with accessibility support.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub announcement: Option<String>,
}

/// The page the guide runs in. In the browser this is the DOM, timers and
/// `chrome.storage.local`.
pub trait GuideHost {
    fn now_ms(&self) -> u64;

    /// Viewport-relative bounding rect of the first element matching `selector`.
    fn query(&self, selector: &str) -> Option<Rect>;

    fn body_rect(&self) -> Rect;

    fn scroll_offset(&self) -> Point;

    fn schedule_locate(&mut self, delay_ms: u64) -> TimerId;

    fn cancel_timer(&mut self, id: TimerId);

    /// Paint overlay, highlight and tooltip. Returns the measured tooltip size.
    fn render(&mut self, view: &StepView<'_>) -> Size;

    fn place_tooltip(&mut self, at: Point);

    /// Remove whatever `render` put on the page.
    fn teardown(&mut self);

    fn persist_completed(&mut self, completed: bool);

    fn announce_completion(&mut self) {}

    fn phase_changed(&mut self, _phase: Phase) {}
}

/// A locate attempt waiting on a timer. Only the timer recorded here is
/// allowed to resume locating; anything else that fires is stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PendingLocate {
    step: usize,
    timer: TimerId,
    started_at: u64,
}

#[derive(Debug)]
pub struct GuideMachine {
    config: TourConfig,
    phase: Phase,
    anchor: Option<Anchor>,
    pending: Option<PendingLocate>,
}

impl GuideMachine {
    pub fn new(config: TourConfig) -> Self {
        Self {
            config,
            phase: Phase::Idle,
            anchor: None,
            pending: None,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn anchor(&self) -> Option<Anchor> {
        self.anchor
    }

    pub fn config(&self) -> &TourConfig {
        &self.config
    }

    pub fn is_locating(&self) -> bool {
        self.pending.is_some()
    }

    /// Called once the stored completion flag has been read.
    pub fn boot<H: GuideHost>(&mut self, host: &mut H, completed: bool) -> Phase {
        if completed {
            debug!("tour already completed, staying idle");
            return self.phase;
        }
        self.locate(host, 0);
        self.phase
    }

    pub fn handle_message<H: GuideHost>(&mut self, host: &mut H, message: HostMessage) {
        match message {
            HostMessage::Start => self.locate(host, 0),
            HostMessage::Reset => {
                self.cancel_pending(host);
                host.teardown();
                host.persist_completed(false);
                self.locate(host, 0);
            }
        }
    }

    pub fn timer_fired<H: GuideHost>(&mut self, host: &mut H, id: TimerId) {
        match self.pending {
            Some(pending) if pending.timer == id => {
                self.pending = None;
                self.attempt(host, pending.step, pending.started_at);
            }
            _ => debug!(timer = id, "ignoring stale locate timer"),
        }
    }

    pub fn next<H: GuideHost>(&mut self, host: &mut H) {
        if let Phase::Shown { step } = self.phase {
            self.locate(host, step + 1);
        }
    }

    pub fn previous<H: GuideHost>(&mut self, host: &mut H) {
        if let Phase::Shown { step } = self.phase {
            if step > 0 {
                self.locate(host, step - 1);
            }
        }
    }

    /// The tooltip's close control.
    pub fn close<H: GuideHost>(&mut self, host: &mut H) {
        if let Phase::Shown { .. } = self.phase {
            self.finish(host, Phase::Skipped);
        }
    }

    pub fn key<H: GuideHost>(&mut self, host: &mut H, key: NavKey) {
        if !self.config.keyboard_enabled() {
            return;
        }
        match key {
            NavKey::Next => self.next(host),
            NavKey::Previous => self.previous(host),
            NavKey::Dismiss => self.close(host),
        }
    }

    fn cancel_pending<H: GuideHost>(&mut self, host: &mut H) {
        if let Some(pending) = self.pending.take() {
            host.cancel_timer(pending.timer);
        }
    }

    fn locate<H: GuideHost>(&mut self, host: &mut H, index: usize) {
        self.cancel_pending(host);
        host.teardown();
        self.anchor = None;
        if index >= self.config.steps.len() {
            self.finish(host, Phase::Completed);
            return;
        }
        self.set_phase(host, Phase::Locating { step: index });
        let started_at = host.now_ms();
        self.attempt(host, index, started_at);
    }

    fn attempt<H: GuideHost>(&mut self, host: &mut H, index: usize, started_at: u64) {
        let selector = &self.config.steps[index].selector;
        if let Some(rect) = host.query(selector) {
            self.show(host, index, Some(rect));
            return;
        }
        let elapsed = host.now_ms().saturating_sub(started_at);
        if elapsed >= self.config.settings.locate_timeout_ms {
            warn!(step = index, selector = %selector, "element not found, anchoring to body");
            self.show(host, index, None);
            return;
        }
        let timer = host.schedule_locate(self.config.settings.locate_interval_ms);
        self.pending = Some(PendingLocate {
            step: index,
            timer,
            started_at,
        });
    }

    fn show<H: GuideHost>(&mut self, host: &mut H, index: usize, target: Option<Rect>) {
        let scroll = host.scroll_offset();
        let total = self.config.steps.len();
        let step = &self.config.steps[index];
        let (anchor_rect, highlight) = match target {
            Some(rect) => (rect, Some(layout::to_document(rect, scroll))),
            None => (host.body_rect(), None),
        };
        let view = StepView {
            index,
            total,
            step,
            highlight,
            show_previous: index > 0,
            is_last: index + 1 == total,
            insights: self.config.insights(index),
            announcement: self.config.announcement(index),
        };
        let size = host.render(&view);
        let at = layout::tooltip_position(
            anchor_rect,
            scroll,
            size,
            step.position,
            self.config.settings.tooltip_padding,
        );
        host.place_tooltip(at);

        self.anchor = Some(if target.is_some() {
            Anchor::Element
        } else {
            Anchor::Body
        });
        self.set_phase(host, Phase::Shown { step: index });
    }

    fn finish<H: GuideHost>(&mut self, host: &mut H, outcome: Phase) {
        self.cancel_pending(host);
        host.teardown();
        host.persist_completed(true);
        if outcome == Phase::Completed {
            host.announce_completion();
        }
        info!(outcome = ?outcome, tour = %self.config.name, "tour finished");
        self.anchor = None;
        self.set_phase(host, outcome);
    }

    fn set_phase<H: GuideHost>(&mut self, host: &mut H, phase: Phase) {
        self.phase = phase;
        host.phase_changed(phase);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::AiFeatures;
    use crate::runtime::simulate::{self, PlayAction, SimulatedHost, StaticPage, TraceEvent};
    use crate::runtime::RuntimeSettings;
    use crate::workflow::Position;

    fn tour_step(id: &str, selector: &str) -> TourStep {
        TourStep {
            id: id.to_string(),
            title: format!("Step {id}"),
            description: String::new(),
            selector: selector.to_string(),
            position: Position::Bottom,
            image: None,
        }
    }

    fn config(selectors: &[&str]) -> TourConfig {
        TourConfig {
            name: "test tour".to_string(),
            steps: selectors
                .iter()
                .enumerate()
                .map(|(i, sel)| tour_step(&i.to_string(), sel))
                .collect(),
            settings: RuntimeSettings::default(),
            features: None,
            flow_analysis: None,
        }
    }

    fn abc_page() -> StaticPage {
        StaticPage::default()
            .with_element("#a", Rect::new(10.0, 10.0, 100.0, 30.0))
            .with_element("#b", Rect::new(10.0, 100.0, 100.0, 30.0))
            .with_element("#c", Rect::new(10.0, 200.0, 100.0, 30.0))
    }

    fn transitions(events: &[TraceEvent]) -> Vec<Phase> {
        events
            .iter()
            .filter_map(|e| match e {
                TraceEvent::Transition { to, .. } => Some(*to),
                _ => None,
            })
            .filter(|p| !matches!(p, Phase::Locating { .. }))
            .collect()
    }

    #[test]
    fn three_step_tour_plays_to_completion() {
        let report = simulate::play(
            config(&["#a", "#b", "#c"]),
            abc_page(),
            &[PlayAction::Next, PlayAction::Next, PlayAction::Next],
            false,
        );
        assert_eq!(
            transitions(&report.events),
            vec![
                Phase::Shown { step: 0 },
                Phase::Shown { step: 1 },
                Phase::Shown { step: 2 },
                Phase::Completed,
            ]
        );
        assert_eq!(report.render_cycles, 3);
        assert!(report.completed_flag);
        assert_eq!(report.final_phase, Phase::Completed);
        assert!(report
            .events
            .iter()
            .any(|e| matches!(e, TraceEvent::CompletionNotice { .. })));
    }

    #[test]
    fn missing_element_falls_back_to_body_after_timeout() {
        let mut host = SimulatedHost::new(StaticPage::default(), false);
        let mut guide = GuideMachine::new(config(&["#nowhere"]));
        assert_eq!(guide.boot(&mut host, false), Phase::Locating { step: 0 });
        assert_eq!(host.pending_timers(), 1);

        simulate::settle(&mut guide, &mut host);
        assert_eq!(guide.phase(), Phase::Shown { step: 0 });
        assert_eq!(guide.anchor(), Some(Anchor::Body));
        assert_eq!(host.clock(), 5000);
        assert_eq!(host.pending_timers(), 0);
        assert!(host.events().iter().any(|e| matches!(
            e,
            TraceEvent::Render {
                highlight: None,
                ..
            }
        )));
    }

    #[test]
    fn late_element_is_found_by_polling() {
        let mut page = abc_page();
        page.appears_after_ms.insert("#a".to_string(), 350);
        let mut host = SimulatedHost::new(page, false);
        let mut guide = GuideMachine::new(config(&["#a"]));
        guide.boot(&mut host, false);
        simulate::settle(&mut guide, &mut host);
        assert_eq!(guide.phase(), Phase::Shown { step: 0 });
        assert_eq!(guide.anchor(), Some(Anchor::Element));
        assert_eq!(host.clock(), 400);
    }

    #[test]
    fn previous_at_first_step_is_a_no_op() {
        let mut host = SimulatedHost::new(abc_page(), false);
        let mut guide = GuideMachine::new(config(&["#a", "#b"]));
        guide.boot(&mut host, false);
        guide.previous(&mut host);
        assert_eq!(guide.phase(), Phase::Shown { step: 0 });
        assert_eq!(host.render_cycles(), 1);
        assert!(host.is_mounted());
    }

    #[test]
    fn previous_re_resolves_the_earlier_step() {
        let mut host = SimulatedHost::new(abc_page(), false);
        let mut guide = GuideMachine::new(config(&["#a", "#b"]));
        guide.boot(&mut host, false);
        guide.next(&mut host);
        guide.previous(&mut host);
        assert_eq!(guide.phase(), Phase::Shown { step: 0 });
        assert_eq!(host.render_cycles(), 3);
    }

    #[test]
    fn next_on_last_step_completes_and_persists() {
        let mut host = SimulatedHost::new(abc_page(), false);
        let mut guide = GuideMachine::new(config(&["#a"]));
        guide.boot(&mut host, false);
        guide.next(&mut host);
        assert_eq!(guide.phase(), Phase::Completed);
        assert!(host.stored_completed());
        assert!(!host.is_mounted());
    }

    #[test]
    fn close_skips_and_persists_without_notice() {
        let mut host = SimulatedHost::new(abc_page(), false);
        let mut guide = GuideMachine::new(config(&["#a", "#b"]));
        guide.boot(&mut host, false);
        guide.close(&mut host);
        assert_eq!(guide.phase(), Phase::Skipped);
        assert!(host.stored_completed());
        assert!(!host
            .events()
            .iter()
            .any(|e| matches!(e, TraceEvent::CompletionNotice { .. })));
    }

    #[test]
    fn completed_flag_keeps_the_guide_idle_until_reset() {
        let mut host = SimulatedHost::new(abc_page(), true);
        let mut guide = GuideMachine::new(config(&["#a"]));
        assert_eq!(guide.boot(&mut host, true), Phase::Idle);
        assert_eq!(host.render_cycles(), 0);

        guide.handle_message(&mut host, HostMessage::Reset);
        assert_eq!(guide.phase(), Phase::Shown { step: 0 });
        assert!(!host.stored_completed());
    }

    #[test]
    fn empty_tour_completes_immediately() {
        let report = simulate::play(config(&[]), StaticPage::default(), &[], false);
        assert_eq!(report.final_phase, Phase::Completed);
        assert!(report.completed_flag);
        assert_eq!(report.render_cycles, 0);
    }

    #[test]
    fn restarting_cancels_the_previous_locate_timer() {
        let mut host = SimulatedHost::new(StaticPage::default(), false);
        let mut guide = GuideMachine::new(config(&["#missing"]));
        guide.boot(&mut host, false);
        let stale = host.pop_due_timer().unwrap();
        // put the stale id back in play by restarting before it is delivered
        guide.handle_message(&mut host, HostMessage::Start);
        assert_eq!(host.pending_timers(), 1);

        guide.timer_fired(&mut host, stale);
        assert_eq!(guide.phase(), Phase::Locating { step: 0 });
        assert_eq!(host.pending_timers(), 1);
    }

    #[test]
    fn navigation_while_locating_is_ignored() {
        let mut host = SimulatedHost::new(StaticPage::default(), false);
        let mut guide = GuideMachine::new(config(&["#missing", "#b"]));
        guide.boot(&mut host, false);
        guide.next(&mut host);
        guide.close(&mut host);
        assert_eq!(guide.phase(), Phase::Locating { step: 0 });
    }

    #[test]
    fn keyboard_navigation_needs_accessibility_support() {
        let mut plain = config(&["#a", "#b"]);
        let report = simulate::play(
            plain.clone(),
            abc_page(),
            &[PlayAction::Key(NavKey::Next)],
            false,
        );
        assert_eq!(report.final_phase, Phase::Shown { step: 0 });

        plain.features = Some(AiFeatures {
            accessibility_support: true,
            ..AiFeatures::default()
        });
        let report = simulate::play(
            plain,
            abc_page(),
            &[PlayAction::Key(NavKey::Next), PlayAction::Key(NavKey::Dismiss)],
            false,
        );
        assert_eq!(report.final_phase, Phase::Skipped);
        assert_eq!(report.render_cycles, 2);
    }

    #[test]
    fn rendered_step_carries_insights_and_announcement() {
        let mut tour = config(&["#a", "#b"]);
        tour.features = Some(AiFeatures {
            accessibility_support: true,
            ..AiFeatures::default()
        });
        let mut flow = crate::workflow::FlowSummary::default();
        flow.user_journey.stages = vec!["signup".to_string(), "activation".to_string()];
        tour.flow_analysis = Some(flow);

        let report = simulate::play(tour, abc_page(), &[PlayAction::Next], false);
        let renders: Vec<(&[String], Option<&str>)> = report
            .events
            .iter()
            .filter_map(|e| match e {
                TraceEvent::Render {
                    insights,
                    announcement,
                    ..
                } => Some((insights.as_slice(), announcement.as_deref())),
                _ => None,
            })
            .collect();
        assert_eq!(renders.len(), 2);
        assert_eq!(renders[0].0, ["Journey stage: signup".to_string()]);
        assert_eq!(renders[0].1, Some("Step 1 of 2: Step 0"));
        assert_eq!(renders[1].0, ["Journey stage: activation".to_string()]);
        assert_eq!(renders[1].1, Some("Step 2 of 2: Step 1"));
    }

    #[test]
    fn navigation_keys_need_the_alt_modifier() {
        assert_eq!(NavKey::from_key("Alt+ArrowRight"), Some(NavKey::Next));
        assert_eq!(NavKey::from_key("Alt+ArrowLeft"), Some(NavKey::Previous));
        assert_eq!(NavKey::from_key("Alt+Escape"), Some(NavKey::Dismiss));
        assert_eq!(NavKey::from_key("ArrowRight"), None);
        assert_eq!(NavKey::from_key("Escape"), None);
        assert_eq!(NavKey::from_key("Alt+Tab"), None);

        assert_eq!(NavKey::from_event("ArrowLeft", false, false), None);
        // typing in a field never moves the tour
        assert_eq!(NavKey::from_event("ArrowRight", true, true), None);
        assert_eq!(NavKey::from_event("ArrowRight", true, false), Some(NavKey::Next));
    }

    #[test]
    fn highlight_and_tooltip_use_document_coordinates() {
        let mut page = abc_page();
        page.scroll = Point::new(0.0, 300.0);
        let mut host = SimulatedHost::new(page, false);
        let mut guide = GuideMachine::new(config(&["#b"]));
        guide.boot(&mut host, false);
        let events = host.events();
        assert!(events.iter().any(|e| matches!(
            e,
            TraceEvent::Render { highlight: Some(r), .. } if *r == Rect::new(10.0, 400.0, 100.0, 30.0)
        )));
        // bottom placement: 400 + 30 + 16, centered 10 + (100 - 320) / 2 clamped to 16
        assert!(events.iter().any(|e| matches!(
            e,
            TraceEvent::Tooltip { x, y, .. } if *x == 16.0 && *y == 446.0
        )));
    }
}
