//! The tour runtime.
//!
//! The bundle ships one fixed content script (`runtime/content.js`) plus a
//! `tour.json` describing the workflow. [`TourConfig`] is that file, and
//! [`machine::GuideMachine`] is the same state machine the content script
//! runs, driven through the [`machine::GuideHost`] trait so it can be played
//! against a recorded page layout.

use serde::{Deserialize, Serialize};

use crate::bundle::AiFeatures;
use crate::error::Result;
use crate::workflow::{FlowSummary, Position};

pub mod layout;
pub mod machine;
pub mod simulate;

/// Extension-local storage key holding the completion flag.
pub const STORAGE_KEY: &str = "workflowCompleted";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeSettings {
    pub locate_interval_ms: u64,
    pub locate_timeout_ms: u64,
    pub tooltip_padding: f64,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            locate_interval_ms: 100,
            locate_timeout_ms: 5000,
            tooltip_padding: 16.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TourStep {
    pub id: String,
    pub title: String,
    pub description: String,
    pub selector: String,
    pub position: Position,
    /// Bundle-relative asset path, or an inline data URL in AI bundles.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

/// Contents of `tour.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TourConfig {
    pub name: String,
    pub steps: Vec<TourStep>,
    #[serde(default)]
    pub settings: RuntimeSettings,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub features: Option<AiFeatures>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flow_analysis: Option<FlowSummary>,
}

impl TourConfig {
    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn keyboard_enabled(&self) -> bool {
        self.features.is_some_and(|f| f.accessibility_support)
    }

    /// Flow-analysis notes shown under the step at `index`. Empty when the
    /// bundle carries no analysis.
    pub fn insights(&self, index: usize) -> Vec<String> {
        let (Some(flow), Some(step)) = (&self.flow_analysis, self.steps.get(index)) else {
            return Vec::new();
        };
        let mut insights = Vec::with_capacity(3);
        let title = step.title.trim().to_lowercase();
        if !title.is_empty() {
            let challenge = flow
                .tech_support_recommendations
                .high_priority_areas
                .iter()
                .find(|area| area.to_lowercase().contains(&title));
            if let Some(area) = challenge {
                insights.push(format!("Common challenge: {area}"));
            }
        }
        if !flow.accessibility_summary.accessibility_concerns.is_empty() {
            insights.push("Accessibility features available for this step".to_string());
        }
        let stage = flow
            .user_journey
            .stages
            .get(index)
            .map_or("unknown", String::as_str);
        insights.push(format!("Journey stage: {stage}"));
        insights
    }

    /// Screen-reader text for the step at `index`, when accessibility
    /// support is on.
    pub fn announcement(&self, index: usize) -> Option<String> {
        if !self.keyboard_enabled() {
            return None;
        }
        let step = self.steps.get(index)?;
        Some(format!(
            "Step {} of {}: {}",
            index + 1,
            self.steps.len(),
            step.title
        ))
    }
}

/// Messages the content script accepts from the popup and background worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action")]
pub enum HostMessage {
    #[serde(rename = "startWorkflow")]
    Start,
    #[serde(rename = "resetWorkflow")]
    Reset,
}
