//! Workflow and step schema shared by the editor, the compiler and the
//! runtime guide. Field names on the wire are camelCase to match the editor.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::annotation::Annotation;
use crate::error::{Result, TourError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workflow {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub target_url: String,
    #[serde(default)]
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Matched against the live DOM at play time; never validated here.
    pub selector: String,
    #[serde(default)]
    pub position: Position,
    /// Data URL of the captured screenshot.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<String>,
    #[serde(default)]
    pub annotations: Vec<Annotation>,
}

/// Which edge of the target element the tooltip sits against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Position {
    Top,
    #[default]
    Bottom,
    Left,
    Right,
}

impl Workflow {
    pub fn from_json(raw: &str) -> Result<Self> {
        let workflow: Workflow = serde_json::from_str(raw)?;
        workflow.validate()?;
        Ok(workflow)
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(TourError::InvalidWorkflow("name must not be empty".to_string()));
        }
        let mut seen = HashSet::new();
        for step in &self.steps {
            if !seen.insert(step.id.as_str()) {
                return Err(TourError::InvalidWorkflow(format!(
                    "duplicate step id: {}",
                    step.id
                )));
            }
            for ann in &step.annotations {
                ann.validate()?;
            }
        }
        Ok(())
    }

    /// `targetUrl` without trailing slashes, ready for `<origin>/*` patterns.
    pub fn url_base(&self) -> &str {
        self.target_url.trim().trim_end_matches('/')
    }

    pub fn step_index(&self, id: &str) -> Option<usize> {
        self.steps.iter().position(|s| s.id == id)
    }

    /// Insert at `index`, clamped to the end of the list.
    pub fn insert_step(&mut self, index: usize, step: Step) -> Result<()> {
        if self.step_index(&step.id).is_some() {
            return Err(TourError::InvalidWorkflow(format!(
                "duplicate step id: {}",
                step.id
            )));
        }
        let index = index.min(self.steps.len());
        self.steps.insert(index, step);
        Ok(())
    }

    pub fn update_step(&mut self, step: Step) -> Result<()> {
        let index = self
            .step_index(&step.id)
            .ok_or_else(|| TourError::InvalidWorkflow(format!("unknown step id: {}", step.id)))?;
        self.steps[index] = step;
        Ok(())
    }

    pub fn delete_step(&mut self, id: &str) -> Option<Step> {
        let index = self.step_index(id)?;
        Some(self.steps.remove(index))
    }

    /// Copy a step right after itself. The copy gets id `<id>-copy` (with a
    /// numeric suffix when that is taken).
    pub fn duplicate_step(&mut self, id: &str) -> Result<&Step> {
        let index = self
            .step_index(id)
            .ok_or_else(|| TourError::InvalidWorkflow(format!("unknown step id: {id}")))?;
        let mut copy = self.steps[index].clone();
        let base = format!("{id}-copy");
        let mut candidate = base.clone();
        let mut n = 2;
        while self.step_index(&candidate).is_some() {
            candidate = format!("{base}-{n}");
            n += 1;
        }
        copy.id = candidate;
        self.steps.insert(index + 1, copy);
        Ok(&self.steps[index + 1])
    }
}

/// Output of the page-flow analysis service. Only carried through into AI
/// bundles, so every section is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowSummary {
    pub session_info: SessionInfo,
    pub overall_flow: OverallFlow,
    pub page_types: BTreeMap<String, u32>,
    pub user_journey: UserJourney,
    pub tech_support_recommendations: TechSupportRecommendations,
    pub accessibility_summary: AccessibilitySummary,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionInfo {
    pub total_screenshots: u32,
    pub generated_at: String,
    pub directory: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverallFlow {
    pub total_steps: u32,
    pub flow_steps: Vec<FlowStep>,
    pub common_patterns: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowStep {
    pub step: u32,
    pub page_type: String,
    pub primary_action: String,
    pub screenshot: String,
    #[serde(rename = "clickedElement", skip_serializing_if = "Option::is_none")]
    pub clicked_element: Option<String>,
    #[serde(rename = "elementIndex", skip_serializing_if = "Option::is_none")]
    pub element_index: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserJourney {
    pub stages: Vec<String>,
    pub progression: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TechSupportRecommendations {
    pub high_priority_areas: Vec<String>,
    pub common_user_challenges: Vec<String>,
    pub suggested_interventions: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessibilitySummary {
    pub total_pages_analyzed: u32,
    pub accessibility_concerns: Vec<String>,
    pub recommendations: Vec<String>,
}
