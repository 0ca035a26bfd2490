//! Workflow to browser-extension compiler.
//!
//! [`compile`] is pure: the same workflow and options always produce the same
//! entries, byte for byte. The runtime scripts are fixed files; everything
//! workflow-specific lands in `tour.json` and the image assets.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Result, TourError};
use crate::runtime::{RuntimeSettings, TourConfig, TourStep};
use crate::workflow::{FlowSummary, Workflow};

pub mod archive;
pub mod assets;
pub mod manifest;

pub const CONFIG_FILE: &str = "tour.json";
pub const IMAGE_DIR: &str = "images/";

const CONTENT_JS: &str = include_str!("../../runtime/content.js");
const STYLES_CSS: &str = include_str!("../../runtime/styles.css");
const BACKGROUND_JS: &str = include_str!("../../runtime/background.js");
const BACKGROUND_AI_JS: &str = include_str!("../../runtime/background-ai.js");
const POPUP_JS: &str = include_str!("../../runtime/popup.js");

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AiFeatures {
    pub smart_highlighting: bool,
    pub contextual_help: bool,
    pub adaptive_guidance: bool,
    pub accessibility_support: bool,
}

impl AiFeatures {
    pub fn all() -> Self {
        Self {
            smart_highlighting: true,
            contextual_help: true,
            adaptive_guidance: true,
            accessibility_support: true,
        }
    }

    /// Parse a comma separated list such as `smart-highlighting,accessibility`.
    /// `all` turns everything on; an empty list selects the AI variant with no
    /// extras.
    pub fn parse_list(raw: &str) -> Result<Self> {
        let mut features = Self::default();
        for item in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            match item.to_ascii_lowercase().replace('_', "-").as_str() {
                "all" => features = Self::all(),
                "smart-highlighting" | "highlighting" => features.smart_highlighting = true,
                "contextual-help" | "help" => features.contextual_help = true,
                "adaptive-guidance" | "adaptive" => features.adaptive_guidance = true,
                "accessibility-support" | "accessibility" => features.accessibility_support = true,
                other => {
                    return Err(TourError::InvalidWorkflow(format!(
                        "unknown AI feature: {other}"
                    )))
                }
            }
        }
        Ok(features)
    }

    fn labels(&self) -> [(&'static str, bool); 4] {
        [
            ("Smart Element Highlighting", self.smart_highlighting),
            ("Contextual Help", self.contextual_help),
            ("Adaptive Guidance", self.adaptive_guidance),
            ("Accessibility Support", self.accessibility_support),
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    /// Scoped to the workflow's target origin, screenshots as packaged files.
    Basic,
    /// Runs on every page, ships a popup, screenshots inlined in `tour.json`.
    Ai(AiFeatures),
}

#[derive(Debug, Clone, Default)]
pub struct CompileOptions {
    pub ai: Option<AiFeatures>,
    pub flow_summary: Option<FlowSummary>,
    pub burn_annotations: bool,
}

impl CompileOptions {
    pub fn variant(&self) -> Variant {
        match self.ai {
            Some(features) => Variant::Ai(features),
            None => Variant::Basic,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BundleContent {
    Text(String),
    Binary(Vec<u8>),
}

impl BundleContent {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Text(text) => text.as_bytes(),
            Self::Binary(bytes) => bytes,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Binary(_) => None,
        }
    }

    pub fn is_binary(&self) -> bool {
        matches!(self, Self::Binary(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedBundle {
    pub workflow_name: String,
    pub variant: Variant,
    entries: BTreeMap<String, BundleContent>,
}

impl GeneratedBundle {
    pub fn entries(&self) -> impl Iterator<Item = (&str, &BundleContent)> {
        self.entries.iter().map(|(name, content)| (name.as_str(), content))
    }

    pub fn get(&self, name: &str) -> Option<&BundleContent> {
        self.entries.get(name)
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(BundleContent::as_text)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn image_assets(&self) -> impl Iterator<Item = &str> {
        self.entries
            .keys()
            .filter(|name| name.starts_with(IMAGE_DIR))
            .map(String::as_str)
    }
}

pub fn compile(workflow: &Workflow, options: &CompileOptions) -> Result<GeneratedBundle> {
    workflow.validate()?;
    let variant = options.variant();
    if variant == Variant::Basic && workflow.url_base().is_empty() {
        return Err(TourError::InvalidWorkflow(
            "targetUrl is required for a site-scoped extension".to_string(),
        ));
    }

    let mut entries = BTreeMap::new();
    let mut steps = Vec::with_capacity(workflow.steps.len());

    for (index, step) in workflow.steps.iter().enumerate() {
        let decoded = step.screenshot.as_deref().and_then(|data_url| {
            let decoded = assets::decode_data_url(data_url);
            if decoded.is_none() {
                warn!(step = index + 1, "unparseable screenshot, bundling step without image");
            }
            decoded
        });
        let (decoded, burned) = match decoded {
            Some(image) if options.burn_annotations && !step.annotations.is_empty() => {
                let composed = assets::burn_annotations(image.clone(), &step.annotations);
                let burned = composed != image;
                (Some(composed), burned)
            }
            other => (other, false),
        };

        let image = decoded.map(|image| match variant {
            Variant::Basic => {
                let path = assets::asset_path(index, &image.extension);
                entries.insert(path.clone(), BundleContent::Binary(image.bytes));
                path
            }
            Variant::Ai(_) if burned => assets::encode_data_url(&image),
            // Untouched payloads are inlined as written so the MIME type survives.
            Variant::Ai(_) => step.screenshot.as_deref().unwrap_or_default().trim().to_string(),
        });

        steps.push(TourStep {
            id: step.id.clone(),
            title: step.title.clone(),
            description: step.description.clone(),
            selector: step.selector.clone(),
            position: step.position,
            image,
        });
    }

    let has_image_assets = entries.keys().any(|name: &String| name.starts_with(IMAGE_DIR));

    let config = TourConfig {
        name: workflow.name.clone(),
        steps,
        settings: RuntimeSettings::default(),
        features: options.ai,
        flow_analysis: match variant {
            Variant::Ai(_) => options.flow_summary.clone(),
            Variant::Basic => None,
        },
    };

    let manifest = manifest::build(workflow, &variant, has_image_assets);
    let mut text = |name: &str, content: String| {
        entries.insert(name.to_string(), BundleContent::Text(content));
    };
    text("manifest.json", serde_json::to_string_pretty(&manifest)?);
    text(CONFIG_FILE, serde_json::to_string_pretty(&config)?);
    text("content.js", CONTENT_JS.to_string());
    text("styles.css", STYLES_CSS.to_string());
    match variant {
        Variant::Basic => text("background.js", BACKGROUND_JS.to_string()),
        Variant::Ai(features) => {
            let background = if features.contextual_help {
                BACKGROUND_AI_JS
            } else {
                BACKGROUND_JS
            };
            text("background.js", background.to_string());
            text("popup.html", popup_html(workflow, &features));
            text("popup.js", POPUP_JS.to_string());
        }
    }

    debug!(
        workflow = %workflow.name,
        entries = entries.len(),
        steps = workflow.steps.len(),
        "compiled bundle"
    );

    Ok(GeneratedBundle {
        workflow_name: workflow.name.clone(),
        variant,
        entries,
    })
}

fn popup_html(workflow: &Workflow, features: &AiFeatures) -> String {
    let items: String = features
        .labels()
        .iter()
        .map(|(label, on)| {
            let (class, mark) = if *on {
                ("feature-enabled", "&#10003;")
            } else {
                ("feature-disabled", "&#9675;")
            };
            format!("    <li class=\"{class}\">{mark} {label}</li>\n")
        })
        .collect();

    format!(
        r#"<!DOCTYPE html>
<html>
<head>
  <meta charset="utf-8">
  <title>{title}</title>
  <style>
    body {{ width: 300px; padding: 16px; margin: 0; font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; }}
    .header {{ display: flex; align-items: center; justify-content: space-between; margin-bottom: 12px; }}
    .header h2 {{ margin: 0; font-size: 16px; }}
    .ai-badge {{ background: linear-gradient(45deg, #667eea 0%, #764ba2 100%); color: white; padding: 2px 8px; border-radius: 12px; font-size: 11px; }}
    .feature-list {{ list-style: none; padding: 0; margin: 0 0 16px 0; }}
    .feature-list li {{ padding: 4px 0; font-size: 14px; }}
    .feature-enabled {{ color: #10b981; }}
    .feature-disabled {{ color: #6b7280; }}
    .start-button {{ width: 100%; padding: 12px; background: linear-gradient(45deg, #667eea 0%, #764ba2 100%); color: white; border: none; border-radius: 8px; font-weight: 500; cursor: pointer; }}
    .start-button:hover {{ opacity: 0.9; }}
  </style>
</head>
<body>
  <div class="header">
    <h2>{title}</h2>
    <span class="ai-badge">AI-Powered</span>
  </div>
  <p>{description}</p>
  <h3>AI Features</h3>
  <ul class="feature-list">
{items}  </ul>
  <button class="start-button" id="start-workflow">Start Guided Workflow</button>
  <button class="start-button" id="reset-workflow" style="margin-top: 8px; background: #6b7280;">Restart From Beginning</button>
  <script src="popup.js"></script>
</body>
</html>
"#,
        title = escape_html(&workflow.name),
        description = escape_html(&workflow.description),
    )
}

fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}
