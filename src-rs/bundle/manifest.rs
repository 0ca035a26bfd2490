use serde::Serialize;

use super::{Variant, CONFIG_FILE};
use crate::workflow::Workflow;

pub const ALL_URLS: &str = "<all_urls>";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Manifest {
    pub manifest_version: u8,
    pub name: String,
    pub description: String,
    pub version: String,
    pub permissions: Vec<String>,
    pub host_permissions: Vec<String>,
    pub content_scripts: Vec<ContentScript>,
    pub background: Background,
    pub action: Action,
    pub web_accessible_resources: Vec<WebAccessibleResources>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContentScript {
    pub matches: Vec<String>,
    pub js: Vec<String>,
    pub css: Vec<String>,
    pub run_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Background {
    pub service_worker: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Action {
    pub default_title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_popup: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WebAccessibleResources {
    pub resources: Vec<String>,
    pub matches: Vec<String>,
}

/// Host pattern the extension is scoped to.
pub fn match_pattern(workflow: &Workflow, variant: &Variant) -> String {
    match variant {
        Variant::Basic => format!("{}/*", workflow.url_base()),
        Variant::Ai(_) => ALL_URLS.to_string(),
    }
}

pub fn build(workflow: &Workflow, variant: &Variant, has_image_assets: bool) -> Manifest {
    let pattern = match_pattern(workflow, variant);

    let mut permissions = vec!["activeTab".to_string(), "storage".to_string()];
    let (run_at, default_popup) = match variant {
        Variant::Basic => ("document_idle", None),
        Variant::Ai(features) => {
            permissions.push("scripting".to_string());
            if features.contextual_help {
                permissions.push("contextMenus".to_string());
            }
            ("document_end", Some("popup.html".to_string()))
        }
    };

    let mut resources = vec![CONFIG_FILE.to_string()];
    if has_image_assets {
        resources.push("images/*".to_string());
    }

    Manifest {
        manifest_version: 3,
        name: workflow.name.clone(),
        description: workflow.description.clone(),
        version: "1.0.0".to_string(),
        permissions,
        host_permissions: vec![pattern.clone()],
        content_scripts: vec![ContentScript {
            matches: vec![pattern.clone()],
            js: vec!["content.js".to_string()],
            css: vec!["styles.css".to_string()],
            run_at: run_at.to_string(),
        }],
        background: Background {
            service_worker: "background.js".to_string(),
        },
        action: Action {
            default_title: workflow.name.clone(),
            default_popup,
        },
        web_accessible_resources: vec![WebAccessibleResources {
            resources,
            matches: vec![pattern],
        }],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::AiFeatures;
    use crate::workflow::fixtures::workflow;

    #[test]
    fn basic_manifest_is_scoped_to_the_target_origin() {
        let mut wf = workflow(Vec::new());
        wf.target_url = "https://app.example.com/".to_string();
        let m = build(&wf, &Variant::Basic, false);
        assert_eq!(m.permissions, ["activeTab", "storage"]);
        assert_eq!(m.host_permissions, ["https://app.example.com/*"]);
        assert_eq!(m.content_scripts[0].matches, ["https://app.example.com/*"]);
        assert_eq!(m.content_scripts[0].run_at, "document_idle");
        assert_eq!(m.action.default_popup, None);
        assert_eq!(m.web_accessible_resources[0].resources, ["tour.json"]);
    }

    #[test]
    fn ai_manifest_covers_all_urls_with_popup() {
        let wf = workflow(Vec::new());
        let features = AiFeatures {
            contextual_help: true,
            ..AiFeatures::default()
        };
        let m = build(&wf, &Variant::Ai(features), false);
        assert_eq!(m.permissions, ["activeTab", "storage", "scripting", "contextMenus"]);
        assert_eq!(m.host_permissions, [ALL_URLS]);
        assert_eq!(m.content_scripts[0].run_at, "document_end");
        assert_eq!(m.action.default_popup.as_deref(), Some("popup.html"));

        let m = build(&wf, &Variant::Ai(AiFeatures::default()), false);
        assert!(!m.permissions.iter().any(|p| p == "contextMenus"));
    }

    #[test]
    fn image_glob_is_listed_only_with_assets() {
        let wf = workflow(Vec::new());
        let m = build(&wf, &Variant::Basic, true);
        assert_eq!(m.web_accessible_resources[0].resources, ["tour.json", "images/*"]);
        let json = serde_json::to_value(&m).unwrap();
        assert!(json["action"].get("default_popup").is_none());
        assert_eq!(json["background"]["service_worker"], "background.js");
    }
}
