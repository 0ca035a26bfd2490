use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{ArgAction, Args, Parser, Subcommand};
use rand::Rng;
use serde_json::{json, Value};
use std::env;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use tourkit::annotation::render;
use tourkit::bundle::archive::{self, archive_file_name};
use tourkit::bundle::{assets, compile, AiFeatures, CompileOptions, CONFIG_FILE};
use tourkit::runtime::simulate::{self, PlayAction, StaticPage};
use tourkit::runtime::TourConfig;
use tourkit::workflow::{FlowSummary, Workflow};

#[derive(Parser, Debug)]
#[command(
    name = "tourkit",
    version,
    about = "Compile annotated UI walkthroughs into guided-tour browser extensions"
)]
struct Cli {
    /// Log debug output to stderr (RUST_LOG overrides)
    #[arg(short, long, global = true, action = ArgAction::SetTrue)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print supported commands in JSON
    Commands,
    /// Compile a workflow JSON file into an extension archive
    Compile(CompileArgs),
    /// List the files a compile would produce, without writing anything
    Files(FilesArgs),
    /// Render one step's screenshot with its annotations drawn on top
    Render(RenderArgs),
    /// Play the compiled tour against a recorded page layout
    Play(PlayArgs),
}

#[derive(Args, Debug, Default)]
struct VariantArgs {
    /// Build the AI variant; comma separated features or "all"
    /// (smart-highlighting, contextual-help, adaptive-guidance, accessibility-support)
    #[arg(long, num_args = 0..=1, default_missing_value = "")]
    ai: Option<String>,
    /// Page-flow analysis JSON embedded into AI bundles
    #[arg(long)]
    flow_summary: Option<PathBuf>,
    /// Paint annotations into the packaged screenshots
    #[arg(long, action = ArgAction::SetTrue)]
    burn_annotations: bool,
}

#[derive(Args, Debug)]
struct CompileArgs {
    /// Workflow JSON file path (or - for stdin)
    workflow: String,
    /// Output archive path (default: $TOURKIT_OUT_DIR/<name>_extension.zip)
    #[arg(long)]
    out: Option<PathBuf>,
    /// Also write the bundle as an unpacked extension directory
    #[arg(long)]
    unpacked: Option<PathBuf>,
    #[command(flatten)]
    variant: VariantArgs,
    /// Print a JSON summary instead of the archive path
    #[arg(long, action = ArgAction::SetTrue)]
    json: bool,
}

#[derive(Args, Debug)]
struct FilesArgs {
    /// Workflow JSON file path (or - for stdin)
    workflow: String,
    #[command(flatten)]
    variant: VariantArgs,
}

#[derive(Args, Debug)]
struct RenderArgs {
    /// Workflow JSON file path (or - for stdin)
    workflow: String,
    /// 1-based step number
    #[arg(long)]
    step: usize,
    /// Output PNG path (default: $TOURKIT_OUT_DIR/renders/...)
    output: Option<PathBuf>,
    /// Disable metadata sidecar output
    #[arg(long, action = ArgAction::SetTrue)]
    no_meta: bool,
}

#[derive(Args, Debug)]
struct PlayArgs {
    /// Workflow JSON file path (or - for stdin)
    workflow: String,
    /// Page layout JSON (viewport, scroll, body, elements, appearsAfterMs)
    #[arg(long)]
    page: PathBuf,
    /// Comma separated actions: next, previous, close, start, reset, key:Alt+<Key>
    #[arg(long, value_delimiter = ',')]
    actions: Vec<String>,
    /// Start with the completion flag already stored
    #[arg(long, action = ArgAction::SetTrue)]
    completed: bool,
    /// Play the AI variant's config (enables keyboard navigation etc.)
    #[arg(long, num_args = 0..=1, default_missing_value = "")]
    ai: Option<String>,
}

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Commands => print_commands(),
        Commands::Compile(args) => command_compile(args),
        Commands::Files(args) => command_files(args),
        Commands::Render(args) => command_render(args),
        Commands::Play(args) => command_play(args),
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    // stdout carries JSON results, so logs stay on stderr.
    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(false).with_writer(io::stderr))
        .try_init();
}

fn print_commands() -> Result<()> {
    let rows = vec![
        json!({
            "name": "compile",
            "description": "Compile a workflow into a guided-tour extension archive."
        }),
        json!({
            "name": "files",
            "description": "List bundle entries and sizes without writing them."
        }),
        json!({
            "name": "render",
            "description": "Render a step screenshot with annotations + metadata sidecar."
        }),
        json!({
            "name": "play",
            "description": "Simulate the runtime guide against a recorded page layout."
        }),
    ];

    println!(
        "{}",
        serde_json::to_string_pretty(&json!({ "commands": rows }))?
    );
    Ok(())
}

fn command_compile(args: CompileArgs) -> Result<()> {
    let workflow = load_workflow(&args.workflow)?;
    let options = compile_options(&args.variant)?;
    let bundle = compile(&workflow, &options)
        .with_context(|| format!("failed to compile workflow: {}", workflow.name))?;
    let packaged = archive::package(&bundle).context("failed to package extension archive")?;

    let out = args
        .out
        .clone()
        .unwrap_or_else(|| out_root().join(&packaged.file_name));
    ensure_parent_dir(&out)?;
    fs::write(&out, &packaged.bytes)
        .with_context(|| format!("failed to write archive: {}", out.display()))?;
    info!(path = %out.display(), bytes = packaged.bytes.len(), "wrote extension archive");

    let unpacked = match &args.unpacked {
        Some(dir) => {
            fs::create_dir_all(dir)
                .with_context(|| format!("failed to create directory: {}", dir.display()))?;
            let written = archive::write_unpacked(&bundle, dir)
                .with_context(|| format!("failed to write unpacked bundle: {}", dir.display()))?;
            Some((abs_path(dir), written.len()))
        }
        None => None,
    };

    if args.json {
        let variant = if options.ai.is_some() { "ai" } else { "basic" };
        let payload = json!({
            "workflow": workflow.name,
            "variant": variant,
            "archive_path": abs_path(&out).display().to_string(),
            "archive_bytes": packaged.bytes.len(),
            "entries": bundle.entries().map(|(name, _)| name).collect::<Vec<_>>(),
            "image_assets": bundle.image_assets().count(),
            "unpacked_dir": unpacked.as_ref().map(|(dir, _)| dir.display().to_string()),
            "unpacked_files": unpacked.as_ref().map(|(_, count)| *count),
            "generated_at": timestamp_iso(),
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        println!("{}", abs_path(&out).display());
    }
    Ok(())
}

fn command_files(args: FilesArgs) -> Result<()> {
    let workflow = load_workflow(&args.workflow)?;
    let options = compile_options(&args.variant)?;
    let bundle = compile(&workflow, &options)?;

    let rows: Vec<Value> = bundle
        .entries()
        .map(|(name, content)| {
            json!({
                "name": name,
                "bytes": content.as_bytes().len(),
                "binary": content.is_binary(),
            })
        })
        .collect();

    let payload = json!({
        "archive_name": archive_file_name(&workflow.name, &bundle.variant),
        "files": rows,
    });
    println!("{}", serde_json::to_string_pretty(&payload)?);
    Ok(())
}

fn command_render(args: RenderArgs) -> Result<()> {
    let workflow = load_workflow(&args.workflow)?;
    if args.step == 0 || args.step > workflow.steps.len() {
        bail!(
            "step {} out of range (workflow has {} steps)",
            args.step,
            workflow.steps.len()
        );
    }
    let step = &workflow.steps[args.step - 1];
    let Some(data_url) = step.screenshot.as_deref() else {
        bail!("step {} has no screenshot", args.step);
    };
    let Some(decoded) = assets::decode_data_url(data_url) else {
        bail!("step {} screenshot is not a base64 data URL", args.step);
    };
    let Some(rendered) = render::compose(&decoded.bytes, &step.annotations) else {
        bail!("step {} screenshot could not be decoded as an image", args.step);
    };
    let (img_w, img_h) = rendered.dimensions();

    let output = args.output.clone().unwrap_or_else(|| {
        let suffix = rand::thread_rng().gen_range(1000..9999);
        out_root().join("renders").join(format!(
            "{}-step{}-{}-{suffix}.png",
            slugify(&workflow.name),
            args.step,
            timestamp_compact()
        ))
    });
    ensure_parent_dir(&output)?;
    let png = render::encode_png(&rendered)?;
    fs::write(&output, png)
        .with_context(|| format!("failed to save output image: {}", output.display()))?;

    if !args.no_meta {
        let meta_path = default_sidecar_for(&output);
        let annotations: Vec<Value> = step
            .annotations
            .iter()
            .enumerate()
            .map(|(index, ann)| {
                let b = ann.bounds();
                json!({
                    "index": index,
                    "id": ann.id,
                    "type": ann.kind(),
                    "color": ann.color,
                    "bounds": {"x": b.x, "y": b.y, "width": b.width, "height": b.height},
                    "bounds_rel": {
                        "x": round_to(b.x / img_w as f64, 4),
                        "y": round_to(b.y / img_h as f64, 4),
                        "width": round_to(b.width / img_w as f64, 4),
                        "height": round_to(b.height / img_h as f64, 4),
                    },
                })
            })
            .collect();

        let payload = json!({
            "render_meta_version": 1,
            "workflow": workflow.name,
            "step": {"number": args.step, "id": step.id, "title": step.title},
            "output_path": abs_path(&output).display().to_string(),
            "meta_path": abs_path(&meta_path).display().to_string(),
            "generated_at": timestamp_iso(),
            "size": {"width": img_w, "height": img_h, "units": "px"},
            "annotations": annotations,
        });
        write_json_pretty(&meta_path, &payload)?;
    }

    println!("{}", abs_path(&output).display());
    Ok(())
}

fn command_play(args: PlayArgs) -> Result<()> {
    let workflow = load_workflow(&args.workflow)?;
    let options = CompileOptions {
        ai: parse_ai(args.ai.as_deref())?,
        ..CompileOptions::default()
    };
    let bundle = compile(&workflow, &options)?;
    // Play exactly what the extension would load.
    let raw = bundle
        .text(CONFIG_FILE)
        .with_context(|| format!("bundle has no {CONFIG_FILE}"))?;
    let config = TourConfig::from_json(raw)?;

    let page_raw = fs::read_to_string(&args.page)
        .with_context(|| format!("failed to read page layout: {}", args.page.display()))?;
    let page = StaticPage::from_json(&page_raw)
        .with_context(|| format!("invalid page layout JSON: {}", args.page.display()))?;

    let actions = args
        .actions
        .iter()
        .filter(|a| !a.trim().is_empty())
        .map(|a| a.parse::<PlayAction>())
        .collect::<tourkit::Result<Vec<_>>>()?;
    debug!(actions = actions.len(), "playing tour");

    let report = simulate::play(config, page, &actions, args.completed);
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn compile_options(args: &VariantArgs) -> Result<CompileOptions> {
    let ai = parse_ai(args.ai.as_deref())?;
    let flow_summary = match &args.flow_summary {
        Some(path) => {
            if ai.is_none() {
                bail!("--flow-summary requires --ai");
            }
            Some(load_flow_summary(path)?)
        }
        None => None,
    };
    Ok(CompileOptions {
        ai,
        flow_summary,
        burn_annotations: args.burn_annotations,
    })
}

fn parse_ai(raw: Option<&str>) -> Result<Option<AiFeatures>> {
    raw.map(AiFeatures::parse_list)
        .transpose()
        .context("invalid --ai feature list")
}

fn load_workflow(path: &str) -> Result<Workflow> {
    let raw = if path == "-" {
        let mut buf = String::new();
        io::stdin()
            .read_to_string(&mut buf)
            .context("failed to read workflow from stdin")?;
        buf
    } else {
        fs::read_to_string(path).with_context(|| format!("failed to read workflow file: {path}"))?
    };
    Workflow::from_json(&raw).context("invalid workflow JSON")
}

fn load_flow_summary(path: &Path) -> Result<FlowSummary> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read flow summary: {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("invalid flow summary JSON: {}", path.display()))
}

fn write_json_pretty(path: &Path, value: &Value) -> Result<()> {
    ensure_parent_dir(path)?;
    let raw = serde_json::to_string_pretty(value)?;
    fs::write(path, raw).with_context(|| format!("failed to write JSON: {}", path.display()))?;
    Ok(())
}

fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed to create parent directory: {}", parent.display())
            })?;
        }
    }
    Ok(())
}

fn default_sidecar_for(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("output")
        .to_string();
    let parent = path.parent().unwrap_or_else(|| Path::new(""));
    parent.join(format!("{stem}.json"))
}

fn out_root() -> PathBuf {
    env::var("TOURKIT_OUT_DIR")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(".tourkit"))
}

fn abs_path(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join(path)
}

fn slugify(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        let lower = ch.to_ascii_lowercase();
        if lower.is_ascii_alphanumeric() || matches!(lower, '.' | '_' | '-') {
            out.push(lower);
        } else if lower.is_ascii_whitespace() {
            out.push('-');
        }
    }
    if out.is_empty() {
        "tour".to_string()
    } else {
        out
    }
}

fn timestamp_compact() -> String {
    Utc::now().format("%Y%m%d-%H%M%S").to_string()
}

fn timestamp_iso() -> String {
    Utc::now().to_rfc3339()
}

fn round_to(v: f64, digits: u32) -> f64 {
    let factor = 10f64.powi(digits as i32);
    (v * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const WORKFLOW: &str = r##"{
        "id": "wf",
        "name": "Billing Tour",
        "targetUrl": "https://billing.example.com/",
        "steps": [
            {"id": "s1", "title": "Open invoices", "selector": "#invoices",
             "screenshot": "data:image/png;base64,aGVsbG8="},
            {"id": "s2", "title": "Pay", "selector": "#pay", "position": "top"}
        ]
    }"##;

    fn write_workflow(dir: &Path) -> String {
        let path = dir.join("wf.json");
        fs::write(&path, WORKFLOW).unwrap();
        path.display().to_string()
    }

    #[test]
    fn writes_json_pretty() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("a").join("b.json");
        write_json_pretty(&target, &json!({"ok": true})).unwrap();
        assert!(target.exists());
    }

    #[test]
    fn sidecar_sits_next_to_output() {
        assert_eq!(
            default_sidecar_for(Path::new("out/step-1.png")),
            PathBuf::from("out/step-1.json")
        );
    }

    #[test]
    fn slugify_keeps_safe_characters() {
        assert_eq!(slugify("Billing Tour"), "billing-tour");
        assert_eq!(slugify("!!!"), "tour");
    }

    #[test]
    fn loads_workflow_from_file() {
        let dir = tempdir().unwrap();
        let wf = load_workflow(&write_workflow(dir.path())).unwrap();
        assert_eq!(wf.steps.len(), 2);
        assert!(load_workflow(&dir.path().join("missing.json").display().to_string()).is_err());
    }

    #[test]
    fn ai_flag_accepts_bare_and_listed_features() {
        assert_eq!(parse_ai(None).unwrap(), None);
        assert_eq!(parse_ai(Some("")).unwrap(), Some(AiFeatures::default()));
        assert_eq!(parse_ai(Some("all")).unwrap(), Some(AiFeatures::all()));
        assert!(parse_ai(Some("mind-reading")).is_err());
    }

    #[test]
    fn flow_summary_requires_ai_variant() {
        let dir = tempdir().unwrap();
        let summary = dir.path().join("flow.json");
        fs::write(&summary, "{}").unwrap();
        let args = VariantArgs {
            flow_summary: Some(summary.clone()),
            ..VariantArgs::default()
        };
        assert!(compile_options(&args).is_err());

        let args = VariantArgs {
            ai: Some(String::new()),
            flow_summary: Some(summary),
            burn_annotations: false,
        };
        let options = compile_options(&args).unwrap();
        assert!(options.flow_summary.is_some());
    }

    #[test]
    fn compile_command_writes_archive_and_unpacked_dir() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("dist").join("tour.zip");
        let unpacked = dir.path().join("unpacked");
        command_compile(CompileArgs {
            workflow: write_workflow(dir.path()),
            out: Some(out.clone()),
            unpacked: Some(unpacked.clone()),
            variant: VariantArgs::default(),
            json: true,
        })
        .unwrap();

        assert!(out.is_file());
        assert!(unpacked.join("manifest.json").is_file());
        assert!(unpacked.join("images/step-1-screenshot.png").is_file());
        let manifest = fs::read_to_string(unpacked.join("manifest.json")).unwrap();
        assert!(manifest.contains("https://billing.example.com/*"));
    }
}
