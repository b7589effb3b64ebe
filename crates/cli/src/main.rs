use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{anyhow, Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use drydock_core::{Json, ResourceKey, ResourceStatus, Settings, TrackingMethod};
use drydock_diff::{state_diffs, DiffConfigBuilder};
use drydock_health::{HealthAssessor, HealthRegistry};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

#[derive(Parser, Debug)]
#[command(name = "drydockctl", version, about = "Drydock reconciliation state engine CLI")]
struct Cli {
    /// Output format
    #[arg(short = 'o', long = "output", value_enum, global = true, default_value_t = Output::Human)]
    output: Output,

    /// Tracking label key (default: DRYDOCK_APP_LABEL_KEY or app.kubernetes.io/instance)
    #[arg(long = "label-key", global = true)]
    label_key: Option<String>,

    /// Tracking method: label, annotation or annotation+label (default: DRYDOCK_TRACKING_METHOD)
    #[arg(long = "tracking-method", global = true)]
    tracking_method: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Output { Human, Json }

#[derive(Subcommand, Debug)]
enum Commands {
    /// Compare live objects against desired manifests
    Diff {
        /// YAML file with the live objects
        #[arg(long)]
        live: PathBuf,
        /// YAML file with the desired objects
        #[arg(long)]
        target: PathBuf,
        /// Settings ConfigMap (or plain string map) with resource.customizations and compare options
        #[arg(long)]
        settings: Option<PathBuf>,
        /// YAML list of application ignoreDifferences rules
        #[arg(long)]
        ignore: Option<PathBuf>,
        /// Application name, used in log context
        #[arg(long, default_value = "")]
        app: String,
        /// Exit with status 1 when anything is out of sync
        #[arg(long = "exit-code", action = ArgAction::SetTrue)]
        exit_code: bool,
    },
    /// Assess per-resource and aggregate health
    Health {
        /// YAML files with live objects
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Settings ConfigMap with health script customizations
        #[arg(long)]
        settings: Option<PathBuf>,
    },
    /// Read or stamp application ownership
    Tracking {
        #[command(subcommand)]
        command: TrackingCommand,
    },
}

#[derive(Subcommand, Debug)]
enum TrackingCommand {
    /// Print the owning application of each object
    Get { file: PathBuf },
    /// Stamp objects as owned by an application and print them
    Set {
        file: PathBuf,
        #[arg(long)]
        app: String,
    },
}

fn init_tracing() {
    let env = std::env::var("DRYDOCK_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).with_writer(std::io::stderr).init();
}

fn init_metrics() {
    if let Ok(addr) = std::env::var("DRYDOCK_METRICS_ADDR") {
        if let Ok(sock) = addr.parse::<std::net::SocketAddr>() {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            match builder.with_http_listener(sock).install() {
                Ok(_) => tracing::info!(addr = %addr, "Prometheus metrics exporter listening"),
                Err(e) => tracing::warn!(error = %e, "failed to install metrics exporter"),
            }
        } else {
            tracing::warn!(addr = %addr, "invalid DRYDOCK_METRICS_ADDR; expected host:port");
        }
    }
}

/// All documents of a multi-document YAML file. `*List` kinds are flattened into their items.
fn load_docs(path: &Path) -> Result<Vec<Json>> {
    let text = std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let mut out = Vec::new();
    for de in serde_yaml::Deserializer::from_str(&text) {
        let doc = Json::deserialize(de).with_context(|| format!("parse {}", path.display()))?;
        match doc {
            Json::Null => {}
            Json::Object(ref m) if drydock_core::doc::kind(&doc).ends_with("List") && m.contains_key("items") => {
                out.extend(m.get("items").and_then(|i| i.as_array()).cloned().unwrap_or_default());
            }
            other => out.push(other),
        }
    }
    debug!(path = %path.display(), docs = out.len(), "loaded manifests");
    Ok(out)
}

/// Settings come either as a ConfigMap (its `data`) or as a plain string map.
fn load_settings_data(path: &Path) -> Result<BTreeMap<String, String>> {
    let docs = load_docs(path)?;
    let first = docs.into_iter().next().ok_or_else(|| anyhow!("{} is empty", path.display()))?;
    let data = if drydock_core::doc::kind(&first) == "ConfigMap" { first.get("data").cloned().unwrap_or(Json::Null) } else { first };
    if data.is_null() {
        return Ok(BTreeMap::new());
    }
    serde_json::from_value(data).with_context(|| format!("{}: settings must map strings to strings", path.display()))
}

fn settings(cli: &Cli) -> Result<Settings> {
    let mut s = Settings::from_env();
    if let Some(k) = &cli.label_key { s.app_label_key = k.clone(); }
    if let Some(m) = &cli.tracking_method { s.tracking_method = m.parse::<TrackingMethod>()?; }
    Ok(s)
}

#[derive(Serialize)]
struct DiffRow {
    resource: String,
    modified: bool,
    patch: Json,
}

#[derive(Serialize)]
struct HealthRow {
    resource: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    health: Option<drydock_core::HealthStatus>,
}

fn run_diff(cli: &Cli, live: &Path, target: &Path, settings_path: Option<&Path>, ignore: Option<&Path>, app: &str) -> Result<bool> {
    let mut settings = settings(cli)?;
    let data = settings_path.map(load_settings_data).transpose()?.unwrap_or_default();
    settings = settings.with_compare_options(&data)?;
    let overrides = drydock_core::settings::resource_overrides_from_config(&data, settings.ignore_resource_status_field)?;
    let ignores = match ignore {
        Some(p) => {
            let text = std::fs::read_to_string(p).with_context(|| format!("read {}", p.display()))?;
            serde_yaml::from_str(&text).with_context(|| format!("parse {}", p.display()))?
        }
        None => Vec::new(),
    };

    let mut pairs: BTreeMap<ResourceKey, (Option<Json>, Option<Json>)> = BTreeMap::new();
    for doc in load_docs(live)? {
        let key = ResourceKey::from_doc(&doc);
        pairs.entry(key).or_default().0 = Some(doc);
    }
    for doc in load_docs(target)? {
        let key = ResourceKey::from_doc(&doc);
        pairs.entry(key).or_default().1 = Some(doc);
    }
    let keys: Vec<ResourceKey> = pairs.keys().cloned().collect();
    let (lives, targets): (Vec<_>, Vec<_>) = pairs.into_values().unzip();

    let span = tracing::info_span!("diff", app = %app);
    let config = DiffConfigBuilder::new()
        .with_diff_settings(ignores, overrides, settings.ignore_aggregated_roles)
        .with_tracking(&settings.app_label_key, settings.tracking_method)
        .with_no_cache()
        .with_span(span)
        .build()?;
    let res = state_diffs(&lives, &targets, &config)?;
    info!(resources = keys.len(), modified = res.modified, "diff complete");

    let mut rows = Vec::with_capacity(keys.len());
    for (key, d) in keys.iter().zip(&res.diffs) {
        let before: Json = serde_json::from_slice(&d.normalized_live)?;
        let after: Json = serde_json::from_slice(&d.predicted_live)?;
        let patch = serde_json::to_value(json_patch::diff(&before, &after))?;
        rows.push(DiffRow { resource: key.to_string(), modified: d.modified, patch });
    }

    match cli.output {
        Output::Human => {
            for r in &rows {
                println!("{:<10} {}", if r.modified { "OutOfSync" } else { "Synced" }, r.resource);
                for op in r.patch.as_array().into_iter().flatten() {
                    let kind = op.get("op").and_then(|v| v.as_str()).unwrap_or("?");
                    let path = op.get("path").and_then(|v| v.as_str()).unwrap_or("");
                    match op.get("value") {
                        Some(v) => println!("    {kind} {path} = {v}"),
                        None => println!("    {kind} {path}"),
                    }
                }
            }
        }
        Output::Json => println!("{}", serde_json::to_string_pretty(&rows)?),
    }
    Ok(res.modified)
}

fn run_health(cli: &Cli, files: &[PathBuf], settings_path: Option<&Path>) -> Result<()> {
    let data = settings_path.map(load_settings_data).transpose()?.unwrap_or_default();
    let settings = settings(cli)?.with_compare_options(&data)?;
    let overrides = drydock_core::settings::resource_overrides_from_config(&data, settings.ignore_resource_status_field)?;
    let assessor = HealthAssessor::new(HealthRegistry::builtin(), overrides);

    let mut lives = Vec::new();
    for f in files {
        lives.extend(load_docs(f)?.into_iter().map(Some));
    }
    let mut statuses: Vec<ResourceStatus> = lives
        .iter()
        .flatten()
        .map(|doc| {
            let key = ResourceKey::from_doc(doc);
            ResourceStatus {
                group: key.group,
                version: drydock_core::doc::split_api_version(drydock_core::doc::api_version(doc)).1.to_string(),
                kind: key.kind,
                namespace: key.namespace,
                name: key.name,
                hook: drydock_core::doc::is_hook(doc),
                health: None,
            }
        })
        .collect();
    let app = assessor.set_application_health(&mut statuses, &lives)?;

    match cli.output {
        Output::Human => {
            for s in &statuses {
                let key = ResourceKey::new(&s.group, &s.kind, &s.namespace, &s.name);
                match &s.health {
                    Some(h) => println!("{:<12} {key} {}", h.status, h.message),
                    None => println!("{:<12} {key}", "-"),
                }
            }
            println!("{:<12} application {}", app.status, app.message);
        }
        Output::Json => {
            let rows: Vec<HealthRow> = statuses
                .iter()
                .map(|s| HealthRow {
                    resource: ResourceKey::new(&s.group, &s.kind, &s.namespace, &s.name).to_string(),
                    health: s.health.clone(),
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&serde_json::json!({"resources": rows, "application": app}))?);
        }
    }
    Ok(())
}

fn run_tracking(cli: &Cli, command: &TrackingCommand) -> Result<()> {
    let settings = settings(cli)?;
    match command {
        TrackingCommand::Get { file } => {
            for doc in load_docs(file)? {
                let key = ResourceKey::from_doc(&doc);
                let app = drydock_tracking::get_app_name(&doc, &settings.app_label_key, settings.tracking_method);
                let value = drydock_tracking::get_app_instance_value(&doc, &settings.app_label_key, settings.tracking_method);
                match cli.output {
                    Output::Human => println!("{key} {}", if app.is_empty() { "-" } else { app.as_str() }),
                    Output::Json => println!(
                        "{}",
                        serde_json::json!({"resource": key.to_string(), "app": app, "instance": value.map(|v| v.to_string())})
                    ),
                }
            }
        }
        TrackingCommand::Set { file, app } => {
            let mut docs = load_docs(file)?;
            for doc in docs.iter_mut() {
                drydock_tracking::set_app_instance(doc, &settings.app_label_key, app, None, settings.tracking_method)?;
            }
            match cli.output {
                Output::Human => {
                    for doc in &docs {
                        print!("---\n{}", serde_yaml::to_string(doc)?);
                    }
                }
                Output::Json => println!("{}", serde_json::to_string_pretty(&docs)?),
            }
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    init_tracing();
    init_metrics();
    let cli = Cli::parse();

    match &cli.command {
        Commands::Diff { live, target, settings, ignore, app, exit_code } => {
            let modified = run_diff(&cli, live, target, settings.as_deref(), ignore.as_deref(), app)?;
            if modified && *exit_code {
                std::process::exit(1);
            }
        }
        Commands::Health { files, settings } => run_health(&cli, files, settings.as_deref())?,
        Commands::Tracking { command } => run_tracking(&cli, command)?,
    }
    Ok(())
}
