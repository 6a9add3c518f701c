use anyhow::{anyhow, bail, Context};
use clap::{Args, Parser, Subcommand, ValueEnum};
use mdcompare_common::{
    ensure_config, load_config, load_config_from, save_config, AppConfig, CompareResult,
    CompareSummary, DiffAlgorithm, Record, RecordKind,
};
use mdcompare_core::{compare_org_kind, DetailFetcher, FetcherConfig, OrgConnection, ReconcileEngine};
use serde::Serialize;
use std::collections::HashMap;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mdcompare")]
#[command(author = "MdCompare Contributors")]
#[command(version = "0.1.0")]
#[command(about = "Compare configuration metadata between two orgs", long_about = None)]
struct Cli {
    /// Configuration file (defaults to the per-user mdcompare.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch records from two orgs and compare them
    Compare {
        /// Source org profile name or instance URL
        #[arg(long)]
        source: String,

        /// Target org profile name or instance URL
        #[arg(long)]
        target: String,

        /// Access token for the source org
        #[arg(long, env = "MDCOMPARE_SOURCE_TOKEN", hide_env_values = true)]
        source_token: Option<String>,

        /// Access token for the target org
        #[arg(long, env = "MDCOMPARE_TARGET_TOKEN", hide_env_values = true)]
        target_token: Option<String>,

        /// Record types to compare (defaults to the configured types)
        #[arg(short = 't', long = "type")]
        types: Vec<String>,

        /// JSON file mapping each type to the source record ids
        #[arg(long)]
        source_ids: Option<PathBuf>,

        /// JSON file mapping each type to the target record ids
        #[arg(long)]
        target_ids: Option<PathBuf>,

        #[command(flatten)]
        output: OutputArgs,
    },
    /// Compare two local record dumps (JSON arrays of records)
    Diff {
        /// Record type of both dumps
        #[arg(short = 't', long = "type")]
        kind: String,

        /// Source records file
        source: PathBuf,

        /// Target records file
        target: PathBuf,

        #[command(flatten)]
        output: OutputArgs,
    },
    /// List the configured record types
    Types,
    /// Write a default configuration file if none exists
    Init {
        /// Place the configuration next to the executable
        #[arg(long)]
        portable: bool,
    },
}

#[derive(Args, Clone)]
struct OutputArgs {
    /// Show only differences (hide unchanged records)
    #[arg(short = 'd', long)]
    diff_only: bool,

    /// Output results as JSON
    #[arg(long)]
    json: bool,

    /// Disable ANSI colors in output
    #[arg(long)]
    no_color: bool,

    /// Line diff algorithm (overrides the configuration)
    #[arg(long, value_enum)]
    algorithm: Option<AlgorithmArg>,
}

#[derive(Clone, Copy, ValueEnum)]
enum AlgorithmArg {
    Positional,
    Aligned,
}

impl From<AlgorithmArg> for DiffAlgorithm {
    fn from(arg: AlgorithmArg) -> Self {
        match arg {
            AlgorithmArg::Positional => DiffAlgorithm::Positional,
            AlgorithmArg::Aligned => DiffAlgorithm::Aligned,
        }
    }
}

fn main() {
    // Initialize tracing to stderr (so JSON output can go cleanly to stdout)
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let outcome = run_command(cli.config.as_deref(), cli.command);

    if let Err(e) = outcome {
        error!("Command failed: {:#}", e);
        std::process::exit(1);
    }
}

fn run_command(config_path: Option<&Path>, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Compare {
            source,
            target,
            source_token,
            target_token,
            types,
            source_ids,
            target_ids,
            output,
        } => run_compare(
            &load_app_config(config_path)?,
            CompareArgs {
                source,
                target,
                source_token,
                target_token,
                types,
                source_ids,
                target_ids,
            },
            &output,
        ),
        Commands::Diff {
            kind,
            source,
            target,
            output,
        } => run_diff(&load_app_config(config_path)?, &kind, &source, &target, &output),
        Commands::Types => {
            let config = load_app_config(config_path)?;
            for name in &config.metadata_types {
                println!("{name}");
            }
            Ok(())
        }
        Commands::Init { portable } => run_init(config_path, portable),
    }
}

fn run_init(path: Option<&Path>, portable: bool) -> anyhow::Result<()> {
    let loaded = match path {
        Some(path) => {
            let loaded = load_config_from(path)?;
            if !loaded.exists {
                save_config(&loaded.path, &loaded.config)?;
            }
            loaded
        }
        None => ensure_config(portable)?,
    };

    if loaded.exists {
        println!("Configuration already exists: {}", loaded.path.display());
    } else {
        println!("Wrote default configuration: {}", loaded.path.display());
    }
    Ok(())
}

fn load_app_config(path: Option<&Path>) -> anyhow::Result<AppConfig> {
    let loaded = match path {
        Some(path) => load_config_from(path)?,
        None => load_config(false)?,
    };
    if loaded.exists {
        info!("Using configuration {}", loaded.path.display());
    }
    Ok(loaded.config)
}

struct CompareArgs {
    source: String,
    target: String,
    source_token: Option<String>,
    target_token: Option<String>,
    types: Vec<String>,
    source_ids: Option<PathBuf>,
    target_ids: Option<PathBuf>,
}

fn run_compare(config: &AppConfig, args: CompareArgs, output: &OutputArgs) -> anyhow::Result<()> {
    let source = resolve_org(config, &args.source, args.source_token)?;
    let target = resolve_org(config, &args.target, args.target_token)?;

    let kinds: Vec<RecordKind> = if args.types.is_empty() {
        config.metadata_types.iter().map(|name| RecordKind::parse(name)).collect()
    } else {
        args.types.iter().map(|name| RecordKind::parse(name)).collect()
    };
    if kinds.is_empty() {
        bail!("No record types to compare");
    }

    let source_ids = args.source_ids.as_deref().map(load_id_map).transpose()?;
    let target_ids = args.target_ids.as_deref().map(load_id_map).transpose()?;

    info!("Comparing:");
    info!("  Source: {}", source.instance_url());
    info!("  Target: {}", target.instance_url());

    let fetcher = DetailFetcher::new(FetcherConfig::from_app_config(config))?;
    let engine = ReconcileEngine::with_algorithm(algorithm(config, output));

    let runtime = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
    let result = runtime.block_on(async {
        let mut merged = CompareResult::new();
        for kind in &kinds {
            let source_ids = ids_for(&fetcher, &source, kind, source_ids.as_ref()).await?;
            let target_ids = ids_for(&fetcher, &target, kind, target_ids.as_ref()).await?;
            let result = compare_org_kind(
                &fetcher,
                &engine,
                &source,
                &target,
                kind,
                &source_ids,
                &target_ids,
            )
            .await?;
            merged.merge(result);
        }
        anyhow::Ok(merged)
    })?;

    print_result(
        source.instance_url().as_str(),
        target.instance_url().as_str(),
        &result,
        output,
    )
}

fn run_diff(
    config: &AppConfig,
    kind: &str,
    source: &Path,
    target: &Path,
    output: &OutputArgs,
) -> anyhow::Result<()> {
    let kind = RecordKind::parse(kind);
    let source_records = load_records(source)?;
    let target_records = load_records(target)?;

    let engine = ReconcileEngine::with_algorithm(algorithm(config, output));
    let result = engine.reconcile(source_records, target_records, &kind);

    print_result(
        &source.display().to_string(),
        &target.display().to_string(),
        &result,
        output,
    )
}

fn algorithm(config: &AppConfig, output: &OutputArgs) -> DiffAlgorithm {
    output
        .algorithm
        .map(DiffAlgorithm::from)
        .unwrap_or(config.diff_algorithm)
}

/// Resolve a profile name or instance URL into a connection
fn resolve_org(
    config: &AppConfig,
    name_or_url: &str,
    token: Option<String>,
) -> anyhow::Result<OrgConnection> {
    let (instance_url, token) = match config.find_org(name_or_url) {
        Some(profile) => {
            let token = match (token, &profile.token_env) {
                (Some(token), _) => Some(token),
                (None, Some(var)) => std::env::var(var).ok(),
                (None, None) => None,
            };
            (profile.instance_url.as_str(), token)
        }
        None if name_or_url.contains("://") => (name_or_url, token),
        None => bail!("Unknown org profile: {name_or_url}"),
    };

    let token = token.ok_or_else(|| anyhow!("No access token for org {name_or_url}"))?;
    Ok(OrgConnection::new(instance_url, token, config.api_version.clone())?)
}

async fn ids_for(
    fetcher: &DetailFetcher,
    connection: &OrgConnection,
    kind: &RecordKind,
    supplied: Option<&HashMap<String, Vec<String>>>,
) -> anyhow::Result<Vec<String>> {
    if let Some(ids) = supplied.and_then(|map| map.get(kind.as_str())) {
        return Ok(ids.clone());
    }
    Ok(fetcher.list_record_ids(connection, kind).await?)
}

fn load_id_map(path: &Path) -> anyhow::Result<HashMap<String, Vec<String>>> {
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read id file {}", path.display()))?;
    serde_json::from_str(&data)
        .with_context(|| format!("Id file {} must map type names to id arrays", path.display()))
}

fn load_records(path: &Path) -> anyhow::Result<Vec<Record>> {
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read records file {}", path.display()))?;
    serde_json::from_str(&data)
        .with_context(|| format!("Records file {} must contain a JSON array", path.display()))
}

fn print_result(
    source: &str,
    target: &str,
    result: &CompareResult,
    output: &OutputArgs,
) -> anyhow::Result<()> {
    if output.json {
        let report = build_json_report(source, target, result, output.diff_only);
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let use_color = !output.no_color && std::io::stdout().is_terminal();
    print!("{}", render_text_report(result, output.diff_only, use_color));
    Ok(())
}

#[derive(Serialize)]
struct JsonReport<'a> {
    source: &'a str,
    target: &'a str,
    summary: CompareSummary,
    result: CompareResult,
}

fn build_json_report<'a>(
    source: &'a str,
    target: &'a str,
    result: &CompareResult,
    diff_only: bool,
) -> JsonReport<'a> {
    let mut result = result.clone();
    let summary = result.summary();
    if diff_only {
        result.unchanged.clear();
    }

    JsonReport {
        source,
        target,
        summary,
        result,
    }
}

struct Palette {
    same: &'static str,
    added: &'static str,
    removed: &'static str,
    changed: &'static str,
    reset: &'static str,
}

impl Palette {
    fn new(use_color: bool) -> Self {
        if use_color {
            Self {
                same: "\x1b[32m",    // Green
                added: "\x1b[33m",   // Yellow
                removed: "\x1b[34m", // Blue
                changed: "\x1b[31m", // Red
                reset: "\x1b[0m",
            }
        } else {
            Self {
                same: "",
                added: "",
                removed: "",
                changed: "",
                reset: "",
            }
        }
    }
}

fn render_text_report(result: &CompareResult, diff_only: bool, use_color: bool) -> String {
    let palette = Palette::new(use_color);
    let mut out = String::new();

    out.push_str(&format!("\n{}\n", "=".repeat(80)));
    out.push_str("Comparison Results\n");
    out.push_str(&format!("{}\n", "=".repeat(80)));

    if !diff_only {
        for entry in &result.unchanged {
            out.push_str(&format!(
                "{}  ==  {} {}/{}\n",
                palette.same, palette.reset, entry.kind, entry.name
            ));
        }
    }
    for entry in &result.added {
        out.push_str(&format!(
            "{}  ++  {} {}/{}\n",
            palette.added, palette.reset, entry.kind, entry.name
        ));
    }
    for entry in &result.removed {
        out.push_str(&format!(
            "{}  --  {} {}/{}\n",
            palette.removed, palette.reset, entry.kind, entry.name
        ));
    }
    for changed in &result.changed {
        out.push_str(&format!(
            "{}  !=  {} {}/{}\n",
            palette.changed, palette.reset, changed.kind, changed.name
        ));
        for diff in &changed.differences {
            out.push_str(&format!("        {:>5} - {}\n", diff.line, diff.source));
            out.push_str(&format!("        {:>5} + {}\n", diff.line, diff.target));
        }
    }

    let summary = result.summary();
    out.push_str(&format!("\n{}\n", "=".repeat(80)));
    out.push_str("Summary:\n");
    out.push_str(&format!("  Total records:   {}\n", summary.total));
    out.push_str(&format!("  Unchanged:       {}\n", summary.unchanged));
    out.push_str(&format!("  Added:           {}\n", summary.added));
    out.push_str(&format!("  Removed:         {}\n", summary.removed));
    out.push_str(&format!("  Changed:         {}\n", summary.changed));
    out.push_str(&format!("{}\n", "=".repeat(80)));
    out
}
