use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use clap::{ArgAction, Args, Parser, Subcommand};
use globset::{Glob, GlobSetBuilder};
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::blocking::{Client, multipart};
use serde::Deserialize;
use sprite_ledger_core::batch::AssetBatch;
use sprite_ledger_core::config::{LedgerConfig, ValidationPolicy};
use sprite_ledger_core::error::SpriteLedgerError;
use sprite_ledger_core::images::FileImageSource;
use sprite_ledger_core::mapping::MappingStore;
use sprite_ledger_core::rewrite::Rewriter;
use sprite_ledger_core::upload::{UploadOutcome, UploadResponse, UploadedFile, Uploader, upload_all};
use sprite_ledger_core::workspace::Workspace;
use tracing::{error, info, warn};
use walkdir::WalkDir;

#[derive(Parser, Debug)]
#[command(
    name = "sprite-ledger",
    about = "Incremental emoji sprite sheets with a stable global index",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// Show progress bars (disable with --progress false or --quiet)
    #[arg(long, default_value_t = true, action=ArgAction::Set, global=true, help_heading = "Logging/UX")]
    progress: bool,
    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action=ArgAction::Count, global=true, help_heading = "Logging/UX")]
    verbose: u8,
    /// Quiet mode (overrides verbose)
    #[arg(
        short,
        long,
        default_value_t = false,
        global = true,
        help_heading = "Logging/UX"
    )]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Pack legacy emoji files that are not mapped yet into new sprite pages
    Update(UpdateArgs),
    /// Record existing sprite pages and mapping as frozen history
    Init(CommonArgs),
    /// Print registry status and validation result
    Status(CommonArgs),
    /// Freeze every page
    FreezeAll(CommonArgs),
    /// Freeze one page
    Freeze {
        /// Page id
        id: u32,
        #[command(flatten)]
        common: CommonArgs,
    },
    /// Bump the registry minor version
    NewVersion {
        /// Description stored with the new version
        description: String,
        #[command(flatten)]
        common: CommonArgs,
    },
    /// Write forward and rollback SQL migration scripts from the mapping
    Migrate(MigrateArgs),
    /// Rewrite legacy emoji references in a text file
    Rewrite(RewriteArgs),
    /// Upload sprite pages and record their URLs
    Upload(UploadArgs),
}

#[derive(Args, Debug, Clone)]
struct CommonArgs {
    /// Output directory holding registry, mapping, pages and styles
    #[arg(short, long, default_value = "emoji_output", help_heading = "Input/Output")]
    out_dir: PathBuf,
    /// YAML config file path (present keys override the flags below)
    #[arg(long, help_heading = "Input/Output")]
    config: Option<PathBuf>,

    // Layout
    /// Assets per page
    #[arg(long, default_value_t = 128, help_heading = "Layout")]
    capacity: u32,
    /// Assets per row
    #[arg(long, default_value_t = 16, help_heading = "Layout")]
    row_width: u32,
    /// Cell edge length in pixels
    #[arg(long, default_value_t = 64, help_heading = "Layout")]
    cell_size: u32,
    /// Source pixels per displayed CSS pixel
    #[arg(long, default_value_t = 2, help_heading = "Layout")]
    display_ratio: u32,
    /// Page file name prefix
    #[arg(long, default_value = "emoji-sprite-", help_heading = "Layout")]
    page_prefix: String,

    // Export
    /// URL prefix of page images in generated CSS
    #[arg(long, default_value = "/emoji/", help_heading = "Export")]
    asset_base_url: String,
    /// Registry validation policy: lenient | strict
    #[arg(long, value_parser = ["lenient", "strict"], default_value = "lenient", help_heading = "Export")]
    validation: String,
    /// Table rewritten by migration scripts
    #[arg(long, default_value = "comments", help_heading = "Export")]
    table: String,
    /// Column rewritten by migration scripts
    #[arg(long, default_value = "content", help_heading = "Export")]
    column: String,
    /// Print the merged configuration (after CLI/YAML) and exit
    #[arg(long, default_value_t = false, help_heading = "Export")]
    print_config: bool,
    /// Output format for --print-config: json|yaml
    #[arg(long, default_value = "json", value_parser = ["json", "yaml"], help_heading = "Export")]
    print_config_format: String,
}

#[derive(Args, Debug, Clone)]
struct UpdateArgs {
    /// Directory of legacy emoji files (s<N>.png)
    #[arg(long, default_value = "emoji", help_heading = "Input/Output")]
    emoji_dir: PathBuf,
    /// Descend into subdirectories of emoji_dir
    #[arg(long, default_value_t = false, help_heading = "Input/Output")]
    recursive: bool,
    /// Include patterns (glob). If set, only files matching any pattern are considered
    #[arg(long, help_heading = "Input/Output")]
    include: Vec<String>,
    /// Exclude patterns (glob). Files matching any pattern will be ignored
    #[arg(long, help_heading = "Input/Output")]
    exclude: Vec<String>,
    /// Only pack these file names (e.g. s501.png); default is every unmapped file
    #[arg(long, num_args = 1.., help_heading = "Input/Output")]
    new_files: Vec<String>,
    /// Dry run: assign and lay out in memory but do not write files
    #[arg(long, default_value_t = false, help_heading = "Export")]
    dry_run: bool,
    #[command(flatten)]
    common: CommonArgs,
}

#[derive(Args, Debug, Clone)]
struct MigrateArgs {
    /// Sample texts to rewrite and print (checks the mapping before running SQL)
    #[arg(long)]
    sample: Vec<String>,
    #[command(flatten)]
    common: CommonArgs,
}

#[derive(Args, Debug, Clone)]
struct RewriteArgs {
    /// Text file to rewrite; `-` reads stdin
    input: PathBuf,
    /// Write the result back to the input file instead of stdout
    #[arg(long, default_value_t = false)]
    in_place: bool,
    #[command(flatten)]
    common: CommonArgs,
}

#[derive(Args, Debug, Clone)]
struct UploadArgs {
    /// Upload endpoint
    #[arg(long, env = "SPRITE_LEDGER_UPLOAD_URL", default_value = "http://localhost:8081/api/image/upload")]
    url: String,
    /// Bearer token for the upload endpoint
    #[arg(long, env = "SPRITE_LEDGER_UPLOAD_TOKEN", hide_env_values = true)]
    token: String,
    /// Per-request timeout in seconds
    #[arg(long, default_value_t = 60)]
    timeout_secs: u64,
    #[command(flatten)]
    common: CommonArgs,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing_with_level(cli.quiet, cli.verbose);
    let progress = cli.progress && !cli.quiet;
    match &cli.command {
        Commands::Update(args) => run_update(args, progress),
        Commands::Init(common) => run_init(common),
        Commands::Status(common) => run_status(common),
        Commands::FreezeAll(common) => {
            let Some(ws) = open_workspace(common)? else {
                return Ok(());
            };
            let count = ws.modify_registry(|r| {
                r.freeze_all();
                r.pages().len()
            })?;
            info!(pages = count, "all pages frozen");
            Ok(())
        }
        Commands::Freeze { id, common } => {
            let Some(ws) = open_workspace(common)? else {
                return Ok(());
            };
            if !ws.modify_registry(|r| r.freeze_page(*id))? {
                return Err(SpriteLedgerError::UnknownPage(*id).into());
            }
            info!(id, "page frozen");
            Ok(())
        }
        Commands::NewVersion {
            description,
            common,
        } => {
            let Some(ws) = open_workspace(common)? else {
                return Ok(());
            };
            let version = ws.modify_registry(|r| r.promote_version(description))?;
            info!(%version, "new version created");
            Ok(())
        }
        Commands::Migrate(args) => run_migrate(args),
        Commands::Rewrite(args) => run_rewrite(args),
        Commands::Upload(args) => run_upload(args, progress),
    }
}

/// Builds the workspace from flags and YAML; returns `None` after `--print-config`.
fn open_workspace(common: &CommonArgs) -> anyhow::Result<Option<Workspace>> {
    let cfg = load_config(common)?;
    if common.print_config {
        match common.print_config_format.as_str() {
            "yaml" => println!("{}", serde_yaml::to_string(&cfg)?),
            _ => println!("{}", serde_json::to_string_pretty(&cfg)?),
        }
        return Ok(None);
    }
    Ok(Some(Workspace::new(&common.out_dir, cfg)?))
}

fn load_config(common: &CommonArgs) -> anyhow::Result<LedgerConfig> {
    let base = LedgerConfig {
        capacity: common.capacity,
        row_width: common.row_width,
        cell_size: common.cell_size,
        display_ratio: common.display_ratio,
        page_prefix: common.page_prefix.clone(),
        asset_base_url: common.asset_base_url.clone(),
        validation: parse_policy(&common.validation)?,
        script_table: common.table.clone(),
        script_column: common.column.clone(),
    };
    let cfg = match &common.config {
        Some(path) => {
            let file = fs::read_to_string(path)
                .with_context(|| format!("read config {}", path.display()))?;
            let y: YamlConfig = serde_yaml::from_str(&file)
                .with_context(|| format!("parse config {}", path.display()))?;
            y.into_ledger_config(base)
                .with_context(|| format!("apply config {}", path.display()))?
        }
        None => base,
    };
    cfg.validate()?;
    Ok(cfg)
}

fn run_update(args: &UpdateArgs, show_progress: bool) -> anyhow::Result<()> {
    let Some(ws) = open_workspace(&args.common)? else {
        return Ok(());
    };
    let paths = gather_paths(&args.emoji_dir, args.recursive, &args.include, &args.exclude)?;
    let candidates = AssetBatch::from_paths(&paths);
    let only = (!args.new_files.is_empty()).then_some(args.new_files.as_slice());

    if args.dry_run {
        return run_update_dry(&ws, &candidates, only);
    }

    let spinner = show_progress.then(|| {
        let b = ProgressBar::new_spinner();
        b.set_message("packing new emoji");
        b.enable_steady_tick(Duration::from_millis(100));
        b
    });
    let result = ws.run_incremental(&candidates, only, &FileImageSource);
    if let Some(b) = &spinner {
        b.finish_and_clear();
    }

    match result? {
        None => info!("no new emoji files found"),
        Some(run) => {
            for page in &run.pages {
                info!(
                    id = page.id,
                    file = %page.filename,
                    range = %format!("{}-{}", page.range_start, page.range_end),
                    "page created"
                );
            }
            for d in &run.diagnostics {
                warn!(diagnostic = %d, "registry validation");
            }
            info!(
                version = %run.version,
                new_assets = run.new_assets,
                pages = run.pages.len(),
                css = ?run.css_path,
                "incremental update done; upload the new pages next"
            );
        }
    }
    Ok(())
}

fn run_update_dry(ws: &Workspace, candidates: &AssetBatch, only: Option<&[String]>) -> anyhow::Result<()> {
    let registry = ws.load_registry()?;
    let mapping = ws.load_mapping()?;
    let batch = candidates.select_new(&mapping, only);
    let delta = sprite_ledger_core::builder::build_delta(&batch, &mapping, &registry);
    if delta.is_empty() {
        info!("no new emoji files found (dry run)");
        return Ok(());
    }
    let keys: Vec<_> = delta.assignments.iter().map(|a| a.global).collect();
    let layouts = sprite_ledger_core::pack_layout(&keys, ws.config(), registry.next_page_id())?;
    for a in &delta.assignments {
        println!("{} -> {} ({})", a.legacy, a.global, a.source.display());
    }
    for l in &layouts {
        println!(
            "page {} {} {}x{} ({} assets)",
            l.id,
            l.filename,
            l.width,
            l.height,
            l.count()
        );
    }
    info!(
        new_assets = delta.len(),
        pages = layouts.len(),
        "dry run: nothing written"
    );
    Ok(())
}

fn run_init(common: &CommonArgs) -> anyhow::Result<()> {
    let Some(ws) = open_workspace(common)? else {
        return Ok(());
    };
    let summary = match ws.run_initial_import(&FileImageSource) {
        Err(SpriteLedgerError::MissingMapping(path)) => anyhow::bail!(
            "mapping file {} not found; produce the initial mapping before importing",
            path.display()
        ),
        other => other?,
    };
    info!(
        mapped = summary.mapped,
        pages = summary.pages.len(),
        "initial import done; existing pages are frozen"
    );
    print!("{}", ws.load_registry()?.status_report());
    Ok(())
}

fn run_status(common: &CommonArgs) -> anyhow::Result<()> {
    let Some(ws) = open_workspace(common)? else {
        return Ok(());
    };
    let registry = ws
        .load_registry()
        .with_context(|| format!("load {}", ws.registry_path().display()))?;
    print!("{}", registry.status_report());
    Ok(())
}

fn run_migrate(args: &MigrateArgs) -> anyhow::Result<()> {
    let Some(ws) = open_workspace(&args.common)? else {
        return Ok(());
    };
    let (forward, rollback) = ws.write_migration_scripts()?;
    info!(?forward, ?rollback, "migration scripts written");
    warn!("rollback restores :emoji: tags only; converted image-path references are not restored");

    if !args.sample.is_empty() {
        let mapping = MappingStore::load_required(&ws.mapping_path())?;
        let rewriter = Rewriter::new(&mapping);
        for (i, text) in args.sample.iter().enumerate() {
            let out = rewriter.rewrite(text);
            println!("sample {}:", i + 1);
            println!("  before: {text}");
            println!("  after:  {}", out.text);
            for c in &out.changes {
                println!("  - {} -> {}", c.from, c.to);
            }
        }
    }
    println!("1. back up the database");
    println!("2. run {}", forward.display());
    println!("3. check the verification counts");
    println!("4. if needed, run {}", rollback.display());
    Ok(())
}

fn run_rewrite(args: &RewriteArgs) -> anyhow::Result<()> {
    let Some(ws) = open_workspace(&args.common)? else {
        return Ok(());
    };
    let mapping = MappingStore::load_required(&ws.mapping_path())?;
    let text = if args.input.as_os_str() == "-" {
        let mut s = String::new();
        std::io::stdin().read_to_string(&mut s)?;
        s
    } else {
        fs::read_to_string(&args.input)
            .with_context(|| format!("read {}", args.input.display()))?
    };
    let out = Rewriter::new(&mapping).rewrite(&text);
    info!(changes = out.changes.len(), "references rewritten");
    if args.in_place && args.input.as_os_str() != "-" {
        if out.changed() {
            fs::write(&args.input, &out.text)
                .with_context(|| format!("write {}", args.input.display()))?;
        }
    } else {
        print!("{}", out.text);
    }
    Ok(())
}

struct HttpUploader {
    client: Client,
    endpoint: String,
    token: String,
}

impl HttpUploader {
    fn new(endpoint: &str, token: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
            token: token.to_string(),
        })
    }
}

impl Uploader for HttpUploader {
    fn upload(&self, path: &Path) -> sprite_ledger_core::Result<UploadedFile> {
        let filename = path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("")
            .to_string();
        let fail = |reason: String| SpriteLedgerError::Upload {
            filename: filename.clone(),
            reason,
        };
        let part = multipart::Part::bytes(fs::read(path)?)
            .file_name(filename.clone())
            .mime_str("image/png")
            .map_err(|e| fail(e.to_string()))?;
        let form = multipart::Form::new().part("image", part);
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.token)
            .multipart(form)
            .send()
            .map_err(|e| fail(e.to_string()))?;
        let status = response.status().as_u16();
        let body = response.text().map_err(|e| fail(e.to_string()))?;
        UploadResponse::interpret(status, &body, &filename)
    }
}

fn run_upload(args: &UploadArgs, show_progress: bool) -> anyhow::Result<()> {
    let Some(ws) = open_workspace(&args.common)? else {
        return Ok(());
    };
    let files = ws.page_files()?;
    if files.is_empty() {
        anyhow::bail!("no sprite pages found in {}", ws.dir().display());
    }
    info!(count = files.len(), "uploading sprite pages");

    let uploader = HttpUploader::new(&args.url, &args.token, Duration::from_secs(args.timeout_secs))?;
    let bar = show_progress.then(|| {
        let b = ProgressBar::new(files.len() as u64);
        b.set_style(
            ProgressStyle::with_template(
                "{spinner:.green} uploading {pos}/{len} [{elapsed_precise}] {wide_msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        b
    });
    let report = upload_all(&uploader, &files, |outcome| {
        if let UploadOutcome::Failed { filename, error } = outcome {
            error!(file = %filename, %error, "upload failed");
        }
        if let Some(b) = &bar {
            b.inc(1);
        }
    });
    if let Some(b) = &bar {
        b.finish_and_clear();
    }

    let uploaded = report.succeeded().len();
    info!(uploaded, total = report.outcomes.len(), "upload finished");
    if uploaded == 0 {
        anyhow::bail!("every upload failed; check the endpoint and token");
    }
    let summary = ws.record_uploads(&report)?;
    info!(
        recorded = summary.recorded,
        failed = summary.failed,
        css = ?summary.cdn_css_path,
        config = ?summary.config_path,
        "page urls recorded"
    );
    if !report.all_succeeded() {
        warn!(failed = summary.failed, "some pages were not uploaded; rerun upload for them");
    }
    Ok(())
}

fn gather_paths(
    path: &Path,
    recursive: bool,
    include: &[String],
    exclude: &[String],
) -> anyhow::Result<Vec<PathBuf>> {
    // Build glob matchers
    let mut inc_set = None;
    if !include.is_empty() {
        let mut b = GlobSetBuilder::new();
        for pat in include {
            b.add(Glob::new(pat)?);
        }
        inc_set = Some(b.build()?);
    }
    let mut exc_set = None;
    if !exclude.is_empty() {
        let mut b = GlobSetBuilder::new();
        for pat in exclude {
            b.add(Glob::new(pat)?);
        }
        exc_set = Some(b.build()?);
    }
    if !path.exists() {
        anyhow::bail!("emoji directory {} does not exist", path.display());
    }
    let mut list: Vec<PathBuf> = Vec::new();
    if path.is_file() {
        if !should_skip(path, inc_set.as_ref(), exc_set.as_ref()) && is_png(path) {
            list.push(path.to_path_buf());
        }
    } else {
        let depth = if recursive { usize::MAX } else { 1 };
        for entry in WalkDir::new(path)
            .max_depth(depth)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let p = entry.path();
            if p.is_file() && !should_skip(p, inc_set.as_ref(), exc_set.as_ref()) && is_png(p) {
                list.push(p.to_path_buf());
            }
        }
    }
    Ok(list)
}

fn should_skip(
    p: &Path,
    include: Option<&globset::GlobSet>,
    exclude: Option<&globset::GlobSet>,
) -> bool {
    let s = p.to_string_lossy().replace('\\', "/");
    if let Some(ex) = exclude {
        if ex.is_match(&s) {
            return true;
        }
    }
    if let Some(inc) = include {
        if !inc.is_match(&s) {
            return true;
        }
    }
    false
}

fn is_png(p: &Path) -> bool {
    p.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("png"))
}

fn init_tracing_with_level(quiet: bool, verbose: u8) {
    let level = if quiet {
        "error".to_string()
    } else {
        match verbose {
            0 => "info".into(),
            1 => "debug".into(),
            _ => "trace".into(),
        }
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(level)
        .with_target(false)
        .try_init();
}

fn parse_policy(s: &str) -> anyhow::Result<ValidationPolicy> {
    s.parse()
        .map_err(|_| anyhow::anyhow!("unknown validation policy {s:?} (expected lenient or strict)"))
}

#[derive(Debug, Deserialize, Default)]
struct YamlConfig {
    capacity: Option<u32>,
    row_width: Option<u32>,
    cell_size: Option<u32>,
    display_ratio: Option<u32>,
    page_prefix: Option<String>,
    asset_base_url: Option<String>,
    validation: Option<String>,
    script_table: Option<String>,
    script_column: Option<String>,
}

impl YamlConfig {
    fn into_ledger_config(self, mut cfg: LedgerConfig) -> anyhow::Result<LedgerConfig> {
        if let Some(v) = self.capacity {
            cfg.capacity = v;
        }
        if let Some(v) = self.row_width {
            cfg.row_width = v;
        }
        if let Some(v) = self.cell_size {
            cfg.cell_size = v;
        }
        if let Some(v) = self.display_ratio {
            cfg.display_ratio = v;
        }
        if let Some(v) = self.page_prefix {
            cfg.page_prefix = v;
        }
        if let Some(v) = self.asset_base_url {
            cfg.asset_base_url = v;
        }
        if let Some(v) = self.validation {
            cfg.validation = parse_policy(&v)?;
        }
        if let Some(v) = self.script_table {
            cfg.script_table = v;
        }
        if let Some(v) = self.script_column {
            cfg.script_column = v;
        }
        Ok(cfg)
    }
}
