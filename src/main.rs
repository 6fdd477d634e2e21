use anyhow::{bail, Context};
use clap::{ArgAction, Parser, Subcommand};
use repackr::config::ServiceConfig;
use repackr::container::Compression;
use repackr::package::{inspect, normalize};
use repackr::service::{display_name, PackageRequest, PackageResponse, PackageService};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "repackr", version, about = "Flatten plugin archives into installable packages")]
struct Cli {
    /// Service configuration (JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Normalize a local archive
    Normalize {
        input: PathBuf,
        /// Output base name (default: input file stem)
        #[arg(short, long)]
        name: Option<String>,
        #[arg(short = 'C', long, default_value = ".")]
        output_dir: PathBuf,
        /// Compression: deflated (default), stored
        #[arg(short, long)]
        compression: Option<String>,
        /// Deflate level
        #[arg(short, long)]
        level: Option<i64>,
        /// Reuse the input bytes when no root folder is stripped
        #[arg(long)]
        passthrough: bool,
    },
    /// Show the layout analysis of a local archive
    Inspect {
        input: PathBuf,
    },
    /// Fetch a remote archive and normalize it
    Fetch {
        #[arg(short, long)]
        url: String,
        #[arg(short, long)]
        name: Option<String>,
        #[arg(short = 'C', long, default_value = ".")]
        output_dir: PathBuf,
    },
    /// Serve a raw query string (`url=...&name=...`)
    Query {
        query: String,
        #[arg(short = 'C', long, default_value = ".")]
        output_dir: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut config = match &cli.config {
        Some(path) => ServiceConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => ServiceConfig::default(),
    };

    match cli.command {

        // ── Normalize ────────────────────────────────────────────────────────
        Commands::Normalize { input, name, output_dir, compression, level, passthrough } => {
            if let Some(c) = compression {
                config.normalize.compression = parse_compression(&c)?;
            }
            if level.is_some() {
                config.normalize.level = level;
            }
            config.normalize.passthrough_unchanged |= passthrough;

            let raw = std::fs::read(&input)
                .with_context(|| format!("reading {}", input.display()))?;
            let base = name
                .or_else(|| input.file_stem().map(|s| s.to_string_lossy().into_owned()));
            let base = display_name(base.as_deref(), &config.default_name);

            let out = normalize(&raw, &base, &config.normalize)?;
            let path = write_output(&output_dir, &out.file_name, &out.bytes)?;
            println!("  root     {}", out.root.as_deref().unwrap_or("—"));
            println!("  format   {}", out.format.name());
            println!("  entries  {}", out.entry_count);
            println!("  blake3   {}", out.content_hash());
            println!("Created: {}", path.display());
        }

        // ── Inspect ──────────────────────────────────────────────────────────
        Commands::Inspect { input } => {
            let raw = std::fs::read(&input)
                .with_context(|| format!("reading {}", input.display()))?;
            let layout = inspect(&raw, &config.normalize.marker)?;

            println!("── Archive ──────────────────────────────────────────────");
            println!("  Path           {}", input.display());
            println!("  Entries        {}", layout.entries.len());
            println!("  Files          {}", layout.file_count);
            println!("  Content size   {} B", layout.content_size);
            println!("  Wrapping root  {}", layout.root.as_deref().unwrap_or("—"));
            println!("  Marker (raw)   {}", layout.marker_at_root);
            println!("  Marker (final) {}", layout.marker_final);
            println!("  Output format  {} (.{})",
                layout.format.name(), config.normalize.extension(layout.format));
            for entry in &layout.entries {
                println!("    {entry}");
            }
        }

        // ── Fetch ────────────────────────────────────────────────────────────
        Commands::Fetch { url, name, output_dir } => {
            let request = PackageRequest::new(url, name.as_deref(), &config.default_name)?;
            let service = PackageService::http(config)?;
            let response = service.serve(&request).await;
            service.flush().await;
            emit(&output_dir, &response)?;
        }

        // ── Query ────────────────────────────────────────────────────────────
        Commands::Query { query, output_dir } => {
            let service = PackageService::http(config)?;
            let response = service.handle(&query).await;
            service.flush().await;
            emit(&output_dir, &response)?;
        }
    }

    Ok(())
}

// ── helpers ──────────────────────────────────────────────────────────────────

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default)).init();
}

fn parse_compression(s: &str) -> anyhow::Result<Compression> {
    match Compression::from_name(s) {
        Some(c) => Ok(c),
        None    => bail!("unknown compression '{s}' (expected deflated or stored)"),
    }
}

fn write_output(dir: &Path, file_name: &str, bytes: &[u8]) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("creating {}", dir.display()))?;
    let path = dir.join(file_name);
    std::fs::write(&path, bytes)
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(path)
}

fn emit(dir: &Path, response: &PackageResponse) -> anyhow::Result<()> {
    match (&response.file_name, response.is_success()) {
        (Some(file_name), true) => {
            let path = write_output(dir, file_name, &response.body)?;
            println!("Created: {} ({} B)", path.display(), response.body.len());
            Ok(())
        }
        _ => bail!("HTTP {}: {}", response.status, String::from_utf8_lossy(&response.body)),
    }
}
