//! CLI entry point for `mailpack`.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::{CommandFactory, Parser, Subcommand};
use humansize::{format_size, BINARY};
use indicatif::{ProgressBar, ProgressStyle};

use mailpack::archive::MetadataFormat;
use mailpack::config::Config;
use mailpack::extract::{
    self, ExtractionContext, ExtractionOptions, FolderSummary, ProgressEvent, ProgressSink,
    SchemeRegistry,
};
use mailpack::model::stats::ExtractionStats;
use mailpack::store::StoreSource;

/// Bytes read from a source file to sniff its kind.
const SNIFF_LEN: u64 = 8192;

#[derive(Parser)]
#[command(
    name = "mailpack",
    version,
    about = "Convert mail stores into self-describing archival packages"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract a mail store into a package
    Extract {
        /// Mail store: mbox file, mbox directory or single message
        source: PathBuf,
        /// Directory the package is created in
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Package name (defaults to the source file name)
        #[arg(short, long)]
        name: Option<String>,
        /// Store scheme, when auto-detection is not wanted
        #[arg(short = 't', long = "type", value_name = "SCHEME")]
        scheme: Option<String>,
        /// Drop empty folders at every level
        #[arg(long)]
        drop_empty_folders: bool,
        /// Drop empty folders only directly below the root
        #[arg(long)]
        keep_only_deep_empty_folders: bool,
        /// Store extracted plain text next to messages and attachments
        #[arg(long)]
        text: bool,
        /// One-letter node type tags in directory names
        #[arg(long)]
        compact: bool,
        /// Write metadata documents as XML instead of JSON
        #[arg(long)]
        xml: bool,
        /// Package title
        #[arg(long)]
        title: Option<String>,
    },
    /// List the folders of a mail store
    List {
        source: PathBuf,
        /// Count messages, sizes and dates per folder
        #[arg(long)]
        stats: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
        /// Store scheme, when auto-detection is not wanted
        #[arg(short = 't', long = "type", value_name = "SCHEME")]
        scheme: Option<String>,
    },
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
    /// Generate a man page
    Manpage,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = mailpack::config::load_config();

    let log_level = match cli.verbose {
        0 => config.general.log_level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    setup_logging(log_level, &config);

    match cli.command {
        Commands::Extract {
            source,
            output,
            name,
            scheme,
            drop_empty_folders,
            keep_only_deep_empty_folders,
            text,
            compact,
            xml,
            title,
        } => {
            let mut options = config.extraction.clone();
            options.drop_empty_folders |= drop_empty_folders;
            options.keep_only_deep_empty_folders |= keep_only_deep_empty_folders;
            options.extract_text |= text;
            options.compact_naming |= compact;
            if xml {
                options.metadata_format = MetadataFormat::Xml;
            }
            if title.is_some() {
                options.package_title = title;
            }
            let destination = output
                .or_else(|| config.output.default_destination.clone())
                .ok_or_else(|| anyhow::anyhow!("No destination given (use --output)"))?;
            cmd_extract(&source, &destination, name, scheme.as_deref(), options)
        }
        Commands::List {
            source,
            stats,
            json,
            scheme,
        } => cmd_list(&source, scheme.as_deref(), stats, json, &config),
        Commands::Completions { shell } => cmd_completions(shell),
        Commands::Manpage => cmd_manpage(),
    }
}

/// Set up tracing with stderr output and optional file logging.
fn setup_logging(level: &str, config: &Config) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let log_file = mailpack::config::log_file_path(config);
    let log_dir = log_file
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    if std::fs::create_dir_all(&log_dir).is_ok() {
        let file_appender = tracing_appender::rolling::never(&log_dir, "mailpack.log");
        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(file_appender);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .with(file_layer)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .init();
    }
}

/// Pick the store scheme of `path`: directories are mbox trees, files are sniffed.
fn detect_scheme(path: &Path, registry: &SchemeRegistry) -> anyhow::Result<String> {
    if path.is_dir() {
        return Ok("mboxdir".to_string());
    }
    let mut head = Vec::new();
    std::fs::File::open(path)?
        .take(SNIFF_LEN)
        .read_to_end(&mut head)?;
    let media_type = registry.sniffer().sniff(&head);
    if let Some(entry) = registry.for_media_type(&media_type) {
        return Ok(entry.scheme.clone());
    }
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match extension.as_deref() {
        Some("mbox" | "mbx") => Ok("mbox".to_string()),
        Some("eml") => Ok("eml".to_string()),
        _ => anyhow::bail!(
            "Cannot tell what kind of mail store {} is ({media_type}); use --type",
            path.display()
        ),
    }
}

fn open_context(
    source: &Path,
    destination: &Path,
    name: &str,
    scheme: Option<&str>,
    options: ExtractionOptions,
) -> anyhow::Result<ExtractionContext> {
    if !source.exists() {
        anyhow::bail!("Source not found: {}", source.display());
    }
    let registry = Arc::new(SchemeRegistry::with_defaults());
    let scheme = match scheme {
        Some(scheme) => scheme.to_string(),
        None => detect_scheme(source, &registry)?,
    };
    tracing::info!(source = %source.display(), scheme = %scheme, "Opening mail store");
    let ctx = ExtractionContext::new_root(
        StoreSource::path(scheme, source),
        destination,
        name,
        options,
        registry,
    )?;
    Ok(ctx)
}

fn default_name(source: &Path) -> String {
    source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "package".to_string())
}

/// Spinner showing the folder and message being packaged.
struct SpinnerProgress {
    bar: ProgressBar,
}

impl ProgressSink for SpinnerProgress {
    fn on_event(&self, event: &ProgressEvent) {
        match event {
            ProgressEvent::FolderStarted { name, .. } => {
                self.bar.set_prefix(name.clone());
            }
            ProgressEvent::ElementDone { subject, .. } => {
                self.bar.inc(1);
                self.bar.set_message(subject.clone());
            }
            ProgressEvent::ContainerStarted { scheme, depth } => {
                self.bar.set_message(format!("nested {scheme} (depth {depth})"));
            }
            _ => {}
        }
    }
}

fn cmd_extract(
    source: &Path,
    destination: &Path,
    name: Option<String>,
    scheme: Option<&str>,
    options: ExtractionOptions,
) -> anyhow::Result<()> {
    let name = name.unwrap_or_else(|| default_name(source));
    let package = destination.join(&name);
    if package.exists() {
        anyhow::bail!("Package directory already exists: {}", package.display());
    }

    let bar = ProgressBar::new_spinner();
    bar.set_style(ProgressStyle::with_template(
        "{spinner:.green} {prefix:.bold} {pos} message(s) {wide_msg}",
    )?);
    bar.enable_steady_tick(Duration::from_millis(120));

    let mut ctx = open_context(source, destination, &name, scheme, options)?
        .with_progress(Arc::new(SpinnerProgress { bar: bar.clone() }));

    let start = Instant::now();
    let result = extract::extract(&mut ctx);
    bar.finish_and_clear();

    match result {
        Ok(stats) => {
            print_extraction_summary(&package, &stats, start.elapsed());
            Ok(())
        }
        Err(failure) => {
            print_extraction_summary(&package, &failure.stats, start.elapsed());
            Err(failure.into())
        }
    }
}

fn print_extraction_summary(package: &Path, stats: &ExtractionStats, elapsed: Duration) {
    println!();
    println!("  {:<25} {}", "Package", package.display());
    println!("  {:<25} {}", "Folders", stats.folders);
    println!("  {:<25} {}", "Messages", stats.elements);
    println!("  {:<25} {}", "Attached messages", stats.attached_elements);
    println!("  {:<25} {}", "Message data", format_size(stats.raw_size, BINARY));
    println!("  {:<25} {:.2?}", "Elapsed", elapsed);
    println!();
}

fn cmd_list(
    source: &Path,
    scheme: Option<&str>,
    with_stats: bool,
    json: bool,
    config: &Config,
) -> anyhow::Result<()> {
    let destination = std::env::temp_dir();
    let mut ctx = open_context(
        source,
        &destination,
        &default_name(source),
        scheme,
        config.extraction.clone(),
    )?;
    let summaries: Vec<FolderSummary> = extract::list(&mut ctx, with_stats)?.collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&summaries)?);
        return Ok(());
    }

    println!();
    if with_stats {
        println!("  {:<40} {:>8} {:>10}  {}", "Folder", "Messages", "Size", "Dates");
    }
    for summary in &summaries {
        let label = if summary.level == 0 {
            format!("{} (root)", summary.name)
        } else {
            format!("{}{}", "  ".repeat(summary.level), summary.name)
        };
        if with_stats {
            let dates = summary
                .date_range
                .as_ref()
                .and_then(|r| Some((r.start()?, r.end()?)))
                .map(|(start, end)| {
                    format!("{} .. {}", start.format("%Y-%m-%d"), end.format("%Y-%m-%d"))
                })
                .unwrap_or_default();
            println!(
                "  {:<40} {:>8} {:>10}  {}",
                label,
                summary.element_count.unwrap_or(0),
                format_size(summary.raw_size.unwrap_or(0), BINARY),
                dates
            );
        } else {
            println!("  {label}");
        }
    }
    println!();
    println!("  {} folder(s)", summaries.len());
    Ok(())
}

/// Generate shell completions and print to stdout.
fn cmd_completions(shell: clap_complete::Shell) -> anyhow::Result<()> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, "mailpack", &mut std::io::stdout());
    Ok(())
}

/// Generate a man page and print to stdout.
fn cmd_manpage() -> anyhow::Result<()> {
    let cmd = Cli::command();
    let man = clap_mangen::Man::new(cmd);
    let mut buf = Vec::new();
    man.render(&mut buf)?;
    std::io::Write::write_all(&mut std::io::stdout(), &buf)?;
    Ok(())
}
