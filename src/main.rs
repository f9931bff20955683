//! CLI entry point for `attachment-archiver`.

use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::{Args, CommandFactory, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use attachment_archiver::config::{self, Config};
use attachment_archiver::export::extractor;
use attachment_archiver::model::options::{CharsetStrategy, MissingSenderPolicy};
use attachment_archiver::model::report::ExtractionReport;
use attachment_archiver::session::{self, ImapSession};

#[derive(Parser)]
#[command(
    name = "attachment-archiver",
    version,
    about = "Archive IMAP attachments into a per-sender directory tree"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Config file (TOML, or JSON when the name ends in .json)
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Verbose logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(flatten)]
    run: RunArgs,
}

/// Overrides for a single archive run.
#[derive(Args, Default)]
struct RunArgs {
    /// Storage root for the archive
    #[arg(short, long, value_name = "DIR")]
    output: Option<PathBuf>,

    /// Mailbox to archive
    #[arg(long)]
    mailbox: Option<String>,

    /// IMAP SEARCH criterion, e.g. "UNSEEN"
    #[arg(long, value_name = "QUERY")]
    query: Option<String>,

    /// How to pick the charset for header and filename decoding
    #[arg(long, value_enum)]
    charset_strategy: Option<CharsetStrategy>,

    /// Charset used when sniffing finds no charset= marker
    #[arg(long, value_name = "LABEL")]
    default_charset: Option<String>,

    /// Stop the run at the first message without a From header
    #[arg(long)]
    abort_on_missing_sender: bool,

    /// Flag archived messages as \Deleted
    #[arg(long)]
    delete_after_archive: bool,

    /// Expunge \Deleted messages at the end of the run
    #[arg(long)]
    expunge: bool,

    /// Print the run report as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a template config file
    InitConfig {
        /// Destination (defaults to the standard config location)
        #[arg(long)]
        path: Option<PathBuf>,
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
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

    match cli.command {
        Some(Commands::Completions { shell }) => return cmd_completions(shell),
        Some(Commands::Manpage) => return cmd_manpage(),
        Some(Commands::InitConfig { path, force }) => {
            return cmd_init_config(path.or(cli.config).as_deref(), force)
        }
        None => {}
    }

    let mut config = config::load_config(cli.config.as_deref())?;

    // Configure logging: stderr + optional log file
    let log_level = match cli.verbose {
        0 => config.general.log_level.clone(),
        1 => "info".to_string(),
        2 => "debug".to_string(),
        _ => "trace".to_string(),
    };
    setup_logging(&log_level, &config);
    match config.source {
        Some(ref path) => tracing::info!(path = %path.display(), "Loaded config"),
        None => tracing::debug!("No config file found, using defaults"),
    }

    apply_run_args(&mut config, &cli.run);
    cmd_run(&config, cli.run.json)
}

/// Fold command-line overrides into the loaded configuration.
fn apply_run_args(config: &mut Config, args: &RunArgs) {
    if let Some(ref dir) = args.output {
        config.storage_root = Some(dir.clone());
    }
    if let Some(ref mailbox) = args.mailbox {
        config.archive.mailbox = mailbox.clone();
    }
    if let Some(ref query) = args.query {
        config.archive.search_query = query.clone();
    }
    if let Some(strategy) = args.charset_strategy {
        config.archive.charset_strategy = strategy;
    }
    if let Some(ref charset) = args.default_charset {
        config.archive.default_charset = charset.clone();
    }
    if args.abort_on_missing_sender {
        config.archive.on_missing_sender = MissingSenderPolicy::Abort;
    }
    if args.delete_after_archive {
        config.archive.delete_after_archive = true;
    }
    if args.expunge {
        config.archive.expunge = true;
    }
}

/// Set up tracing with stderr output and optional file logging.
fn setup_logging(level: &str, config: &Config) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let log_dir = config::log_dir(config);
    if std::fs::create_dir_all(&log_dir).is_ok() {
        let file_appender = tracing_appender::rolling::never(&log_dir, "attachment-archiver.log");
        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(file_appender);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .with(file_layer)
            .init();
    } else {
        // Fall back to stderr only
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .init();
    }
}

/// Connect, archive every matching message, and print the report.
fn cmd_run(config: &Config, json: bool) -> anyhow::Result<()> {
    config.validate()?;
    let options = config.archive_options()?;

    if options.expunge && !options.delete_after_archive {
        tracing::warn!("--expunge without --delete-after-archive: this run marks nothing for deletion");
    }

    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} Archiving [{bar:40.cyan/blue}] {pos}/{len} messages ({eta})")?
            .progress_chars("#>-"),
    );

    let start = Instant::now();
    let mut imap = ImapSession::new(&config.login_info);
    let result = session::with_session(&mut imap, &config.archive.mailbox, |s| {
        extractor::run(s, &options, &|done, total| {
            pb.set_length(total as u64);
            pb.set_position(done as u64);
        })
    });
    pb.finish_and_clear();
    let report = result?;

    if !report.is_clean() {
        tracing::warn!(
            failed = report.messages_failed,
            "Some messages were left unflagged and will be retried on the next run"
        );
    }

    if json {
        print_report_json(&report)?;
    } else {
        print_report_table(&report, &options.storage_root, start.elapsed());
    }

    Ok(())
}

/// Write a template config so the user only has to fill in credentials.
fn cmd_init_config(path: Option<&Path>, force: bool) -> anyhow::Result<()> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => config::config_file_path()
            .ok_or_else(|| anyhow::anyhow!("no standard config directory on this system"))?,
    };
    if path.exists() && !force {
        anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
    }

    let mut template = Config::default();
    template.storage_root = Some(PathBuf::from("attachments"));
    template.login_info.server = "imap.example.com".into();
    template.login_info.email_address = "me@example.com".into();
    config::save_config(&template, &path)?;

    println!("  Wrote config template to {}", path.display());
    Ok(())
}

/// Generate shell completions and print to stdout.
fn cmd_completions(shell: clap_complete::Shell) -> anyhow::Result<()> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, "attachment-archiver", &mut std::io::stdout());
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

/// Print the run report in a human-readable table.
fn print_report_table(report: &ExtractionReport, root: &Path, elapsed: std::time::Duration) {
    use humansize::{format_size, BINARY};

    println!();
    println!("  {:<25} {}", "Storage root", root.display());
    println!("  {:<25} {}", "Messages found", report.messages_total);
    println!("  {:<25} {}", "Messages archived", report.messages_processed);
    println!("  {:<25} {}", "Skipped (no sender)", report.messages_skipped);
    println!("  {:<25} {}", "Failed", report.messages_failed);
    println!("  {:<25} {}", "Attachments written", report.attachments_written);
    if report.attachments_skipped > 0 {
        println!("  {:<25} {}", "Unusable filenames", report.attachments_skipped);
    }
    if report.attachments_failed > 0 {
        println!("  {:<25} {}", "Write failures", report.attachments_failed);
    }
    println!(
        "  {:<25} {}",
        "Data written",
        format_size(report.bytes_written, BINARY)
    );
    if report.date_fallbacks > 0 {
        println!("  {:<25} {}", "Undated collisions", report.date_fallbacks);
    }
    if report.messages_marked_deleted > 0 {
        println!("  {:<25} {}", "Marked \\Deleted", report.messages_marked_deleted);
    }
    if report.expunged {
        println!("  {:<25} yes", "Expunged");
    }
    println!("  {:<25} {:.2?}", "Elapsed", elapsed);
    println!();
}

/// Print the run report as JSON.
fn print_report_json(report: &ExtractionReport) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(report)?);
    Ok(())
}
