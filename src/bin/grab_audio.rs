#![forbid(unsafe_code)]

use anyhow::{Context, Result, bail};
use clap::Parser;
use std::{
    io::{self, BufRead, Write},
    path::{Path, PathBuf},
    process,
};
use tokio::signal;
use tracing_subscriber::EnvFilter;

use tubeaudio_tools::{
    BatchReport, DownloadStatus, Downloader, ExtractionBackend, ResolveError, Resolver,
    Selection, VideoRecord, YtDlp,
    config::{RuntimeOverrides, RuntimeSettings, resolve_runtime_settings},
    resolver::{ProbeOutcome, Resolution},
};

const RULE: &str = "================================================================================";
const URL_HINT: &str = "https://www.youtube.com/@channelname/videos";

/// Lists a channel's recent uploads and saves the chosen ones as audio files.
#[derive(Parser, Debug)]
#[command(name = "grab_audio", version, about, long_about = None)]
struct Args {
    /// Channel name, handle, or listing URL. Prompted for when omitted.
    query: Option<String>,

    /// Name to search for when QUERY is a URL that lists nothing.
    #[arg(long, value_name = "NAME", requires = "query")]
    fallback_name: Option<String>,

    /// Selection to download without prompting: `all` or e.g. `1,3,5`.
    #[arg(short, long, value_name = "SPEC")]
    select: Option<String>,

    /// How many recent uploads to list.
    #[arg(short = 'n', long)]
    max_results: Option<usize>,

    /// Directory receiving the audio files.
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// yt-dlp executable to run.
    #[arg(long, value_name = "PATH")]
    yt_dlp: Option<PathBuf>,

    /// Directory or binary of ffmpeg, passed through to yt-dlp.
    #[arg(long, value_name = "PATH")]
    ffmpeg_location: Option<PathBuf>,

    /// Settings file read before the process environment.
    #[arg(long, value_name = "PATH", default_value = ".env")]
    env_file: PathBuf,

    /// Log resolver probes and backend activity to stderr.
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn overrides(&self) -> RuntimeOverrides {
        RuntimeOverrides {
            download_dir: self.output_dir.clone(),
            max_results: self.max_results,
            yt_dlp_path: self.yt_dlp.clone(),
            ffmpeg_location: self.ffmpeg_location.clone(),
            env_path: Some(self.env_file.clone()),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let settings = resolve_runtime_settings(args.overrides()).context("loading settings")?;

    // Prompts and yt-dlp runs block, so the session lives on the blocking
    // pool while this task waits for Ctrl+C.
    let session = tokio::task::spawn_blocking(move || run_session(&args, &settings));
    tokio::select! {
        joined = session => joined.context("session task failed")?,
        _ = interrupted() => {
            println!();
            println!();
            println!("Interrupted. Partially downloaded files may remain in the output directory.");
            process::exit(130);
        }
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

async fn interrupted() {
    if let Err(err) = signal::ctrl_c().await {
        eprintln!("Failed to install Ctrl+C handler: {}", err);
        std::future::pending::<()>().await;
    }
}

fn run_session(args: &Args, settings: &RuntimeSettings) -> Result<()> {
    println!("{RULE}");
    println!("Channel Audio Grabber");
    println!("{RULE}");

    let backend =
        YtDlp::new(&settings.yt_dlp_path).with_ffmpeg_location(settings.ffmpeg_location.clone());
    backend
        .ensure_available()
        .context("yt-dlp is required; install it or pass --yt-dlp")?;

    let query = match &args.query {
        Some(query) => query.trim().to_string(),
        None => prompt("\nChannel name or channel URL: ")?.unwrap_or_default(),
    };
    if query.is_empty() {
        println!("No channel name entered.");
        return Ok(());
    }

    println!("\nLooking up the latest uploads for '{query}'...");
    let resolver = Resolver::new(&backend, settings.max_results);
    let Some(resolution) = resolve_channel(&resolver, &query, args.fallback_name.as_deref())
    else {
        return Ok(());
    };

    render_listing(&resolution);

    let selection = match &args.select {
        Some(raw) => Selection::parse(raw).context("parsing --select")?,
        None => prompt_selection()?,
    };
    if selection == Selection::Quit {
        println!("Exiting.");
        return Ok(());
    }
    let chosen = selection.apply(&resolution.videos);
    if chosen.is_empty() {
        println!("Nothing selected.");
        return Ok(());
    }

    let downloader = Downloader::new(&backend, &settings.download_dir, settings.audio.clone());
    downloader
        .prepare()
        .context("preparing the output directory")?;

    println!("\nDownloading {} video(s)...", chosen.len());
    let report = downloader.download_batch(&chosen, &mut render_status);
    render_summary(&report, downloader.output_dir());

    let failed = report.failed().count();
    if failed > 0 {
        bail!("{failed} of {} downloads failed", report.items.len());
    }
    Ok(())
}

/// Reads one trimmed line. `None` means stdin is closed.
fn prompt(label: &str) -> Result<Option<String>> {
    print!("{label}");
    io::stdout().flush().context("flushing stdout")?;
    let mut line = String::new();
    let read = io::stdin()
        .lock()
        .read_line(&mut line)
        .context("reading from stdin")?;
    if read == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim().to_string()))
}

fn prompt_selection() -> Result<Selection> {
    println!("\nChoose videos to download: numbers separated by commas (e.g. 1,3,5) or 'all'.");
    println!("Enter 'q' to quit.");
    loop {
        let Some(input) = prompt("\nSelection: ")? else {
            return Ok(Selection::Quit);
        };
        match Selection::parse(&input) {
            Ok(selection) => return Ok(selection),
            Err(err) => println!("{err}"),
        }
    }
}

/// An unknown channel is reported with guidance, not treated as an error.
fn resolve_channel<B>(
    resolver: &Resolver<'_, B>,
    query: &str,
    fallback_name: Option<&str>,
) -> Option<Resolution>
where
    B: ExtractionBackend + ?Sized,
{
    let outcome = match fallback_name {
        Some(name) => resolver.resolve_with_fallback(query, name),
        None => resolver.resolve(query),
    };
    match outcome {
        Ok(resolution) => Some(resolution),
        Err(err) => {
            report_not_found(&err);
            None
        }
    }
}

fn report_not_found(err: &ResolveError) {
    let ResolveError::NotFound { attempts, .. } = err;
    if !attempts.is_empty() {
        println!("\nTried:");
        for attempt in attempts {
            let outcome = match &attempt.outcome {
                ProbeOutcome::Found(count) => format!("{count} videos"),
                ProbeOutcome::Empty => "no videos".to_string(),
                ProbeOutcome::Failed(message) => format!("failed: {message}"),
            };
            println!("  {:<14} {}  ({outcome})", attempt.strategy, attempt.url);
        }
    }
    println!("\nNo channel found. Check the name or enter the channel URL directly.");
    println!("Example: {URL_HINT}");
}

fn render_listing(resolution: &Resolution) {
    println!(
        "Channel URL: {} (via {})",
        resolution.listing_url, resolution.strategy
    );
    println!("\n{RULE}");
    println!("Found {} videos:", resolution.videos.len());
    println!("{RULE}\n");
    for video in &resolution.videos {
        println!("[{}] {}", video.index, video.title);
        println!("     Duration: {}", video.duration_label());
        println!("     URL: {}", video.url);
        println!();
    }
}

/// Keeps one line per video on screen, rewritten in place until the status
/// becomes terminal.
fn render_status(video: &VideoRecord, status: &DownloadStatus) {
    let mut stdout = io::stdout().lock();
    if *status == DownloadStatus::Starting {
        let _ = writeln!(stdout, "\n[{}] {}", video.index, video.title);
    }
    let _ = write!(stdout, "\r\x1b[2K  {status}");
    if status.is_terminal() {
        let _ = writeln!(stdout);
    }
    let _ = stdout.flush();
}

fn render_summary(report: &BatchReport, output_dir: &Path) {
    println!("\n{RULE}");
    for (item, path) in report.succeeded() {
        println!("ok    [{}] {} -> {}", item.index, item.title, path.display());
    }
    for (item, err) in report.failed() {
        println!("fail  [{}] {}: {}", item.index, item.title, err);
    }
    println!("{RULE}");
    println!(
        "{} of {} downloads finished. Files are in '{}'.",
        report.succeeded().count(),
        report.items.len(),
        output_dir.display()
    );
}
