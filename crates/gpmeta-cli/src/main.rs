use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::Level;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use gpmeta_core::{ProcessOptions, RetirePolicy, UNKNOWN_TOTAL};

#[derive(Parser)]
#[command(
    name = "gpmeta",
    version,
    about = "Write Google Photos Takeout JSON metadata back into the media files"
)]
struct Cli {
    /// Extracted Takeout directory
    root: PathBuf,

    /// Delete a sidecar whenever its media file was found, even if nothing could be written
    #[arg(long)]
    lenient_retire: bool,

    /// Additional localized "edited" suffix (repeatable), e.g. -modifié
    #[arg(long = "edited-suffix", value_name = "SUFFIX")]
    edited_suffixes: Vec<String>,

    /// Show what would be written and deleted without touching any file
    #[arg(long)]
    dry_run: bool,

    /// Increase log verbosity (-v info, -vv debug); RUST_LOG overrides
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn setup_logging(verbose: u8) {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        _ => Level::DEBUG,
    };
    let env_filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);
    let t_total = std::time::Instant::now();

    if !cli.root.is_dir() {
        bail!("{} is not a directory", cli.root.display());
    }

    let options = ProcessOptions {
        root: cli.root,
        retire_policy: if cli.lenient_retire {
            RetirePolicy::Lenient
        } else {
            RetirePolicy::RequireFusion
        },
        edited_suffixes: cli.edited_suffixes,
        dry_run: cli.dry_run,
    };

    let bar_style = ProgressStyle::default_bar().template("[{bar:40}] {pos}/{len} {msg}")?;
    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner} {msg}")?);

    let result = gpmeta_core::process(&options, &|stage, current, total, message| {
        if total == UNKNOWN_TOTAL {
            pb.set_message(format!("{} ({} entries)", message, current));
            pb.tick();
            return;
        }
        if stage == "fuse" && pb.length() != Some(total) {
            pb.set_style(bar_style.clone());
            pb.set_length(total);
        }
        pb.set_position(current);
        pb.set_message(message.to_string());
    })
    .with_context(|| format!("cannot scan {}", options.root.display()))?;
    pb.finish_and_clear();

    eprintln!(
        "Done{}! {} sidecars: {} retired, {} kept; {} media files and {} variants updated, {} failures ({:.2}s)",
        if options.dry_run { " (dry run)" } else { "" },
        result.sidecars_found,
        result.sidecars_retired,
        result.sidecars_kept,
        result.media_fused,
        result.variants_fused,
        result.failures,
        t_total.elapsed().as_secs_f64()
    );

    Ok(())
}
