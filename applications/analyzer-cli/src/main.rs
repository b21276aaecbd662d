/// Soul Analyze - audio format and EBU R128 loudness analysis
use anyhow::Context;
use clap::{Parser, Subcommand};
use soul_analyze::{
    analyze_files, report, summarize, AlbumReport, CliConfig, FileReport, FileScanner,
    FlagOverrides, OutputFormat,
};
use soul_analyzer::Analyzer;
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "soul-analyze")]
#[command(about = "Audio format and EBU R128 loudness analyzer", long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Print JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    /// Read metadata only, skip decoding
    #[arg(long, global = true)]
    no_decode: bool,

    /// Decode without measuring loudness
    #[arg(long, global = true)]
    no_loudness: bool,

    /// Also measure loudness range
    #[arg(long, global = true)]
    lra: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze individual files
    File {
        /// Audio files
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Analyze every track in a directory and summarize the album
    Album {
        /// Album directory
        dir: PathBuf,
    },
}

fn main() -> anyhow::Result<ExitCode> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "soul_analyze=info,soul_analyzer=warn,symphonia=error".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let mut config = CliConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    config.apply(FlagOverrides {
        no_decode: cli.no_decode,
        no_loudness: cli.no_loudness,
        lra: cli.lra,
        json: cli.json,
    });
    config.validate()?;

    let analyzer = Analyzer::new();
    let all_ok = match cli.command {
        Commands::File { paths } => analyze_paths(&analyzer, &config, &paths)?,
        Commands::Album { dir } => analyze_album(&analyzer, &config, &dir)?,
    };

    Ok(if all_ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn analyze_paths(analyzer: &Analyzer, config: &CliConfig, paths: &[PathBuf]) -> anyhow::Result<bool> {
    let reports = analyze_files(analyzer, paths, config.analysis.options());

    let mut out = std::io::stdout().lock();
    match config.output.format {
        OutputFormat::Json => report::write_json(&mut out, &reports[..])?,
        OutputFormat::Text => {
            for file in &reports {
                report::write_file_text(&mut out, file)?;
            }
        }
    }
    out.flush()?;

    Ok(reports.iter().all(FileReport::is_ok))
}

fn analyze_album(analyzer: &Analyzer, config: &CliConfig, dir: &std::path::Path) -> anyhow::Result<bool> {
    let paths = FileScanner::from_settings(&config.scan).scan_directory(dir)?;
    tracing::info!("Found {} tracks in {}", paths.len(), dir.display());

    // Album summaries always carry the loudness range
    let options = config.analysis.options().measure_range(true);
    let reports = analyze_files(analyzer, &paths, options);
    let summary = summarize(&reports);

    let mut out = std::io::stdout().lock();
    match config.output.format {
        OutputFormat::Json => report::write_json(
            &mut out,
            &AlbumReport {
                tracks: &reports,
                summary: summary.as_ref(),
            },
        )?,
        OutputFormat::Text => {
            for file in &reports {
                report::write_file_text(&mut out, file)?;
            }
            match &summary {
                Some(summary) => report::write_album_text(&mut out, summary)?,
                None => writeln!(out, "No tracks could be analyzed in {}", dir.display())?,
            }
        }
    }
    out.flush()?;

    Ok(reports.iter().all(FileReport::is_ok))
}
