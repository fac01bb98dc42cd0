use clap::{Parser, Subcommand};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;

use fluent_postproc::config::PipelineConfig;
use fluent_postproc::layout::CaseFolder;
use fluent_postproc::models::{RunStatus, SeriesKind};
use fluent_postproc::pipeline::PostProcessor;
use fluent_postproc::progress::RunEvent;
use fluent_postproc::session::PostProcessingSession;
use fluent_postproc::template::TemplateWriter;
use fluent_postproc::viewer::ViewerError;

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

#[derive(Parser)]
#[command(name = "postproc")]
#[command(about = "Fluent post-processing - plane sweeps and force sheet from a CFD case", long_about = None)]
struct Cli {
    /// Pipeline configuration JSON (defaults plus environment overrides when omitted)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full post-processing chain on a case folder
    Run {
        /// Folder holding exactly one *.cas.h5 case file
        case_folder: PathBuf,
        /// Solver executable, overrides FLUENT_PATH and the config
        #[arg(long)]
        solver: Option<PathBuf>,
    },
    /// Check the case folder, configuration and template without running the solver
    Validate {
        /// Folder holding exactly one *.cas.h5 case file
        case_folder: PathBuf,
    },
    /// List the rendered images of one series
    Images {
        /// Processed case folder
        case_folder: PathBuf,
        /// front_vel, front_pressure, side_vel or side_pressure
        series: String,
    },
}

#[tokio::main]
async fn main() -> CliResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fluent_postproc=info".into()),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let config = PipelineConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Run { case_folder, solver } => cmd_run(config, &case_folder, solver).await,
        Commands::Validate { case_folder } => cmd_validate(config, &case_folder),
        Commands::Images { case_folder, series } => cmd_images(&case_folder, &series),
    }
}

async fn cmd_run(config: PipelineConfig, case_folder: &Path, solver: Option<PathBuf>) -> CliResult<()> {
    let mut processor = PostProcessor::new(Arc::new(config));
    if let Some(solver) = solver {
        processor = processor.with_solver(solver);
    }
    let session = PostProcessingSession::new(processor);

    let (tx, mut rx) = mpsc::unbounded_channel();
    let start = Instant::now();
    let run_id = session.start_run_with_events(case_folder, Some(tx)).await?;
    println!("Run {} started for {}", run_id, case_folder.display());

    while let Some(event) = rx.recv().await {
        match event {
            RunEvent::Stage(stage) => {
                println!("\n[{:>6.1}s] {:?}", start.elapsed().as_secs_f64(), stage);
            }
            RunEvent::Progress(pct) => {
                print!("\rSolver progress: {:>3}%", pct);
                io::stdout().flush()?;
            }
            RunEvent::Finished(_) | RunEvent::Failed(_) => break,
        }
    }
    println!();

    let snapshot = session.wait(&run_id).await?;
    match (&snapshot.status, &snapshot.outcome) {
        (RunStatus::Succeeded, Some(outcome)) => {
            println!("Images saved in: {}", outcome.output_dir.display());
            match &outcome.workbook {
                Some(path) => println!("Forces saved in: {}", path.display()),
                None => println!("No force reports, force sheet not written"),
            }
            for missing in &outcome.missing_reports {
                println!("Missing report: {}", missing);
            }
            println!("{}", serde_json::to_string_pretty(&outcome.summary)?);
            Ok(())
        }
        (status, _) => {
            let message = snapshot.error_message.clone().unwrap_or_default();
            Err(format!("Run ended {:?}: {}", status, message).into())
        }
    }
}

fn cmd_validate(config: PipelineConfig, case_folder: &Path) -> CliResult<()> {
    config.validate()?;
    let case = CaseFolder::locate(case_folder)?;
    println!("✓ Case file: {}", case.case_file().display());

    TemplateWriter::new(&config.template).verify_master()?;
    println!("✓ Template: {}", config.template.master.display());
    println!(
        "✓ Sweeps: {} side images, {} front images",
        config.side_sweep.count, config.front_sweep.count
    );
    Ok(())
}

fn cmd_images(case_folder: &Path, series: &str) -> CliResult<()> {
    let kind = SeriesKind::parse(series).ok_or_else(|| ViewerError::UnknownSeries(series.to_string()))?;
    let session = PostProcessingSession::new(PostProcessor::new(Arc::new(PipelineConfig::default())));
    let images = session.view_image_series(case_folder, kind)?;
    for image in &images.images {
        println!("{}", image.display());
    }
    println!("{} images", images.len());
    Ok(())
}
