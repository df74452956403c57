use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Arg, ArgAction, ArgMatches, CommandFactory, FromArgMatches, Parser, Subcommand};
use presence_client::RemoteServiceClient;
use presence_core::{
    AcquisitionManager, AttendanceService, CameraSupport, CaptureError, CaptureTarget, Completion,
    DirectoryDownloader, Downloader, ImageCapture, NotificationMessage, Operation,
    WorkflowController,
};
use presence_hw::CameraSession;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

mod config;
mod render;
mod shell;

use config::Config;

#[derive(Parser)]
#[command(name = "presence", version, about = "Face-recognition attendance client")]
struct Cli {
    /// Attendance backend base URL (overrides config and PRESENCE_BACKEND_URL)
    #[arg(long, global = true)]
    backend: Option<String>,
    /// Print notifications as JSON
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a face image under a user ID
    Register {
        /// User ID to register
        #[arg(short, long)]
        user: Option<String>,
        /// Image file to upload
        #[arg(short, long)]
        image: Option<PathBuf>,
    },
    /// Identify a face and log attendance for the matched user
    Log {
        /// Image file to upload
        #[arg(short, long)]
        image: Option<PathBuf>,
    },
    /// Download the attendance report for a date range
    Report {
        /// First day, YYYY-MM-DD
        #[arg(long)]
        from: Option<NaiveDate>,
        /// Last day, YYYY-MM-DD
        #[arg(long)]
        to: Option<NaiveDate>,
        /// Directory the CSV is saved into
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// List registered users
    List,
    /// Delete a registered user (prompts when no ID is given)
    Delete {
        /// User ID to delete
        user: Option<String>,
    },
    /// Interactive session
    Shell,
    /// Show camera support and capture devices
    Camera,
}

/// `--camera` exists only when the startup probe found a camera.
fn camera_arg() -> Arg {
    Arg::new("camera")
        .long("camera")
        .action(ArgAction::SetTrue)
        .conflicts_with("image")
        .help("Take the photo with the camera")
}

fn command(camera_available: bool) -> clap::Command {
    let command = Cli::command();
    if !camera_available {
        return command;
    }
    command
        .mut_subcommand("register", |sub| sub.arg(camera_arg()))
        .mut_subcommand("log", |sub| sub.arg(camera_arg()))
}

fn camera_requested(matches: &ArgMatches) -> bool {
    matches
        .subcommand()
        .and_then(|(_, sub)| sub.try_get_one::<bool>("camera").ok().flatten().copied())
        .unwrap_or(false)
}

/// Obtain a capture from a file or, when requested, a single camera shot.
pub(crate) fn acquire(
    acquisition: &AcquisitionManager,
    file: Option<&Path>,
    use_camera: bool,
) -> Result<Option<ImageCapture>, CaptureError> {
    if !use_camera {
        return acquisition.from_file(file);
    }
    let CameraSupport::Available { device } = acquisition.camera() else {
        return Err(CaptureError::CameraUnavailable);
    };
    let session = CameraSession::open(device).map_err(|e| CaptureError::Camera(e.to_string()))?;
    acquisition.capture_from_camera(session)
}

/// Stage a capture for `target`; acquisition problems become a local alert.
pub(crate) fn stage<S, D>(
    controller: &WorkflowController<S, D>,
    target: CaptureTarget,
    capture: Result<Option<ImageCapture>, CaptureError>,
) -> bool
where
    S: AttendanceService,
    D: Downloader,
{
    match capture {
        Ok(Some(capture)) => {
            controller.stage(target, capture);
            true
        }
        Ok(None) => false,
        Err(e) => {
            let op = match target {
                CaptureTarget::Register => Operation::Register,
                CaptureTarget::Attendance => Operation::IdentifyAndLog,
            };
            tracing::warn!(error = %e, "image acquisition failed");
            controller
                .notifications()
                .show(NotificationMessage::alert(op, format!("Could not use image: {e}")));
            false
        }
    }
}

fn prompt(question: &str) -> Option<String> {
    print!("{question} ");
    std::io::stdout().flush().ok()?;
    let mut line = String::new();
    match std::io::stdin().read_line(&mut line) {
        Ok(0) | Err(_) => None,
        Ok(_) => Some(line.trim().to_string()),
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let mut config = Config::load()?;
    let camera = presence_hw::probe(config.camera_enabled, config.camera_device.as_deref());

    let matches = command(camera.is_available()).get_matches();
    let cli = Cli::from_arg_matches(&matches).unwrap_or_else(|e| e.exit());
    let use_camera = camera_requested(&matches);

    if let Some(backend) = cli.backend {
        config.backend_url = backend;
    }
    if let Commands::Report { out: Some(dir), .. } = &cli.command {
        config.download_dir = dir.clone();
    }

    let acquisition = AcquisitionManager::new(camera);
    if let Commands::Camera = cli.command {
        print_camera(&acquisition);
        return Ok(ExitCode::SUCCESS);
    }

    let client = RemoteServiceClient::new(&config.backend_url)
        .with_context(|| format!("cannot use backend {:?}", config.backend_url))?;
    tracing::debug!(backend = client.base_url(), "client ready");
    let controller = WorkflowController::new(client, DirectoryDownloader::new(&config.download_dir));

    let completion = match cli.command {
        Commands::Register { user, image } => {
            stage(
                &controller,
                CaptureTarget::Register,
                acquire(&acquisition, image.as_deref(), use_camera),
            );
            match controller.notifications().current() {
                Some(alert) if alert.is_alert() => Completion::Invalid,
                _ => controller.register(user.as_deref().unwrap_or_default()).await,
            }
        }
        Commands::Log { image } => {
            stage(
                &controller,
                CaptureTarget::Attendance,
                acquire(&acquisition, image.as_deref(), use_camera),
            );
            match controller.notifications().current() {
                Some(alert) if alert.is_alert() => Completion::Invalid,
                _ => controller.identify_and_log().await,
            }
        }
        Commands::Report { from, to, .. } => controller.generate_report(from, to).await,
        Commands::List => controller.list_users().await,
        Commands::Delete { user } => {
            let confirmation = user.or_else(|| prompt("Enter the User ID to delete:"));
            controller.delete_user(confirmation.as_deref()).await
        }
        Commands::Shell => {
            let local = tokio::task::LocalSet::new();
            local
                .run_until(shell::run(controller, acquisition, cli.json))
                .await?;
            return Ok(ExitCode::SUCCESS);
        }
        Commands::Camera => return Ok(ExitCode::SUCCESS),
    };

    if let Some(message) = controller.dismiss() {
        render::render(&message, cli.json);
    }
    Ok(ExitCode::from(render::exit_status(completion)))
}

fn print_camera(acquisition: &AcquisitionManager) {
    match acquisition.camera() {
        CameraSupport::Available { device } => println!("camera: available ({device})"),
        CameraSupport::Unavailable => println!("camera: unavailable"),
    }
    for dev in presence_hw::list_devices() {
        println!("  {} {} [{}] {}", dev.path, dev.name, dev.driver, dev.bus);
    }
}
