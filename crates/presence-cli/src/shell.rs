//! Interactive session: one prompt, five concurrent workflows.
//!
//! Each submission runs as its own local task so a slow report never blocks
//! a registration. Notifications are printed by a renderer task watching the
//! single notification slot.

use crate::{acquire, render, stage};
use anyhow::Result;
use chrono::NaiveDate;
use clap::error::ErrorKind;
use clap::{value_parser, Arg, ArgMatches, CommandFactory, FromArgMatches, Parser, Subcommand, ValueEnum};
use presence_core::{
    AcquisitionManager, AttendanceService, CaptureError, CaptureTarget, Downloader,
    NotificationMessage, Operation, WorkflowController,
};
use std::path::PathBuf;
use std::rc::Rc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tokio::task::JoinHandle;

#[derive(Parser)]
#[command(no_binary_name = true, disable_version_flag = true)]
struct ShellLine {
    #[command(subcommand)]
    command: ShellCommand,
}

#[derive(Subcommand)]
enum ShellCommand {
    /// Stage an image file for a workflow
    Upload {
        #[arg(value_enum)]
        target: Target,
        path: PathBuf,
    },
    /// Submit the staged registration image
    Register {
        /// User ID to register
        user: Option<String>,
    },
    /// Submit the staged attendance image
    Log,
    /// Download the attendance report
    Report {
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    },
    /// List registered users
    List,
    /// Delete a user; without an ID nothing happens
    Delete { user: Option<String> },
    /// Show every workflow's state
    Status,
    /// Close the current notification
    Dismiss,
    /// Wait for pending submissions and leave
    #[command(alias = "exit")]
    Quit,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Target {
    Register,
    Attendance,
}

impl From<Target> for CaptureTarget {
    fn from(target: Target) -> Self {
        match target {
            Target::Register => CaptureTarget::Register,
            Target::Attendance => CaptureTarget::Attendance,
        }
    }
}

fn command(camera_available: bool) -> clap::Command {
    let command = ShellLine::command();
    if !camera_available {
        return command;
    }
    command.subcommand(
        clap::Command::new("capture")
            .about("Take one photo with the camera for a workflow")
            .arg(
                Arg::new("target")
                    .required(true)
                    .value_parser(value_parser!(Target)),
            ),
    )
}

enum Line {
    Capture(Target),
    Command(ShellCommand),
}

/// Parse one shell line. Words split like a POSIX shell, so quoted user IDs
/// may contain spaces.
fn parse(command: &clap::Command, line: &str) -> Result<Line, clap::Error> {
    let words = shlex::split(line)
        .ok_or_else(|| clap::Error::raw(ErrorKind::InvalidValue, "unterminated quote\n"))?;
    let matches = command.clone().try_get_matches_from(words)?;
    if let Some(capture) = matches.subcommand_matches("capture") {
        return Ok(Line::Capture(capture_target(capture)));
    }
    Ok(Line::Command(ShellLine::from_arg_matches(&matches)?.command))
}

fn capture_target(matches: &ArgMatches) -> Target {
    matches
        .get_one::<Target>("target")
        .copied()
        .unwrap_or(Target::Attendance)
}

pub async fn run<S, D>(
    controller: WorkflowController<S, D>,
    acquisition: AcquisitionManager,
    json: bool,
) -> Result<()>
where
    S: AttendanceService + 'static,
    D: Downloader + 'static,
{
    let controller = Rc::new(controller);
    let renderer = tokio::task::spawn_local(render_notifications(
        controller.notifications().subscribe(),
        json,
    ));
    let command = command(acquisition.camera_available());
    let mut pending: Vec<JoinHandle<()>> = Vec::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    eprintln!("presence shell; type `help` for commands");
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        pending.retain(|handle| !handle.is_finished());

        let parsed = match parse(&command, &line) {
            Ok(parsed) => parsed,
            Err(e) => {
                let _ = e.print();
                continue;
            }
        };

        let shell_command = match parsed {
            Line::Capture(target) => {
                let acquisition = acquisition.clone();
                let capture = tokio::task::spawn_blocking(move || acquire(&acquisition, None, true))
                    .await
                    .unwrap_or_else(|e| Err(CaptureError::Camera(e.to_string())));
                if stage(&controller, target.into(), capture) {
                    eprintln!("photo staged for {target:?}");
                }
                continue;
            }
            Line::Command(shell_command) => shell_command,
        };

        let c = Rc::clone(&controller);
        match shell_command {
            ShellCommand::Upload { target, path } => {
                if stage(&controller, target.into(), acquire(&acquisition, Some(&path), false)) {
                    eprintln!("{} staged for {target:?}", path.display());
                }
            }
            ShellCommand::Register { user } => pending.push(tokio::task::spawn_local(async move {
                c.register(user.as_deref().unwrap_or_default()).await;
            })),
            ShellCommand::Log => pending.push(tokio::task::spawn_local(async move {
                c.identify_and_log().await;
            })),
            ShellCommand::Report { from, to } => pending.push(tokio::task::spawn_local(async move {
                c.generate_report(from, to).await;
            })),
            ShellCommand::List => pending.push(tokio::task::spawn_local(async move {
                c.list_users().await;
            })),
            ShellCommand::Delete { user } => pending.push(tokio::task::spawn_local(async move {
                c.delete_user(user.as_deref()).await;
            })),
            ShellCommand::Status => print_status(&controller),
            ShellCommand::Dismiss => {
                controller.dismiss();
            }
            ShellCommand::Quit => break,
        }
    }

    for handle in pending {
        if let Err(e) = handle.await {
            tracing::warn!(error = %e, "submission task failed");
        }
    }
    drop(controller);
    if let Err(e) = renderer.await {
        tracing::warn!(error = %e, "renderer task failed");
    }
    Ok(())
}

/// Print every notification that lands in the slot until the slot closes.
async fn render_notifications(
    mut slot: watch::Receiver<Option<NotificationMessage>>,
    json: bool,
) {
    while slot.changed().await.is_ok() {
        let message = slot.borrow_and_update().clone();
        if let Some(message) = message {
            render::render(&message, json);
        }
    }
}

fn print_status<S, D>(controller: &WorkflowController<S, D>)
where
    S: AttendanceService,
    D: Downloader,
{
    for op in Operation::ALL {
        println!("{:<20} {:?}", op.label(), controller.state(op));
    }
    println!(
        "{:<20} register={} attendance={}",
        "Staged images",
        controller.has_staged(CaptureTarget::Register),
        controller.has_staged(CaptureTarget::Attendance)
    );
    if let Some(message) = controller.notifications().current() {
        println!("{:<20} {}", "Notification", message.body.replace('\n', " / "));
    }
}
