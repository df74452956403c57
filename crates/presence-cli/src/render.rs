use presence_core::{Completion, NotificationMessage};

/// Text of the notification dialog for a remote outcome.
pub fn dialog(message: &NotificationMessage) -> String {
    format!("Notification\n{}", message.body)
}

/// Print a notification. Local alerts go to stderr; dialogs to stdout.
pub fn render(message: &NotificationMessage, json: bool) {
    if json {
        match serde_json::to_string(message) {
            Ok(line) => println!("{line}"),
            Err(e) => tracing::error!(error = %e, "failed to encode notification"),
        }
    } else if message.is_alert() {
        eprintln!("{}", message.body);
    } else {
        println!("{}", dialog(message));
    }
}

/// Process exit status: 0 done or aborted, 1 remote failure, 2 rejected
/// locally.
pub fn exit_status(completion: Completion) -> u8 {
    match completion {
        Completion::Success | Completion::Aborted => 0,
        Completion::Failure => 1,
        Completion::Invalid | Completion::Busy => 2,
    }
}
