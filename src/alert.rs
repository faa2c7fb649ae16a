/// Operator alert: spawn an external notifier (popup, notify-send, wall)
/// before tearing the session down, so the operator is warned before both
/// browser windows disappear.
///
/// Advisory only — a failed or missing notifier never blocks the restart.
use tokio::process::Command;

/// Build notifier arguments, replacing `{reason}` placeholders with the
/// failure description.
fn build_args(args: &[String], reason: &str) -> Vec<String> {
    args.iter().map(|arg| arg.replace("{reason}", reason)).collect()
}

/// Fire the configured alert command. An empty command disables alerting.
///
/// The notifier is not awaited (a blocking popup would stall the teardown);
/// the dropped handle is reaped by the runtime when the notifier exits.
pub fn notify(command: &[String], reason: &str) {
    let Some((program, args)) = command.split_first() else {
        return;
    };

    let args = build_args(args, reason);
    match Command::new(program).args(&args).spawn() {
        Ok(child) => {
            tracing::info!(pid = child.id(), command = %program, reason, "operator alert dispatched")
        }
        Err(e) => tracing::warn!(command = %program, error = %e, "failed to spawn alert command"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_args_replaces_reason_placeholder() {
        let args = vec![
            "Watchdog alert: {reason}".to_string(),
            "--urgency".to_string(),
            "critical".to_string(),
        ];
        let built = build_args(&args, "freeze/no heartbeat");
        assert_eq!(
            built,
            vec!["Watchdog alert: freeze/no heartbeat", "--urgency", "critical"]
        );
    }

    #[test]
    fn test_build_args_without_placeholder() {
        let args = vec!["static message".to_string()];
        assert_eq!(build_args(&args, "unused"), vec!["static message"]);
    }

    #[tokio::test]
    async fn test_notify_empty_command_is_disabled() {
        notify(&[], "unexpected exit");
    }

    #[tokio::test]
    async fn test_notify_missing_binary_does_not_panic() {
        notify(&["nonexistent-notifier-xyz".to_string()], "window closed");
    }

    #[tokio::test]
    async fn test_notify_spawns_command() {
        notify(&["true".to_string()], "unexpected exit");
    }
}
