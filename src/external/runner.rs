use super::ToolError;
use std::path::Path;
use std::process::Output;
use std::time::Duration;

/// Runs `program args...` with a timeout, returning raw output.
pub(super) async fn run(
    program: &str,
    args: &[String],
    dir: Option<&Path>,
    timeout: Duration,
) -> Result<Output, ToolError> {
    let cmd_str = format!("{} {}", program, args.join(" "));
    let mut command = tokio::process::Command::new(program);
    command.args(args).kill_on_drop(true);
    if let Some(dir) = dir {
        command.current_dir(dir);
    }
    tracing::debug!("Running: {}", cmd_str);

    match tokio::time::timeout(timeout, command.output()).await {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(e)) => Err(ToolError::exec_failed(cmd_str, e)),
        Err(_) => Err(ToolError::timeout(cmd_str, timeout)),
    }
}

/// Like [`run`], but only a zero exit is a success.
pub(super) async fn run_success(
    program: &str,
    args: &[String],
    dir: Option<&Path>,
    timeout: Duration,
) -> Result<Output, ToolError> {
    let output = run(program, args, dir, timeout).await?;
    if output.status.success() {
        Ok(output)
    } else {
        let cmd_str = format!("{} {}", program, args.first().map(String::as_str).unwrap_or(""));
        Err(ToolError::failed(cmd_str.trim_end(), &output))
    }
}

pub(super) fn strings(args: &[&str]) -> Vec<String> {
    args.iter().map(|s| s.to_string()).collect()
}
