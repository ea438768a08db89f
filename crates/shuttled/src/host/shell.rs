//! Child processes spawned on behalf of capability requests.

use std::path::Path;
use std::process::{Command, Output, Stdio};

use tracing::debug;

use shuttle_broker::CapabilityError;
use shuttle_broker::capability::repo_name_from_remote;

const SHELL_TARGET: &str = "shuttled::shell";

/// Branch name reported when `dir` is not inside a repository.
pub const NO_BRANCH: &str = "NONE";

/// Runs `command` through the platform shell and returns its stdout lines.
///
/// A non-zero exit status is not an error; whatever the command printed is
/// returned.
pub fn run_shell(command: &str, cwd: &Path) -> Result<Vec<String>, CapabilityError> {
    let mut shell = platform_shell(command);
    shell.current_dir(cwd);
    let output = capture(&mut shell, command)?;
    debug!(
        target: SHELL_TARGET,
        command,
        status = ?output.status.code(),
        "shell command finished"
    );
    Ok(stdout_lines(&output))
}

#[cfg(windows)]
fn platform_shell(command: &str) -> Command {
    let mut shell = Command::new("cmd");
    shell.args(["/C", command]);
    shell
}

#[cfg(not(windows))]
fn platform_shell(command: &str) -> Command {
    let mut shell = Command::new("bash");
    shell.args(["-lc", command]);
    shell
}

/// `git diff` for `dir`: the working tree against the index, or only the
/// staged changes when `include_unstaged` is false.
pub fn git_diff(dir: &Path, include_unstaged: bool) -> Result<Vec<String>, CapabilityError> {
    let args: &[&str] = if include_unstaged {
        &["diff"]
    } else {
        &["diff", "--staged"]
    };
    let output = git(dir, args)?;
    Ok(stdout_lines(&output))
}

/// The checked-out branch of the repository containing `dir`.
pub fn git_branch(dir: &Path) -> Result<String, CapabilityError> {
    let output = git(dir, &["rev-parse", "--abbrev-ref", "HEAD"])?;
    let branch = String::from_utf8_lossy(&output.stdout).trim().to_owned();
    if output.status.success() && !branch.is_empty() {
        Ok(branch)
    } else {
        Ok(String::from(NO_BRANCH))
    }
}

/// `owner/name` of the `origin` remote, if one is configured.
pub fn git_repo_name(dir: &Path) -> Result<Option<String>, CapabilityError> {
    let output = git(dir, &["config", "--get", "remote.origin.url"])?;
    if !output.status.success() {
        return Ok(None);
    }
    Ok(repo_name_from_remote(String::from_utf8_lossy(&output.stdout).trim()))
}

fn git(dir: &Path, args: &[&str]) -> Result<Output, CapabilityError> {
    let mut git = Command::new("git");
    git.arg("-C").arg(dir).args(args);
    let label = format!("git -C {} {}", dir.display(), args.join(" "));
    capture(&mut git, &label)
}

fn capture(command: &mut Command, label: &str) -> Result<Output, CapabilityError> {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .map_err(|error| CapabilityError::Command {
            command: label.to_owned(),
            message: error.to_string(),
        })
}

fn stdout_lines(output: &Output) -> Vec<String> {
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(str::to_owned)
        .collect()
}
