use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;

use archiver_core::{CommitTarget, Timestamp};
use archiver_engine::{VcsError, VersionControl};
use archiver_logging::{archiver_debug, archiver_info};
use chrono::{DateTime, SecondsFormat};

use crate::config::GitConfig;

/// [`VersionControl`] over the `git` executable.
#[derive(Debug, Clone)]
pub struct GitCli {
    executable: PathBuf,
    repository: PathBuf,
    branch: Option<String>,
    user_name: Option<String>,
    user_email: Option<String>,
    staging_step_size: usize,
}

impl GitCli {
    pub fn new(config: &GitConfig) -> Self {
        Self {
            executable: config
                .executable
                .clone()
                .unwrap_or_else(|| PathBuf::from("git")),
            repository: config.path.clone(),
            branch: config.branch.clone(),
            user_name: config.user_name.clone(),
            user_email: config.user_email.clone(),
            staging_step_size: config.staging_step_size.max(1),
        }
    }

    pub fn repository(&self) -> &Path {
        &self.repository
    }

    pub fn exists(&self) -> bool {
        self.repository.join(".git").exists()
    }

    /// Creates the repository, and its directory, if missing.
    pub fn init(&self) -> Result<(), VcsError> {
        if self.exists() {
            return Ok(());
        }
        archiver_info!("create git repository {:?}", self.repository);
        std::fs::create_dir_all(&self.repository).map_err(|source| VcsError::Spawn {
            command: "mkdir".to_string(),
            source,
        })?;
        let mut args: Vec<OsString> = vec!["init".into(), "--quiet".into()];
        if let Some(branch) = &self.branch {
            args.push(format!("--initial-branch={branch}").into());
        }
        self.run(&args, &[])?;
        Ok(())
    }

    fn run(&self, args: &[OsString], env: &[(&str, String)]) -> Result<String, VcsError> {
        let mut command = Command::new(&self.executable);
        command.current_dir(&self.repository);
        if let Some(name) = &self.user_name {
            command.arg("-c").arg(format!("user.name={name}"));
        }
        if let Some(email) = &self.user_email {
            command.arg("-c").arg(format!("user.email={email}"));
        }
        command.args(args);
        for (key, value) in env {
            command.env(key, value);
        }

        let display = describe(args);
        archiver_debug!("run {display}");
        let output = command.output().map_err(|source| VcsError::Spawn {
            command: display.clone(),
            source,
        })?;
        if !output.status.success() {
            return Err(VcsError::Failed {
                command: display,
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn run_chunked(&self, head: &[&str], paths: &[&Path]) -> Result<(), VcsError> {
        for chunk in paths.chunks(self.staging_step_size) {
            let mut args: Vec<OsString> = head.iter().map(OsString::from).collect();
            args.push("--".into());
            args.extend(chunk.iter().map(|path| path.as_os_str().to_os_string()));
            self.run(&args, &[])?;
        }
        Ok(())
    }
}

impl VersionControl for GitCli {
    fn latest_commit_timestamp(&self) -> Result<Option<Timestamp>, VcsError> {
        if !self.exists() {
            return Ok(None);
        }
        let head = ["rev-parse", "--verify", "--quiet", "HEAD"].map(OsString::from);
        if self.run(&head, &[]).is_err() {
            return Ok(None);
        }
        let stdout = self.run(&["log", "-1", "--format=%ct"].map(OsString::from), &[])?;
        Ok(stdout.trim().parse().ok())
    }

    fn commit(
        &self,
        target: &CommitTarget,
        message: &str,
        timestamp: Timestamp,
    ) -> Result<(), VcsError> {
        self.init()?;
        let staged: Vec<&Path> = target
            .added()
            .iter()
            .chain(target.updated())
            .map(PathBuf::as_path)
            .collect();
        let removed: Vec<&Path> = target.deleted().iter().map(PathBuf::as_path).collect();
        self.run_chunked(&["add", "--all"], &staged)?;
        self.run_chunked(&["rm", "--cached", "--quiet", "--ignore-unmatch"], &removed)?;

        let date = DateTime::from_timestamp(timestamp, 0)
            .map(|time| time.to_rfc3339_opts(SecondsFormat::Secs, true))
            .unwrap_or_else(|| format!("{timestamp} +0000"));
        let env = [
            ("GIT_AUTHOR_DATE", date.clone()),
            ("GIT_COMMITTER_DATE", date),
        ];
        self.run(
            &[
                "commit".into(),
                "--quiet".into(),
                "--allow-empty".into(),
                "--message".into(),
                message.into(),
            ],
            &env,
        )?;
        Ok(())
    }
}

fn describe(args: &[OsString]) -> String {
    let mut text = String::from("git");
    for arg in args {
        text.push(' ');
        text.push_str(&arg.to_string_lossy());
    }
    text
}
