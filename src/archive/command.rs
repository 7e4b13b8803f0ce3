use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Command;

use tracing::debug;

use crate::archive::{ArchiveAction, ArchiveOutcome};
use crate::permalink::item_url;

/// Placeholder replaced with the identifier.
pub const PLACEHOLDER_ID: &str = "{id}";
/// Placeholder replaced with the item permalink.
pub const PLACEHOLDER_URL: &str = "{url}";
/// Placeholder replaced with the archive output directory.
pub const PLACEHOLDER_OUT: &str = "{out}";

/// Runs an external program per item (screenshotter, media downloader).
///
/// Argument templates may contain `{id}`, `{url}`, and `{out}`. Exit status
/// zero is success; anything else, including a failed spawn, is a failure
/// carrying the trimmed stderr.
#[derive(Clone, Debug)]
pub struct CommandAction {
    name: String,
    program: OsString,
    args: Vec<String>,
    output_dir: PathBuf,
    success_detail: String,
}

impl CommandAction {
    /// Run `program` for each item, writing into `output_dir`.
    pub fn new(
        name: impl Into<String>,
        program: impl Into<OsString>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        let name = name.into();
        Self {
            success_detail: format!("{name} completed"),
            name,
            program: program.into(),
            args: Vec::new(),
            output_dir: output_dir.into(),
        }
    }

    /// Argument templates, in order.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Detail reported on success.
    pub fn with_success_detail(mut self, detail: impl Into<String>) -> Self {
        self.success_detail = detail.into();
        self
    }

    fn render_args(&self, id: &str) -> Vec<String> {
        let url = item_url(id);
        let out = self.output_dir.to_string_lossy();
        self.args
            .iter()
            .map(|arg| {
                arg.replace(PLACEHOLDER_ID, id)
                    .replace(PLACEHOLDER_URL, &url)
                    .replace(PLACEHOLDER_OUT, &out)
            })
            .collect()
    }
}

impl ArchiveAction for CommandAction {
    fn name(&self) -> &str {
        &self.name
    }

    fn archive(&mut self, id: &str) -> ArchiveOutcome {
        if let Err(err) = std::fs::create_dir_all(&self.output_dir) {
            return ArchiveOutcome::Failure(format!(
                "failed creating output dir {}: {err}",
                self.output_dir.display()
            ));
        }
        let args = self.render_args(id);
        debug!(step = %self.name, identifier = %id, ?args, "running archival command");
        let output = match Command::new(&self.program).args(&args).output() {
            Ok(output) => output,
            Err(err) => {
                return ArchiveOutcome::Failure(format!(
                    "failed spawning {}: {err}",
                    self.program.to_string_lossy()
                ));
            }
        };
        if output.status.success() {
            ArchiveOutcome::Success(self.success_detail.clone())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            ArchiveOutcome::Failure(format!("{}: {}", output.status, stderr.trim()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn renders_placeholders() {
        let action = CommandAction::new("media", "gallery-dl", "/tmp/out")
            .with_args(["-D", "{out}", "{url}", "--tag={id}"]);
        assert_eq!(
            action.render_args("42"),
            [
                "-D",
                "/tmp/out",
                "https://x.com/i/web/status/42",
                "--tag=42"
            ]
        );
    }

    #[test]
    fn missing_program_is_failure() {
        let temp = tempdir().unwrap();
        let mut action = CommandAction::new("x", "definitely-not-a-real-binary-xyz", temp.path());
        assert!(!action.archive("1").is_success());
    }

    #[cfg(unix)]
    #[test]
    fn exit_status_decides_outcome() {
        let temp = tempdir().unwrap();
        let mut ok = CommandAction::new("touch", "sh", temp.path())
            .with_args(["-c", "touch \"$0/$1\"", "{out}", "{id}.done"])
            .with_success_detail("Screenshot completed");
        assert_eq!(
            ok.archive("9"),
            ArchiveOutcome::Success("Screenshot completed".into())
        );
        assert!(temp.path().join("9.done").exists());

        let mut failing = CommandAction::new("fail", "sh", temp.path())
            .with_args(["-c", "echo rate limited >&2; exit 3"]);
        let (success, detail) = failing.archive("9").into_parts();
        assert!(!success);
        assert!(detail.contains("rate limited"));
    }
}
