//! `run_app`: launch a program or script, or open a document.
//!
//! Executables start directly and scripts run through their interpreter.
//! Anything else (shortcuts, URLs, documents) is handed to the shell's
//! `start`, which opens it with the associated application.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use keyhook_core::KeyEvent;
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::{split_arguments, validate_existing_file};
use crate::application::action_registry::{
    Action, ActionContext, ActionError, ActionOutcome, ActionType, FieldSpec,
};

/// `CREATE_NO_WINDOW` process creation flag.
#[cfg(target_os = "windows")]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Launches an executable, or a script through its interpreter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunApplicationAction {
    pub file_path: String,
    pub arguments: String,
    /// Defaults to the directory containing `file_path`.
    pub working_directory: String,
    pub run_hidden: bool,
    pub wait_for_exit: bool,
}

static FIELDS: [FieldSpec<RunApplicationAction>; 5] = [
    FieldSpec::text("file_path", |a, v| a.file_path = v),
    FieldSpec::text("arguments", |a, v| a.arguments = v),
    FieldSpec::text("working_directory", |a, v| a.working_directory = v),
    FieldSpec::boolean("run_hidden", |a, v| a.run_hidden = v),
    FieldSpec::boolean("wait_for_exit", |a, v| a.wait_for_exit = v),
];

impl RunApplicationAction {
    pub fn new(file_path: impl Into<String>) -> Self {
        Self {
            file_path: file_path.into(),
            ..Self::default()
        }
    }

    /// Program and argument list, wrapping scripts in their interpreter and
    /// documents in a shell `start`.
    pub fn command_line(&self) -> (String, Vec<String>) {
        let args = split_arguments(&self.arguments);
        let extension = Path::new(&self.file_path)
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();

        let (program, prefix): (&str, &[&str]) = match extension.as_str() {
            "bat" | "cmd" => ("cmd", &["/C"]),
            "ps1" => ("powershell", &["-NoProfile", "-ExecutionPolicy", "Bypass", "-File"]),
            "vbs" => ("wscript", &[]),
            "" | "exe" | "com" => return (self.file_path.clone(), args),
            // `start` takes the window title first; `/WAIT` keeps the shell
            // alive until the opened application exits.
            _ if self.wait_for_exit => ("cmd", &["/C", "start", "", "/WAIT"]),
            _ => ("cmd", &["/C", "start", ""]),
        };

        let full = prefix
            .iter()
            .map(|s| s.to_string())
            .chain(std::iter::once(self.file_path.clone()))
            .chain(args)
            .collect();
        (program.to_string(), full)
    }

    fn working_dir(&self) -> Option<PathBuf> {
        if !self.working_directory.trim().is_empty() {
            return Some(PathBuf::from(&self.working_directory));
        }
        Path::new(&self.file_path)
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
    }

    fn build_command(&self) -> Command {
        let (program, args) = self.command_line();
        let mut command = Command::new(&program);
        command
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        if let Some(dir) = self.working_dir() {
            command.current_dir(dir);
        }
        #[cfg(target_os = "windows")]
        if self.run_hidden {
            command.creation_flags(CREATE_NO_WINDOW);
        }
        command
    }
}

#[async_trait]
impl Action for RunApplicationAction {
    fn type_id(&self) -> &'static str {
        Self::TYPE_ID
    }

    fn display_name(&self) -> &'static str {
        Self::DISPLAY_NAME
    }

    fn validate(&self) -> Result<(), ActionError> {
        validate_existing_file(&self.file_path)
    }

    async fn execute(&self, _event: &KeyEvent) -> Result<ActionOutcome, ActionError> {
        self.validate()?;

        let mut child = self.build_command().spawn()?;
        info!(file = %self.file_path, pid = ?child.id(), hidden = self.run_hidden, "process started");

        if !self.wait_for_exit {
            return Ok(ActionOutcome::Detached);
        }

        let status = child.wait().await?;
        if status.success() {
            debug!(file = %self.file_path, "process exited");
        } else {
            warn!(file = %self.file_path, code = ?status.code(), "process exited with failure");
        }
        Ok(ActionOutcome::Completed)
    }
}

impl ActionType for RunApplicationAction {
    const TYPE_ID: &'static str = "run_app";
    const DISPLAY_NAME: &'static str = "Run Application";

    fn fields() -> &'static [FieldSpec<Self>] {
        &FIELDS
    }

    fn from_context(_ctx: &ActionContext) -> Self {
        Self::default()
    }
}
