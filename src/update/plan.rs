//! Hand-off plans.
//!
//! A running executable cannot replace itself, so the swap is delegated to a short script.
//! [`ScriptPlan::build`] decides *what* that script does for a [`DeploymentMode`];
//! [`crate::update::script`] decides how each step is spelled for the interpreter.

use chrono::{DateTime, Local};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants::{ARCHIVE_TIMESTAMP_FORMAT, SCRIPT_SETTLE_DELAY};

/// How the process is hosted, which selects the hand-off variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeploymentMode {
    WindowsService,
    WindowsCommandLine,
    LinuxSystemdService,
    LinuxCommandLine,
}

impl DeploymentMode {
    /// Whether a service manager restarts the process.
    pub const fn is_service(self) -> bool {
        matches!(self, Self::WindowsService | Self::LinuxSystemdService)
    }

    /// Script language for this mode.
    pub const fn interpreter(self) -> Interpreter {
        match self {
            Self::WindowsService | Self::WindowsCommandLine => Interpreter::Batch,
            Self::LinuxSystemdService | Self::LinuxCommandLine => Interpreter::Posix,
        }
    }

    /// Whether the current process must exit after launching the script.
    ///
    /// Under systemd the script restarts the unit, which stops this process.
    pub const fn exits_after_handoff(self) -> bool {
        !matches!(self, Self::LinuxSystemdService)
    }
}

impl fmt::Display for DeploymentMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::WindowsService => "Windows service",
            Self::WindowsCommandLine => "Windows command line",
            Self::LinuxSystemdService => "Linux systemd service",
            Self::LinuxCommandLine => "Linux command line",
        };
        f.write_str(name)
    }
}

/// Script language.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interpreter {
    /// `cmd.exe` batch file, CRLF line endings
    Batch,
    /// `/bin/sh` (or `/bin/bash` for systemd units)
    Posix,
}

impl Interpreter {
    /// File extension of the generated script, if any.
    pub const fn extension(self) -> Option<&'static str> {
        match self {
            Self::Batch => Some("bat"),
            Self::Posix => None,
        }
    }
}

/// One line of a Windows batch hand-off.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchStep {
    ChangeDirectory(PathBuf),
    StopService(String),
    /// Rename the running executable out of the way.
    ArchiveExecutable { from: String, to: String },
    /// Move the staged upload into the executable's place.
    InstallExecutable { from: PathBuf, to: String },
    StartService(String),
    /// Start the new build with the original command line.
    Relaunch(Vec<String>),
    DeleteSelf,
}

/// One line of a POSIX shell hand-off.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PosixStep {
    ChangeDirectory(PathBuf),
    Sleep(Duration),
    ArchiveExecutable { from: String, to: String },
    InstallExecutable { from: PathBuf, to: String },
    MakeExecutable(String),
    Relaunch(Vec<String>),
    /// Delete the script and restart the unit in one subshell.
    DeleteSelfThenRestart(String),
    DeleteSelf,
}

/// Steps in the language of the script that will run them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanSteps {
    Batch(Vec<BatchStep>),
    Posix(Vec<PosixStep>),
}

impl PlanSteps {
    pub const fn interpreter(&self) -> Interpreter {
        match self {
            Self::Batch(_) => Interpreter::Batch,
            Self::Posix(_) => Interpreter::Posix,
        }
    }
}

/// Everything known about the running process that a plan depends on.
#[derive(Debug, Clone)]
pub struct PlanInputs {
    pub mode: DeploymentMode,
    pub executable: PathBuf,
    pub temp_path: PathBuf,
    pub script_path: PathBuf,
    pub service_name: String,
    pub command_line: Vec<String>,
    pub now: DateTime<Local>,
}

/// Ordered steps plus the script they will be rendered into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptPlan {
    pub mode: DeploymentMode,
    pub script_path: PathBuf,
    pub steps: PlanSteps,
}

impl ScriptPlan {
    /// Lay out the hand-off steps for `inputs.mode`.
    pub fn build(inputs: &PlanInputs) -> Self {
        let mode = inputs.mode;
        let exe_dir = inputs
            .executable
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let exe_name = inputs
            .executable
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let archived = format!("{exe_name}-{}", inputs.now.format(ARCHIVE_TIMESTAMP_FORMAT));

        let staged = inputs.temp_path.clone();
        let command_line = inputs.command_line.clone();
        let service = inputs.service_name.clone();

        let steps = match mode {
            DeploymentMode::WindowsService => PlanSteps::Batch(vec![
                BatchStep::ChangeDirectory(exe_dir),
                BatchStep::StopService(service.clone()),
                BatchStep::ArchiveExecutable { from: exe_name.clone(), to: archived },
                BatchStep::InstallExecutable { from: staged, to: exe_name.clone() },
                BatchStep::StartService(service),
                BatchStep::DeleteSelf,
            ]),
            DeploymentMode::WindowsCommandLine => PlanSteps::Batch(vec![
                BatchStep::ChangeDirectory(exe_dir),
                BatchStep::ArchiveExecutable { from: exe_name.clone(), to: archived },
                BatchStep::InstallExecutable { from: staged, to: exe_name.clone() },
                BatchStep::Relaunch(command_line),
                BatchStep::DeleteSelf,
            ]),
            DeploymentMode::LinuxSystemdService => PlanSteps::Posix(vec![
                PosixStep::ChangeDirectory(exe_dir),
                PosixStep::ArchiveExecutable { from: exe_name.clone(), to: archived },
                PosixStep::InstallExecutable { from: staged, to: exe_name.clone() },
                PosixStep::MakeExecutable(exe_name),
                PosixStep::DeleteSelfThenRestart(service),
            ]),
            DeploymentMode::LinuxCommandLine => PlanSteps::Posix(vec![
                PosixStep::ChangeDirectory(exe_dir),
                PosixStep::Sleep(SCRIPT_SETTLE_DELAY),
                PosixStep::ArchiveExecutable { from: exe_name.clone(), to: archived },
                PosixStep::InstallExecutable { from: staged, to: exe_name.clone() },
                PosixStep::MakeExecutable(exe_name),
                PosixStep::Sleep(SCRIPT_SETTLE_DELAY),
                PosixStep::Relaunch(command_line),
                PosixStep::DeleteSelf,
            ]),
        };

        Self {
            mode,
            script_path: inputs.script_path.clone(),
            steps,
        }
    }
}
