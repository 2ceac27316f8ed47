//! Launches the hand-off script that swaps the running executable.
//!
//! The applier never touches the executable itself. It writes a script beside it, starts
//! the script detached from this process and then, except under systemd, exits so the
//! script can rename the file that is no longer in use.

use super::plan::{DeploymentMode, Interpreter, PlanInputs, ScriptPlan};
use super::script;
use crate::config::ConfigReader;
use crate::constants::keys;
use crate::core::HotError;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;
use sysinfo::{Pid, System};
use tracing::{debug, info};
use uuid::Uuid;

/// A launched hand-off script.
#[derive(Debug)]
#[must_use = "call finish() to let the hand-off script take over"]
pub struct Handoff {
    pub mode: DeploymentMode,
    pub script_path: PathBuf,
}

impl Handoff {
    /// Step aside for the script: exits with code 0 unless systemd restarts the unit.
    pub fn finish(self) {
        if self.mode.exits_after_handoff() {
            info!("Exiting so {} can replace the executable", self.script_path.display());
            std::process::exit(0);
        }
        info!("Waiting for systemd to restart the service");
    }
}

/// Builds, writes and launches hand-off scripts.
#[derive(Clone)]
pub struct PlatformUpdateApplier {
    config: Arc<dyn ConfigReader>,
    mode: Option<DeploymentMode>,
}

impl PlatformUpdateApplier {
    pub fn new(config: Arc<dyn ConfigReader>) -> Self {
        Self { config, mode: None }
    }

    /// Skip detection and use `mode`.
    pub fn with_mode(mut self, mode: DeploymentMode) -> Self {
        self.mode = Some(mode);
        self
    }

    /// Deployment mode in effect for the next apply.
    pub fn mode(&self) -> Result<DeploymentMode, HotError> {
        match self.mode {
            Some(mode) => Ok(mode),
            None => detect_mode(),
        }
    }

    /// Write the script for `temp_path` without running it.
    pub fn prepare(&self, temp_path: &Path) -> Result<ScriptPlan, HotError> {
        let mode = self.mode()?;
        let executable = PathBuf::from(self.config.require(keys::EXECUTABLE_FULL_NAME)?);
        let service_name = if mode.is_service() {
            self.config.require(keys::SERVICE_NAME)?
        } else {
            self.config.get_or_empty(keys::SERVICE_NAME)
        };

        let plan = ScriptPlan::build(&PlanInputs {
            mode,
            script_path: script_path_for(&executable, mode.interpreter()),
            executable,
            temp_path: temp_path.to_path_buf(),
            service_name,
            command_line: std::env::args().collect(),
            now: chrono::Local::now(),
        });

        let text = script::render(&plan);
        std::fs::write(&plan.script_path, text)
            .map_err(|e| HotError::io("write hand-off script", plan.script_path.display(), &e))?;
        make_runnable(&plan.script_path)?;

        debug!("Wrote {} hand-off script to {}", mode, plan.script_path.display());
        Ok(plan)
    }

    /// Write and launch the script for `temp_path`.
    pub fn apply(&self, temp_path: &Path) -> Result<Handoff, HotError> {
        let plan = self.prepare(temp_path)?;
        launch_detached(&plan)?;
        info!("Started hand-off script {} ({})", plan.script_path.display(), plan.mode);
        Ok(Handoff {
            mode: plan.mode,
            script_path: plan.script_path,
        })
    }
}

/// Detect how the current process is hosted.
pub fn detect_mode() -> Result<DeploymentMode, HotError> {
    mode_for(std::env::consts::OS, parent_process_name().as_deref())
}

/// Map an OS name and the parent process name to a [`DeploymentMode`].
pub fn mode_for(os: &str, parent: Option<&str>) -> Result<DeploymentMode, HotError> {
    let parent = parent.unwrap_or_default();
    match os {
        "windows" if parent.eq_ignore_ascii_case("services.exe") => {
            Ok(DeploymentMode::WindowsService)
        }
        "windows" => Ok(DeploymentMode::WindowsCommandLine),
        "linux" if parent == "systemd" => Ok(DeploymentMode::LinuxSystemdService),
        "linux" => Ok(DeploymentMode::LinuxCommandLine),
        other => Err(HotError::Platform { os: other.to_string() }),
    }
}

fn parent_process_name() -> Option<String> {
    let mut system = System::new();
    let pid = Pid::from_u32(std::process::id());
    system.refresh_process(pid);
    let parent = system.process(pid)?.parent()?;
    system.refresh_process(parent);
    system.process(parent).map(|p| p.name().to_string())
}

fn script_path_for(executable: &Path, interpreter: Interpreter) -> PathBuf {
    let dir = executable.parent().unwrap_or_else(|| Path::new("."));
    let name = Uuid::new_v4().to_string();
    match interpreter.extension() {
        Some(ext) => dir.join(format!("{name}.{ext}")),
        None => dir.join(name),
    }
}

#[cfg(unix)]
fn make_runnable(path: &Path) -> Result<(), HotError> {
    use std::os::unix::fs::PermissionsExt;

    let mut permissions = std::fs::metadata(path)
        .map_err(|e| HotError::io("read script permissions", path.display(), &e))?
        .permissions();
    permissions.set_mode(permissions.mode() | 0o700);
    std::fs::set_permissions(path, permissions)
        .map_err(|e| HotError::io("chmod u+x", path.display(), &e))
}

#[cfg(not(unix))]
fn make_runnable(_path: &Path) -> Result<(), HotError> {
    Ok(())
}

fn launch_detached(plan: &ScriptPlan) -> Result<(), HotError> {
    let mut command = match plan.mode.interpreter() {
        Interpreter::Batch => {
            let mut command = Command::new("cmd");
            command.arg("/C").arg(&plan.script_path);
            command
        }
        Interpreter::Posix => {
            let shell = match plan.mode {
                DeploymentMode::LinuxSystemdService => "/bin/bash",
                _ => "/bin/sh",
            };
            let mut command = Command::new(shell);
            command.arg(&plan.script_path);
            command
        }
    };

    command.stdin(Stdio::null()).stdout(Stdio::null()).stderr(Stdio::null());
    detach(&mut command);

    command
        .spawn()
        .map(drop)
        .map_err(|e| HotError::io("start hand-off script", plan.script_path.display(), &e))
}

#[cfg(unix)]
fn detach(command: &mut Command) {
    use std::os::unix::process::CommandExt;
    command.process_group(0);
}

#[cfg(windows)]
fn detach(command: &mut Command) {
    use std::os::windows::process::CommandExt;
    const DETACHED_PROCESS: u32 = 0x0000_0008;
    const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;
    command.creation_flags(DETACHED_PROCESS | CREATE_NEW_PROCESS_GROUP);
}

#[cfg(not(any(unix, windows)))]
fn detach(_command: &mut Command) {}
