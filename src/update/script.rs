//! Renders a [`ScriptPlan`] into batch or POSIX shell text.
//!
//! All paths are double-quoted. Batch scripts use CRLF line endings.

use super::plan::{BatchStep, DeploymentMode, PlanSteps, PosixStep, ScriptPlan};
use std::path::Path;

/// Render `plan` in the language its steps were planned for.
pub fn render(plan: &ScriptPlan) -> String {
    match &plan.steps {
        PlanSteps::Batch(steps) => render_batch(plan, steps),
        PlanSteps::Posix(steps) => render_posix(plan, steps),
    }
}

fn render_batch(plan: &ScriptPlan, steps: &[BatchStep]) -> String {
    let script = batch_quote(&plan.script_path.display().to_string());
    let mut lines = vec!["@echo off".to_string()];

    lines.extend(steps.iter().map(|step| match step {
        BatchStep::ChangeDirectory(dir) => format!("cd /d {}", batch_path(dir)),
        BatchStep::StopService(name) => format!("sc stop {}", batch_quote(name)),
        BatchStep::ArchiveExecutable { from, to } => {
            format!("ren {} {}", batch_quote(from), batch_quote(to))
        }
        BatchStep::InstallExecutable { from, to } => {
            format!("ren {} {}", batch_path(from), batch_quote(to))
        }
        BatchStep::StartService(name) => format!("sc start {}", batch_quote(name)),
        BatchStep::Relaunch(command_line) => {
            let args: Vec<String> = command_line.iter().map(|a| batch_quote(a)).collect();
            format!("start \"\" {}", args.join(" "))
        }
        BatchStep::DeleteSelf => format!("del {script}"),
    }));

    lines.push("exit".to_string());
    let mut text = lines.join("\r\n");
    text.push_str("\r\n");
    text
}

fn render_posix(plan: &ScriptPlan, steps: &[PosixStep]) -> String {
    let script = posix_quote(&plan.script_path.display().to_string());
    let shebang = match plan.mode {
        DeploymentMode::LinuxSystemdService => "#!/bin/bash",
        _ => "#!/bin/sh",
    };
    let mut lines = vec![shebang.to_string()];

    lines.extend(steps.iter().map(|step| match step {
        PosixStep::ChangeDirectory(dir) => format!("cd {}", posix_path(dir)),
        PosixStep::Sleep(delay) => format!("sleep {}", delay.as_secs_f64()),
        PosixStep::ArchiveExecutable { from, to } => {
            format!("mv {} {}", posix_quote(from), posix_quote(to))
        }
        PosixStep::InstallExecutable { from, to } => {
            format!("mv {} {}", posix_path(from), posix_quote(to))
        }
        PosixStep::MakeExecutable(name) => format!("chmod u+x {}", posix_quote(name)),
        PosixStep::Relaunch(command_line) => {
            let args: Vec<String> = command_line.iter().map(|a| posix_quote(a)).collect();
            format!("nohup {} > /dev/null 2>&1 &", args.join(" "))
        }
        PosixStep::DeleteSelfThenRestart(name) => {
            format!("( rm {script} ; systemctl restart {} )", posix_quote(name))
        }
        PosixStep::DeleteSelf => format!("rm {script}"),
    }));

    if plan.mode.exits_after_handoff() {
        lines.push("exit 0".to_string());
    }
    let mut text = lines.join("\n");
    text.push('\n');
    text
}

fn batch_path(path: &Path) -> String {
    batch_quote(&path.display().to_string())
}

fn batch_quote(value: &str) -> String {
    format!("\"{}\"", value.replace('"', ""))
}

fn posix_path(path: &Path) -> String {
    posix_quote(&path.display().to_string())
}

fn posix_quote(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for c in value.chars() {
        if matches!(c, '"' | '\\' | '$' | '`') {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::update::plan::PlanInputs;
    use chrono::{Local, TimeZone};
    use std::path::PathBuf;

    fn plan(mode: DeploymentMode, exe: &str, temp: &str, script: &str) -> ScriptPlan {
        ScriptPlan::build(&PlanInputs {
            mode,
            executable: PathBuf::from(exe),
            temp_path: PathBuf::from(temp),
            script_path: PathBuf::from(script),
            service_name: "myapp".to_string(),
            command_line: vec![exe.to_string(), "serve".to_string()],
            now: Local.with_ymd_and_hms(2024, 3, 5, 14, 7, 9).unwrap(),
        })
    }

    fn linux(mode: DeploymentMode) -> String {
        render(&plan(mode, "/opt/myapp/myapp", "/opt/myapp/staged-upload", "/opt/myapp/handoff"))
    }

    fn windows(mode: DeploymentMode) -> String {
        render(&plan(
            mode,
            "C:/Services/myapp/myapp.exe",
            "C:/Services/myapp/staged-upload",
            "C:/Services/myapp/handoff.bat",
        ))
    }

    fn assert_in_order(text: &str, needles: &[&str]) {
        let mut from = 0;
        for needle in needles {
            let found = text[from..]
                .find(needle)
                .unwrap_or_else(|| panic!("'{needle}' not found in order in:\n{text}"));
            from += found + needle.len();
        }
    }

    #[test]
    fn test_linux_command_line_order() {
        let text = linux(DeploymentMode::LinuxCommandLine);
        assert!(text.starts_with("#!/bin/sh\n"));
        assert_in_order(
            &text,
            &[
                "cd \"/opt/myapp\"",
                "sleep 0.3",
                "mv \"myapp\" \"myapp-2024-03-05-140709\"",
                "mv \"/opt/myapp/staged-upload\" \"myapp\"",
                "chmod u+x \"myapp\"",
                "sleep 0.3",
                "nohup \"/opt/myapp/myapp\" \"serve\"",
                "rm \"/opt/myapp/handoff\"",
                "exit 0",
            ],
        );
    }

    #[test]
    fn test_systemd_removes_script_before_restart() {
        let text = linux(DeploymentMode::LinuxSystemdService);
        assert!(text.starts_with("#!/bin/bash\n"));
        assert!(text.contains("( rm \"/opt/myapp/handoff\" ; systemctl restart \"myapp\" )"));
        assert!(!text.contains("sleep"));
        assert!(!text.contains("exit"));
    }

    #[test]
    fn test_windows_service_order() {
        let text = windows(DeploymentMode::WindowsService);
        assert!(text.contains("\r\n"));
        assert_in_order(
            &text,
            &[
                "cd /d \"C:/Services/myapp\"",
                "sc stop \"myapp\"",
                "ren \"myapp.exe\" \"myapp.exe-2024-03-05-140709\"",
                "ren \"C:/Services/myapp/staged-upload\" \"myapp.exe\"",
                "sc start \"myapp\"",
                "del \"C:/Services/myapp/handoff.bat\"",
                "exit",
            ],
        );
        assert!(!text.contains("chmod"));
    }

    #[test]
    fn test_windows_command_line_relaunches() {
        let text = windows(DeploymentMode::WindowsCommandLine);
        assert!(!text.contains("sc stop"));
        assert_in_order(
            &text,
            &["ren ", "ren ", "start \"\" \"C:/Services/myapp/myapp.exe\" \"serve\"", "del "],
        );
    }

    #[test]
    fn test_posix_quoting_escapes_specials() {
        assert_eq!(posix_quote("a \"b\" $c"), "\"a \\\"b\\\" \\$c\"");
    }
}
