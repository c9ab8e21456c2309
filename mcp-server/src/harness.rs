// Reflection harness runner
//
// The harness is an opaque .NET child program that loads an assembly and
// invokes one method. It ships next to the server binary; debug mode is
// handled by the tool router launching the same command line as a session.

use std::path::{Path, PathBuf};

use tokio::process::Command;
use tracing::debug;

pub const HARNESS_DLL: &str = "MethodRunner.dll";

#[derive(Debug, Clone)]
pub struct InvokeRequest {
    pub assembly: String,
    pub type_name: String,
    pub method: String,
    pub args: Vec<String>,
    pub ctor_args: Vec<String>,
    pub cwd: Option<String>,
}

#[derive(Debug)]
pub struct HarnessOutput {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

/// The harness DLL, resolved under `harness/` next to the server executable.
pub fn harness_path() -> Result<PathBuf, String> {
    let exe = std::env::current_exe()
        .map_err(|e| format!("Cannot locate the server executable: {e}"))?;
    let dir = exe
        .parent()
        .ok_or_else(|| "Server executable has no parent directory".to_string())?;
    let path = dir.join("harness").join(HARNESS_DLL);
    if path.is_file() {
        Ok(path)
    } else {
        Err(format!(
            "Method harness not found at {}",
            path.display()
        ))
    }
}

/// Harness command line: `<assembly> <type> <method> [--ctor <v>]... [--arg <v>]...`
pub fn harness_args(request: &InvokeRequest) -> Vec<String> {
    let mut out = vec![
        request.assembly.clone(),
        request.type_name.clone(),
        request.method.clone(),
    ];
    for value in &request.ctor_args {
        out.push("--ctor".to_string());
        out.push(value.clone());
    }
    for value in &request.args {
        out.push("--arg".to_string());
        out.push(value.clone());
    }
    out
}

/// Run the harness as a plain child (no debugger) and capture its output.
pub async fn run_harness(request: &InvokeRequest) -> Result<HarnessOutput, String> {
    let harness = harness_path()?;
    debug!(assembly = %request.assembly, method = %request.method, "invoking harness");

    let mut command = Command::new("dotnet");
    command.arg(&harness).args(harness_args(request));
    if let Some(cwd) = &request.cwd {
        command.current_dir(cwd);
    }

    let output = command
        .output()
        .await
        .map_err(|e| format!("Failed to run the method harness: {e}"))?;

    Ok(HarnessOutput {
        exit_code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

/// Rebuild a project before a restart; the combined build output comes back
/// for the session's output buffer.
pub async fn run_dotnet_build(project_dir: &Path) -> Result<String, String> {
    let output = Command::new("dotnet")
        .arg("build")
        .current_dir(project_dir)
        .output()
        .await
        .map_err(|e| format!("Failed to run 'dotnet build': {e}"))?;

    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr);
    if !stderr.is_empty() {
        if !text.is_empty() {
            text.push('\n');
        }
        text.push_str(&stderr);
    }

    if output.status.success() {
        Ok(text)
    } else {
        Err(format!("dotnet build failed:\n{text}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn harness_args_keep_positional_then_flagged_order() {
        let request = InvokeRequest {
            assembly: "/bin/App.dll".to_string(),
            type_name: "App.Jobs.Mailer".to_string(),
            method: "SendAll".to_string(),
            args: vec!["batch=5".to_string()],
            ctor_args: vec!["smtp://localhost".to_string()],
            cwd: None,
        };

        let args = harness_args(&request);
        assert_eq!(
            args,
            vec![
                "/bin/App.dll",
                "App.Jobs.Mailer",
                "SendAll",
                "--ctor",
                "smtp://localhost",
                "--arg",
                "batch=5",
            ]
        );
    }

    #[test]
    fn harness_args_without_extras_are_positional_only() {
        let request = InvokeRequest {
            assembly: "App.dll".to_string(),
            type_name: "App.T".to_string(),
            method: "Run".to_string(),
            args: Vec::new(),
            ctor_args: Vec::new(),
            cwd: None,
        };
        assert_eq!(harness_args(&request), vec!["App.dll", "App.T", "Run"]);
    }
}
