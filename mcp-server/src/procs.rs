// OS process and socket inspection
//
// Process-tree queries shell out to ps, port states to ss; liveness and
// kills go through nix signals. Output parsing is whitespace-based, never
// positional.

use std::collections::HashSet;

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use tokio::process::Command;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct ProcessEntry {
    pub pid: u32,
    pub ppid: u32,
    pub command: String,
}

pub async fn list_processes() -> Vec<ProcessEntry> {
    let output = match Command::new("ps")
        .args(["-e", "-o", "pid=,ppid=,args="])
        .output()
        .await
    {
        Ok(output) => output,
        Err(e) => {
            debug!(error = %e, "ps failed");
            return Vec::new();
        }
    };
    parse_ps_listing(&String::from_utf8_lossy(&output.stdout))
}

pub fn parse_ps_listing(text: &str) -> Vec<ProcessEntry> {
    text.lines()
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let pid = parts.next()?.parse().ok()?;
            let ppid = parts.next()?.parse().ok()?;
            let command = parts.collect::<Vec<_>>().join(" ");
            if command.is_empty() {
                return None;
            }
            Some(ProcessEntry { pid, ppid, command })
        })
        .collect()
}

/// The running application under `project_name`, by the primary rule: the
/// first command mentioning `<project>/bin/` that is not the watch driver,
/// MSBuild, or a grep over the listing. Falls back to a direct
/// `<project>.dll` match for older driver shapes.
pub fn find_debuggee_in(
    entries: &[ProcessEntry],
    project_name: &str,
    exclude_pid: Option<u32>,
) -> Option<u32> {
    let is_candidate = |entry: &&ProcessEntry| {
        !entry.command.contains("watch")
            && !entry.command.contains("MSBuild")
            && !entry.command.contains("dotnet-watch")
            && !entry.command.contains("grep")
            && Some(entry.pid) != exclude_pid
    };

    let bin_needle = format!("{project_name}/bin/");
    if let Some(entry) = entries
        .iter()
        .filter(is_candidate)
        .find(|entry| entry.command.contains(&bin_needle))
    {
        return Some(entry.pid);
    }

    let dll_needle = format!("{project_name}.dll");
    entries
        .iter()
        .filter(is_candidate)
        .find(|entry| entry.command.contains(&dll_needle))
        .map(|entry| entry.pid)
}

pub async fn find_debuggee_child(project_name: &str, exclude_pid: Option<u32>) -> Option<u32> {
    let entries = list_processes().await;
    find_debuggee_in(&entries, project_name, exclude_pid)
}

/// Liveness probe via signal 0.
pub fn pid_alive(pid: u32) -> bool {
    kill(Pid::from_raw(pid as i32), None).is_ok()
}

pub async fn parent_pid(pid: u32) -> Option<u32> {
    list_processes()
        .await
        .iter()
        .find(|entry| entry.pid == pid)
        .map(|entry| entry.ppid)
}

pub fn send_sigkill(pid: u32) {
    if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGKILL) {
        debug!(pid, error = %e, "SIGKILL failed");
    }
}

pub fn send_sigterm(pid: u32) {
    if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
        debug!(pid, error = %e, "SIGTERM failed");
    }
}

// --- TCP port states ---

pub async fn listening_ports() -> HashSet<u16> {
    ss_local_ports(&["-H", "-tln"]).await
}

pub async fn time_wait_ports() -> HashSet<u16> {
    ss_local_ports(&["-H", "-tan", "state", "time-wait"]).await
}

async fn ss_local_ports(args: &[&str]) -> HashSet<u16> {
    let output = match Command::new("ss").args(args).output().await {
        Ok(output) => output,
        Err(e) => {
            debug!(error = %e, "ss failed");
            return HashSet::new();
        }
    };
    parse_ss_local_ports(&String::from_utf8_lossy(&output.stdout))
}

/// Local ports from an ss listing: the first addr:port token on each line.
pub fn parse_ss_local_ports(text: &str) -> HashSet<u16> {
    let mut ports = HashSet::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with("State") || line.starts_with("Recv-Q") {
            continue;
        }
        let local = line.split_whitespace().find_map(|token| {
            let (_, port) = token.rsplit_once(':')?;
            port.parse::<u16>().ok()
        });
        if let Some(port) = local {
            ports.insert(port);
        }
    }
    ports
}

/// A port counts as available only when it is neither listened on nor
/// lingering in TIME_WAIT.
pub async fn busy_ports(ports: &[u16]) -> Vec<u16> {
    if ports.is_empty() {
        return Vec::new();
    }
    let listening = listening_ports().await;
    let lingering = time_wait_ports().await;
    ports
        .iter()
        .copied()
        .filter(|port| listening.contains(port) || lingering.contains(port))
        .collect()
}
