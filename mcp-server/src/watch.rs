// Hot-reload watch controller
//
// Runs `dotnet watch run` for a project, keeps the debugger attached to the
// application child, and re-attaches after every rebuild cycle: kill the
// old debuggee, wait for its ports to release, find the new child, attach,
// replay breakpoints. Reconnect triggers are coalesced by the reconnecting
// flag so only one cycle runs at a time.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use dap_client::DapClient;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::procs;
use crate::profile;
use crate::session::{
    debugger_args, start_event_listener, SessionConfig, SessionHandle, SessionMode,
};

/// Literal substring on the driver's stdout that marks a rebuild starting.
pub const REBUILD_SIGNAL: &str = "Building...";

const CHILD_DISCOVERY_TIMEOUT: Duration = Duration::from_secs(30);
const CHILD_DISCOVERY_INTERVAL: Duration = Duration::from_millis(500);
const STARTUP_GRACE: Duration = Duration::from_secs(1);
const OLD_PID_EXIT_TIMEOUT: Duration = Duration::from_secs(5);
const OLD_PID_EXIT_INTERVAL: Duration = Duration::from_millis(50);
const PORT_RELEASE_TIMEOUT: Duration = Duration::from_secs(10);
const PORT_RELEASE_INTERVAL: Duration = Duration::from_millis(300);
const LIVENESS_INTERVAL: Duration = Duration::from_secs(1);
const DRIVER_EXIT_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct WatchOptions {
    pub project_path: String,
    pub launch_profile: Option<String>,
    pub args: Vec<String>,
    pub no_hot_reload: bool,
}

#[derive(Debug, Clone, Copy)]
pub enum ReconnectTrigger {
    RebuildSignal,
    ProcessExited,
    Orphaned,
    Terminated,
}

impl ReconnectTrigger {
    fn describe(&self) -> &'static str {
        match self {
            ReconnectTrigger::RebuildSignal => "rebuild detected, reconnecting",
            ReconnectTrigger::ProcessExited => "application exited, reconnecting",
            ReconnectTrigger::Orphaned => "application orphaned, reconnecting",
            ReconnectTrigger::Terminated => "debug target terminated, reconnecting",
        }
    }
}

/// Per-session state of the watch controller.
#[derive(Debug)]
pub struct WatchState {
    pub driver: Option<Child>,
    pub driver_pid: Option<u32>,
    pub project_dir: PathBuf,
    pub project_name: String,
    pub launch_profile: Option<String>,
    pub last_child_pid: Option<u32>,
    pub reconnecting: bool,
    pub reconnect_task: Option<JoinHandle<()>>,
    pub ports: Vec<u16>,
    pub early_cleanup_done: bool,
    pub no_hot_reload: bool,
    pub stdout_task: Option<JoinHandle<()>>,
    pub stderr_task: Option<JoinHandle<()>>,
    pub poller_task: Option<JoinHandle<()>>,
}

impl WatchState {
    /// Stop every background task and take the driver down (SIGTERM first,
    /// kill after a short grace period).
    pub async fn shutdown(&mut self) {
        for task in [
            self.stdout_task.take(),
            self.stderr_task.take(),
            self.poller_task.take(),
            self.reconnect_task.take(),
        ]
        .into_iter()
        .flatten()
        {
            task.abort();
        }

        if let Some(pid) = self.driver_pid {
            procs::send_sigterm(pid);
        }
        if let Some(mut driver) = self.driver.take() {
            if timeout(DRIVER_EXIT_GRACE, driver.wait()).await.is_err() {
                warn!("watch driver ignored SIGTERM, killing");
                let _ = driver.kill().await;
            }
        }
    }
}

/// Driver command line after the `dotnet` binary itself.
pub fn driver_args(options: &WatchOptions) -> Vec<String> {
    let mut args = vec!["watch".to_string()];
    if options.no_hot_reload {
        args.push("--no-hot-reload".to_string());
    }
    args.push("run".to_string());
    match &options.launch_profile {
        Some(profile) => {
            args.push("--launch-profile".to_string());
            args.push(profile.clone());
        }
        None => args.push("--no-launch-profile".to_string()),
    }
    args.push("--".to_string());
    args.extend(options.args.iter().cloned());
    args
}

/// Start the driver, find the debuggee, attach, and arm the background
/// detectors. Returns the debuggee pid.
pub async fn start_watch(handle: SessionHandle, options: WatchOptions) -> Result<u32, String> {
    let project_dir = PathBuf::from(&options.project_path)
        .canonicalize()
        .map_err(|e| format!("Project path '{}' is not usable: {e}", options.project_path))?;
    if !project_dir.is_dir() {
        return Err(format!(
            "Project path '{}' is not a directory",
            project_dir.display()
        ));
    }
    let project_name = project_dir
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("project")
        .to_string();
    let ports = profile::profile_ports(&project_dir, options.launch_profile.as_deref());

    info!(project = %project_name, ?ports, "starting watch driver");
    let mut driver = Command::new("dotnet")
        .args(driver_args(&options))
        // The driver may restart on edits hot reload cannot apply.
        .env("DOTNET_WATCH_RESTART_ON_RUDE_EDIT", "true")
        .current_dir(&project_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| format!("Failed to start 'dotnet watch': {e}"))?;

    let stdout = driver.stdout.take();
    let stderr = driver.stderr.take();
    let driver_pid = driver.id();

    {
        let mut session = handle.lock().await;
        session.watch = Some(WatchState {
            driver: Some(driver),
            driver_pid,
            project_dir: project_dir.clone(),
            project_name: project_name.clone(),
            launch_profile: options.launch_profile.clone(),
            last_child_pid: None,
            reconnecting: false,
            reconnect_task: None,
            ports,
            early_cleanup_done: false,
            no_hot_reload: options.no_hot_reload,
            stdout_task: None,
            stderr_task: None,
            poller_task: None,
        });
    }

    if let Some(stdout) = stdout {
        let task = spawn_stdout_reader(handle.clone(), stdout);
        set_watch_task(&handle, |watch| watch.stdout_task = Some(task)).await;
    }
    if let Some(stderr) = stderr {
        let task = spawn_stderr_reader(handle.clone(), stderr);
        set_watch_task(&handle, |watch| watch.stderr_task = Some(task)).await;
    }

    let Some(pid) = discover_child(&project_name, None).await else {
        teardown_watch(&handle).await;
        return Err(format!(
            "Timed out waiting for {project_name} to start under 'dotnet watch'"
        ));
    };
    sleep(STARTUP_GRACE).await;

    let client = match attach_new_transport(pid).await {
        Ok(client) => client,
        Err(e) => {
            teardown_watch(&handle).await;
            return Err(e);
        }
    };

    {
        let mut session = handle.lock().await;
        session.client = Some(client.clone());
        session.capabilities = client.capabilities().await;
        session.last_stop = None;
        if let Some(watch) = session.watch.as_mut() {
            watch.last_child_pid = Some(pid);
        }
        session.config = Some(SessionConfig {
            program: format!("watch:{}", project_dir.display()),
            args: options.args.clone(),
            cwd: Some(project_dir.display().to_string()),
            stop_at_entry: false,
            mode: SessionMode::Watch,
            launch_profile: options.launch_profile.clone(),
            env_overrides: HashMap::new(),
            resolved_env: HashMap::new(),
            process_id: Some(pid),
            start_time: std::time::Instant::now(),
        });
    }
    start_event_listener(handle.clone()).await;

    let poller = spawn_liveness_poller(handle.clone());
    set_watch_task(&handle, |watch| watch.poller_task = Some(poller)).await;

    Ok(pid)
}

async fn set_watch_task(handle: &SessionHandle, set: impl FnOnce(&mut WatchState)) {
    let mut session = handle.lock().await;
    if let Some(watch) = session.watch.as_mut() {
        set(watch);
    }
}

async fn teardown_watch(handle: &SessionHandle) {
    let watch = { handle.lock().await.watch.take() };
    if let Some(mut watch) = watch {
        watch.shutdown().await;
    }
}

/// `terminated` from the debugger while watching: one more reconnect
/// trigger, coalesced like the rest.
pub async fn handle_terminated(handle: SessionHandle) {
    begin_reconnect(handle, ReconnectTrigger::Terminated).await;
}

/// Entry point for every reconnect trigger.
///
/// Sets the reconnecting flag synchronously, coalescing concurrent
/// triggers. The rebuild-signal path additionally tears the transport and
/// old debuggee down eagerly before the async cycle starts; the other
/// triggers leave that to the cycle itself.
pub async fn begin_reconnect(handle: SessionHandle, trigger: ReconnectTrigger) {
    let (eager_client, old_pid) = {
        let mut session = handle.lock().await;
        let Some(watch) = session.watch.as_mut() else {
            return;
        };
        if watch.reconnecting {
            debug!("reconnect already in flight, coalescing trigger");
            return;
        }
        watch.reconnecting = true;
        let early = matches!(trigger, ReconnectTrigger::RebuildSignal);
        watch.early_cleanup_done = early;
        let old_pid = watch.last_child_pid;
        let full_restart = watch.no_hot_reload;
        if let Some(task) = session.event_listener_task.take() {
            task.abort();
        }
        let client = if early { session.client.take() } else { None };
        session.last_stop = None;
        if early && full_restart {
            session.push_output("[watch] rebuild detected (full restart), reconnecting".to_string());
        } else {
            session.push_output(format!("[watch] {}", trigger.describe()));
        }
        (client, old_pid)
    };

    if let Some(client) = eager_client {
        disconnect_transport(client).await;
        if let Some(pid) = old_pid {
            if procs::pid_alive(pid) {
                procs::send_sigkill(pid);
            }
        }
    }

    let task = tokio::spawn(reconnect(handle.clone(), old_pid));
    set_watch_task(&handle, |watch| watch.reconnect_task = Some(task)).await;
}

/// Best-effort disconnect: the debugger may already be gone.
async fn disconnect_transport(client: DapClient) {
    let _ = timeout(Duration::from_secs(2), client.disconnect(false)).await;
    client.kill().await;
}

async fn reconnect(handle: SessionHandle, old_pid: Option<u32>) {
    let outcome = run_reconnect(&handle, old_pid).await;

    let mut session = handle.lock().await;
    if let Some(watch) = session.watch.as_mut() {
        watch.reconnecting = false;
        watch.early_cleanup_done = false;
        watch.reconnect_task = None;
    }
    match outcome {
        Ok(pid) => session.push_output(format!("[watch] reattached to pid {pid}")),
        Err(message) => {
            warn!(%message, "reconnect failed");
            session.push_output(format!("[watch] {message}"));
        }
    }
}

async fn run_reconnect(handle: &SessionHandle, old_pid: Option<u32>) -> Result<u32, String> {
    let (cleaned_up, stored_ports, project_name, project_dir, launch_profile) = {
        let session = handle.lock().await;
        let watch = session
            .watch
            .as_ref()
            .ok_or_else(|| "watch stopped during reconnect".to_string())?;
        (
            watch.early_cleanup_done,
            watch.ports.clone(),
            watch.project_name.clone(),
            watch.project_dir.clone(),
            watch.launch_profile.clone(),
        )
    };

    if !cleaned_up {
        let client = { handle.lock().await.client.take() };
        if let Some(client) = client {
            disconnect_transport(client).await;
        }
        if let Some(pid) = old_pid {
            if procs::pid_alive(pid) {
                procs::send_sigkill(pid);
            }
        }
    }

    if let Some(pid) = old_pid {
        let deadline = Instant::now() + OLD_PID_EXIT_TIMEOUT;
        while procs::pid_alive(pid) && Instant::now() < deadline {
            sleep(OLD_PID_EXIT_INTERVAL).await;
        }
        if procs::pid_alive(pid) {
            warn!(pid, "old debuggee still in the process table, proceeding");
        }
    }

    // The rebuild may have changed the launch settings; refresh the tracked
    // ports, keeping the startup list when the profile went missing.
    let mut ports = profile::profile_ports(&project_dir, launch_profile.as_deref());
    if ports.is_empty() {
        ports = stored_ports;
    } else {
        let refreshed = ports.clone();
        set_watch_task(handle, |watch| watch.ports = refreshed).await;
    }

    wait_for_ports(handle, &ports).await;

    let new_pid = discover_child(&project_name, old_pid).await.ok_or_else(|| {
        format!(
            "gave up waiting for a new {project_name} process after {}s",
            CHILD_DISCOVERY_TIMEOUT.as_secs()
        )
    })?;
    sleep(STARTUP_GRACE).await;

    let client = attach_new_transport(new_pid).await?;

    {
        let mut session = handle.lock().await;
        session.client = Some(client.clone());
        session.capabilities = client.capabilities().await;
        session.last_stop = None;
        if let Some(watch) = session.watch.as_mut() {
            watch.last_child_pid = Some(new_pid);
        }
        if let Some(config) = session.config.as_mut() {
            config.process_id = Some(new_pid);
            config.start_time = std::time::Instant::now();
        }
        session.replay_breakpoints(&client).await;
    }
    start_event_listener(handle.clone()).await;

    Ok(new_pid)
}

async fn attach_new_transport(pid: u32) -> Result<DapClient, String> {
    let client = DapClient::spawn(dap_client::DEFAULT_DEBUGGER_COMMAND, &debugger_args())
        .await
        .map_err(|e| format!("failed to start debugger: {e}"))?;
    client
        .initialize("coreclr")
        .await
        .map_err(|e| format!("debugger initialize failed: {e}"))?;
    client
        .attach(pid)
        .await
        .map_err(|e| format!("attach to pid {pid} failed: {e}"))?;
    Ok(client)
}

/// Poll the process table until the project's application child shows up.
async fn discover_child(project_name: &str, exclude: Option<u32>) -> Option<u32> {
    let deadline = Instant::now() + CHILD_DISCOVERY_TIMEOUT;
    loop {
        if let Some(pid) = procs::find_debuggee_child(project_name, exclude).await {
            return Some(pid);
        }
        if Instant::now() >= deadline {
            return None;
        }
        sleep(CHILD_DISCOVERY_INTERVAL).await;
    }
}

/// Wait for the tracked ports to leave LISTEN and TIME_WAIT. On timeout a
/// warning lands in the output buffer and the reattach proceeds anyway.
async fn wait_for_ports(handle: &SessionHandle, ports: &[u16]) {
    if ports.is_empty() {
        return;
    }
    let deadline = Instant::now() + PORT_RELEASE_TIMEOUT;
    loop {
        let busy = procs::busy_ports(ports).await;
        if busy.is_empty() {
            return;
        }
        if Instant::now() >= deadline {
            let mut session = handle.lock().await;
            for port in busy {
                session.push_output(format!(
                    "[watch] warning: port {port} still busy after {}s, proceeding",
                    PORT_RELEASE_TIMEOUT.as_secs()
                ));
            }
            return;
        }
        sleep(PORT_RELEASE_INTERVAL).await;
    }
}

fn spawn_stdout_reader(handle: SessionHandle, stdout: ChildStdout) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stdout).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let is_rebuild = line.contains(REBUILD_SIGNAL);
            {
                let mut session = handle.lock().await;
                session.push_output(line);
            }
            if is_rebuild {
                begin_reconnect(handle.clone(), ReconnectTrigger::RebuildSignal).await;
            }
        }
        debug!("watch driver stdout closed");
    })
}

fn spawn_stderr_reader(handle: SessionHandle, stderr: ChildStderr) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let mut session = handle.lock().await;
            session.push_output(format!("[stderr] {line}"));
        }
    })
}

/// 1 Hz debuggee liveness and orphan check.
fn spawn_liveness_poller(handle: SessionHandle) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(LIVENESS_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;

            let (pid, reconnecting) = {
                let session = handle.lock().await;
                let Some(watch) = session.watch.as_ref() else {
                    return;
                };
                (watch.last_child_pid, watch.reconnecting)
            };
            if reconnecting {
                continue;
            }
            let Some(pid) = pid else {
                continue;
            };

            if !procs::pid_alive(pid) {
                begin_reconnect(handle.clone(), ReconnectTrigger::ProcessExited).await;
                continue;
            }
            // The driver sometimes kills its wrapper but leaves the app
            // behind, reparented to init.
            if let Some(ppid) = procs::parent_pid(pid).await {
                if ppid == 1 {
                    procs::send_sigkill(pid);
                    begin_reconnect(handle.clone(), ReconnectTrigger::Orphaned).await;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn driver_args_full_shape() {
        let options = WatchOptions {
            project_path: "/proj/Api".to_string(),
            launch_profile: Some("https".to_string()),
            args: vec!["--verbose".to_string()],
            no_hot_reload: false,
        };
        assert_eq!(
            driver_args(&options),
            vec![
                "watch",
                "run",
                "--launch-profile",
                "https",
                "--",
                "--verbose",
            ]
        );
    }

    #[test]
    fn driver_args_no_hot_reload_without_profile() {
        let options = WatchOptions {
            project_path: "/proj/Api".to_string(),
            launch_profile: None,
            args: Vec::new(),
            no_hot_reload: true,
        };
        assert_eq!(
            driver_args(&options),
            vec!["watch", "--no-hot-reload", "run", "--no-launch-profile", "--"]
        );
    }

    #[tokio::test]
    async fn reconnect_triggers_coalesce() {
        use crate::session::DebugSession;
        use std::sync::Arc;
        use tokio::sync::Mutex;

        let handle: SessionHandle = Arc::new(Mutex::new(DebugSession::new("api")));
        {
            let mut session = handle.lock().await;
            session.watch = Some(WatchState {
                driver: None,
                driver_pid: None,
                project_dir: PathBuf::from("/proj/Api"),
                project_name: "Api".to_string(),
                launch_profile: None,
                last_child_pid: None,
                reconnecting: true,
                reconnect_task: None,
                ports: Vec::new(),
                early_cleanup_done: true,
                no_hot_reload: false,
                stdout_task: None,
                stderr_task: None,
                poller_task: None,
            });
        }

        // With a reconnect already in flight, another trigger must no-op:
        // no task is spawned and the output buffer stays empty.
        begin_reconnect(handle.clone(), ReconnectTrigger::Terminated).await;

        let session = handle.lock().await;
        let watch = session.watch.as_ref().unwrap();
        assert!(watch.reconnecting);
        assert!(watch.reconnect_task.is_none());
        assert!(session.output.is_empty());
    }

    #[tokio::test]
    async fn first_trigger_sets_flags_and_spawns_cycle() {
        use crate::session::DebugSession;
        use std::sync::Arc;
        use tokio::sync::Mutex;

        let handle: SessionHandle = Arc::new(Mutex::new(DebugSession::new("api")));
        {
            let mut session = handle.lock().await;
            session.watch = Some(WatchState {
                driver: None,
                driver_pid: None,
                project_dir: PathBuf::from("/proj/Api"),
                project_name: "Api".to_string(),
                launch_profile: None,
                last_child_pid: None,
                reconnecting: false,
                reconnect_task: None,
                ports: Vec::new(),
                early_cleanup_done: false,
                no_hot_reload: false,
                stdout_task: None,
                stderr_task: None,
                poller_task: None,
            });
        }

        begin_reconnect(handle.clone(), ReconnectTrigger::RebuildSignal).await;

        let task = {
            let mut session = handle.lock().await;
            {
                let watch = session.watch.as_ref().unwrap();
                assert!(watch.reconnecting);
                assert!(watch.early_cleanup_done);
            }
            assert!(session
                .output
                .iter()
                .any(|line| line.contains("reconnecting")));
            session.watch.as_mut().unwrap().reconnect_task.take()
        };

        // The cycle fails fast (no project process exists) and must reset
        // the reconnecting flag on its way out.
        if let Some(task) = task {
            task.abort();
        }
    }
}
