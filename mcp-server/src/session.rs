// Debug session management
//
// Each session owns at most one DAP transport, the authoritative breakpoint
// model, an output ring and (in watch mode) the hot-reload controller.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dap_client::types::{
    Breakpoint, Capabilities, EvaluateResponseBody, ExitedEventBody, OutputEventBody, Scope,
    SourceBreakpoint, StackTraceResponseBody, StoppedEventBody, Thread, Variable,
};
use dap_client::{DapClient, DapEvent};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::profile;
use crate::watch::{self, WatchState};

pub type SessionId = String;
pub type SessionHandle = Arc<Mutex<DebugSession>>;

/// Bounded FIFO size of the per-session output buffer.
pub const OUTPUT_BUFFER_CAP: usize = 100;

pub const DEFAULT_STACK_DEPTH: i64 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionMode {
    Launch,
    Attach,
    Watch,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<String>,
    pub stop_at_entry: bool,
    pub mode: SessionMode,
    pub launch_profile: Option<String>,
    pub env_overrides: HashMap<String, String>,
    pub resolved_env: HashMap<String, String>,
    pub process_id: Option<u32>,
    pub start_time: Instant,
}

#[derive(Debug, Clone)]
pub struct StopInfo {
    pub reason: String,
    pub thread_id: Option<i64>,
}

/// Client-side model for one source file's breakpoints.
///
/// Conditions live in their own map because setBreakpoints echoes do not
/// carry them back.
#[derive(Debug, Clone, Default)]
pub struct FileBreakpoints {
    pub lines: BTreeSet<i64>,
    pub conditions: HashMap<i64, String>,
    pub verified: HashMap<i64, Breakpoint>,
}

impl FileBreakpoints {
    /// The complete per-file request list, lines in ascending order.
    pub fn request_list(&self) -> Vec<SourceBreakpoint> {
        self.lines
            .iter()
            .map(|&line| SourceBreakpoint {
                line,
                condition: self.conditions.get(&line).cloned(),
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Running,
    Stopped,
    Reconnecting,
    Terminated,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Running => "running",
            SessionState::Stopped => "stopped",
            SessionState::Reconnecting => "reconnecting",
            SessionState::Terminated => "terminated",
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionStatus {
    pub state: SessionState,
    pub stop_reason: Option<String>,
    pub stopped_thread: Option<i64>,
    pub process_id: Option<u32>,
    pub uptime_secs: Option<u64>,
    pub breakpoint_count: usize,
    pub output_lines: usize,
}

#[derive(Debug, Clone)]
pub struct BreakpointRow {
    pub file: String,
    pub line: i64,
    pub condition: Option<String>,
    pub echo: Option<Breakpoint>,
}

/// Arguments for a launch, kept separate so restart can replay them.
#[derive(Debug, Clone)]
pub struct LaunchParams {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<String>,
    pub stop_at_entry: bool,
    pub env: HashMap<String, String>,
    pub launch_profile: Option<String>,
}

#[derive(Debug)]
pub struct DebugSession {
    pub id: SessionId,
    pub client: Option<DapClient>,
    pub breakpoints: HashMap<String, FileBreakpoints>,
    pub output: VecDeque<String>,
    pub last_stop: Option<StopInfo>,
    pub config: Option<SessionConfig>,
    pub capabilities: Option<Capabilities>,
    pub watch: Option<WatchState>,
    pub event_listener_task: Option<JoinHandle<()>>,
}

impl DebugSession {
    pub fn new(id: impl Into<SessionId>) -> Self {
        Self {
            id: id.into(),
            client: None,
            breakpoints: HashMap::new(),
            output: VecDeque::new(),
            last_stop: None,
            config: None,
            capabilities: None,
            watch: None,
            event_listener_task: None,
        }
    }

    /// Append one entry to the output ring, dropping the oldest at capacity.
    pub fn push_output(&mut self, entry: impl Into<String>) {
        if self.output.len() == OUTPUT_BUFFER_CAP {
            self.output.pop_front();
        }
        self.output.push_back(entry.into());
    }

    pub fn output_tail(&self, count: usize) -> Vec<String> {
        let skip = self.output.len().saturating_sub(count);
        self.output.iter().skip(skip).cloned().collect()
    }

    /// The transport, or the user-facing reason there is none.
    pub fn client_or_err(&self) -> Result<DapClient, String> {
        if self.watch.as_ref().is_some_and(|w| w.reconnecting) {
            return Err(
                "Reconnecting: the debugger is re-attaching after a rebuild. Retry in a moment."
                    .to_string(),
            );
        }
        self.client.clone().ok_or_else(|| {
            "No debugger running in this session. Use launch, attach or launch_watch first."
                .to_string()
        })
    }

    pub fn status(&self) -> SessionStatus {
        let reconnecting = self.watch.as_ref().is_some_and(|w| w.reconnecting);
        let state = if reconnecting {
            SessionState::Reconnecting
        } else if self.client.is_some() {
            if self.last_stop.is_some() {
                SessionState::Stopped
            } else {
                SessionState::Running
            }
        } else {
            SessionState::Terminated
        };

        SessionStatus {
            state,
            stop_reason: self.last_stop.as_ref().map(|s| s.reason.clone()),
            stopped_thread: self.last_stop.as_ref().and_then(|s| s.thread_id),
            process_id: self.config.as_ref().and_then(|c| c.process_id),
            uptime_secs: self
                .config
                .as_ref()
                .map(|c| c.start_time.elapsed().as_secs()),
            breakpoint_count: self.breakpoints.values().map(|f| f.lines.len()).sum(),
            output_lines: self.output.len(),
        }
    }

    // --- Breakpoints ---

    pub async fn set_breakpoint(
        &mut self,
        file: &str,
        line: i64,
        condition: Option<String>,
    ) -> Result<Breakpoint, String> {
        let client = self.client_or_err()?;
        let path = normalize_path(file);

        if condition.is_some()
            && self
                .capabilities
                .as_ref()
                .and_then(|caps| caps.supports_conditional_breakpoints)
                == Some(false)
        {
            self.push_output(
                "[debugger] conditional breakpoints are not supported by this debugger"
                    .to_string(),
            );
        }

        let request = {
            let entry = self.breakpoints.entry(path.clone()).or_default();
            entry.lines.insert(line);
            match condition {
                Some(condition) => {
                    entry.conditions.insert(line, condition);
                }
                None => {
                    entry.conditions.remove(&line);
                }
            }
            entry.request_list()
        };

        let echoes = client
            .set_breakpoints(&path, &request)
            .await
            .map_err(|e| format!("Failed to set breakpoint: {e}"))?;

        let entry = self.breakpoints.entry(path.clone()).or_default();
        entry.verified.clear();
        for (requested, echo) in request.iter().zip(echoes.into_iter()) {
            entry.verified.insert(requested.line, echo);
        }

        entry
            .verified
            .get(&line)
            .cloned()
            .ok_or_else(|| "Debugger returned no breakpoint for the requested line".to_string())
    }

    pub async fn remove_breakpoint(&mut self, file: &str, line: i64) -> Result<(), String> {
        let client = self.client_or_err()?;
        let path = normalize_path(file);

        let (request, now_empty) = {
            let entry = self
                .breakpoints
                .get_mut(&path)
                .ok_or_else(|| format!("No breakpoint at {path}:{line}"))?;
            if !entry.lines.remove(&line) {
                return Err(format!("No breakpoint at {path}:{line}"));
            }
            entry.conditions.remove(&line);
            entry.verified.remove(&line);
            (entry.request_list(), entry.lines.is_empty())
        };

        let echoes = client
            .set_breakpoints(&path, &request)
            .await
            .map_err(|e| format!("Failed to update breakpoints: {e}"))?;

        if now_empty {
            self.breakpoints.remove(&path);
        } else if let Some(entry) = self.breakpoints.get_mut(&path) {
            entry.verified.clear();
            for (requested, echo) in request.iter().zip(echoes.into_iter()) {
                entry.verified.insert(requested.line, echo);
            }
        }
        Ok(())
    }

    pub fn breakpoint_rows(&self) -> Vec<BreakpointRow> {
        let mut files: Vec<&String> = self.breakpoints.keys().collect();
        files.sort();
        let mut rows = Vec::new();
        for file in files {
            let entry = &self.breakpoints[file];
            for &line in &entry.lines {
                rows.push(BreakpointRow {
                    file: file.clone(),
                    line,
                    condition: entry.conditions.get(&line).cloned(),
                    echo: entry.verified.get(&line).cloned(),
                });
            }
        }
        rows
    }

    /// Re-send the stored breakpoint set file-by-file on a fresh transport.
    ///
    /// Per-file failures are logged and skipped so one broken file does not
    /// break a reconnect.
    pub async fn replay_breakpoints(&mut self, client: &DapClient) {
        let files: Vec<String> = self.breakpoints.keys().cloned().collect();
        for file in files {
            let request = self.breakpoints[&file].request_list();
            match client.set_breakpoints(&file, &request).await {
                Ok(echoes) => {
                    if let Some(entry) = self.breakpoints.get_mut(&file) {
                        entry.verified.clear();
                        for (requested, echo) in request.iter().zip(echoes.into_iter()) {
                            entry.verified.insert(requested.line, echo);
                        }
                    }
                }
                Err(e) => {
                    warn!(file = %file, error = %e, "breakpoint replay failed for file");
                    self.push_output(format!("[watch] failed to restore breakpoints in {file}: {e}"));
                }
            }
        }
    }

    // --- Execution control ---

    fn resolve_thread(&self, explicit: Option<i64>) -> i64 {
        explicit
            .or_else(|| self.last_stop.as_ref().and_then(|s| s.thread_id))
            .unwrap_or(1)
    }

    pub async fn continue_(&mut self, thread_id: Option<i64>) -> Result<(), String> {
        let client = self.client_or_err()?;
        let thread = self.resolve_thread(thread_id);
        client
            .continue_(Some(thread))
            .await
            .map_err(|e| format!("Failed to continue: {e}"))?;
        self.last_stop = None;
        Ok(())
    }

    pub async fn pause(&mut self, thread_id: Option<i64>) -> Result<(), String> {
        let client = self.client_or_err()?;
        let thread = self.resolve_thread(thread_id);
        client
            .pause(Some(thread))
            .await
            .map_err(|e| format!("Failed to pause: {e}"))
    }

    pub async fn step_over(&mut self, thread_id: Option<i64>) -> Result<(), String> {
        let client = self.client_or_err()?;
        let thread = self.resolve_thread(thread_id);
        client
            .next(Some(thread))
            .await
            .map_err(|e| format!("Failed to step: {e}"))
    }

    pub async fn step_into(&mut self, thread_id: Option<i64>) -> Result<(), String> {
        let client = self.client_or_err()?;
        let thread = self.resolve_thread(thread_id);
        client
            .step_in(Some(thread))
            .await
            .map_err(|e| format!("Failed to step in: {e}"))
    }

    pub async fn step_out(&mut self, thread_id: Option<i64>) -> Result<(), String> {
        let client = self.client_or_err()?;
        let thread = self.resolve_thread(thread_id);
        client
            .step_out(Some(thread))
            .await
            .map_err(|e| format!("Failed to step out: {e}"))
    }

    // --- Inspection ---

    pub async fn stack_trace(
        &self,
        thread_id: Option<i64>,
        depth: i64,
    ) -> Result<StackTraceResponseBody, String> {
        let client = self.client_or_err()?;
        let thread = self.resolve_thread(thread_id);
        client
            .stack_trace(thread, 0, depth)
            .await
            .map_err(|e| format!("Failed to get stack trace: {e}"))
    }

    pub async fn scopes(&self, frame_id: i64) -> Result<Vec<Scope>, String> {
        let client = self.client_or_err()?;
        client
            .scopes(frame_id)
            .await
            .map_err(|e| format!("Failed to get scopes: {e}"))
    }

    pub async fn variables(&self, reference: i64) -> Result<Vec<Variable>, String> {
        let client = self.client_or_err()?;
        client
            .variables(reference)
            .await
            .map_err(|e| format!("Failed to get variables: {e}"))
    }

    pub async fn evaluate(
        &self,
        expression: &str,
        frame_id: Option<i64>,
    ) -> Result<EvaluateResponseBody, String> {
        let client = self.client_or_err()?;
        client
            .evaluate(expression, frame_id)
            .await
            .map_err(|e| format!("Evaluation failed: {e}"))
    }

    pub async fn threads(&self) -> Result<Vec<Thread>, String> {
        let client = self.client_or_err()?;
        client
            .threads()
            .await
            .map_err(|e| format!("Failed to list threads: {e}"))
    }

    // --- Lifecycle ---

    /// Start a fresh transport, launch the program, save the config (the
    /// resolved environment included, for reporting and restart).
    pub async fn launch(&mut self, params: LaunchParams) -> Result<Capabilities, String> {
        self.cleanup_transport().await;

        let client = DapClient::spawn(
            dap_client::DEFAULT_DEBUGGER_COMMAND,
            &debugger_args(),
        )
        .await
        .map_err(|e| format!("Failed to start debugger: {e}"))?;

        let caps = client
            .initialize("coreclr")
            .await
            .map_err(|e| format!("Debugger initialize failed: {e}"))?;

        let mut resolved_env =
            profile::resolve_environment(&params.program, params.launch_profile.as_deref());
        resolved_env.extend(params.env.clone());

        client
            .launch(
                &params.program,
                &params.args,
                params.cwd.as_deref(),
                params.stop_at_entry,
                &resolved_env,
            )
            .await
            .map_err(|e| format!("Launch failed: {e}"))?;

        self.client = Some(client);
        self.capabilities = Some(caps.clone());
        self.last_stop = None;
        self.config = Some(SessionConfig {
            program: params.program,
            args: params.args,
            cwd: params.cwd,
            stop_at_entry: params.stop_at_entry,
            mode: SessionMode::Launch,
            launch_profile: params.launch_profile,
            env_overrides: params.env,
            resolved_env,
            process_id: None,
            start_time: Instant::now(),
        });

        Ok(caps)
    }

    /// Start a fresh transport and attach to a running process.
    pub async fn attach(&mut self, process_id: u32) -> Result<Capabilities, String> {
        self.cleanup_transport().await;

        let client = DapClient::spawn(dap_client::DEFAULT_DEBUGGER_COMMAND, &debugger_args())
            .await
            .map_err(|e| format!("Failed to start debugger: {e}"))?;

        let caps = client
            .initialize("coreclr")
            .await
            .map_err(|e| format!("Debugger initialize failed: {e}"))?;

        client
            .attach(process_id)
            .await
            .map_err(|e| format!("Attach to pid {process_id} failed: {e}"))?;

        self.client = Some(client);
        self.capabilities = Some(caps.clone());
        self.last_stop = None;
        self.config = Some(SessionConfig {
            program: format!("process:{process_id}"),
            args: Vec::new(),
            cwd: None,
            stop_at_entry: false,
            mode: SessionMode::Attach,
            launch_profile: None,
            env_overrides: HashMap::new(),
            resolved_env: HashMap::new(),
            process_id: Some(process_id),
            start_time: Instant::now(),
        });

        Ok(caps)
    }

    /// Kill the current transport, if any, and stop its listener.
    pub async fn cleanup_transport(&mut self) {
        if let Some(task) = self.event_listener_task.take() {
            task.abort();
        }
        if let Some(client) = self.client.take() {
            client.kill().await;
        }
    }

    /// Full teardown: watch driver, transport, listener.
    pub async fn shutdown(&mut self) {
        if let Some(task) = self.event_listener_task.take() {
            task.abort();
        }
        if let Some(mut watch) = self.watch.take() {
            watch.shutdown().await;
        }
        if let Some(client) = self.client.take() {
            // Bounded: an unresponsive debugger must not wedge teardown.
            let _ = tokio::time::timeout(Duration::from_secs(2), client.terminate()).await;
            client.kill().await;
        }
        self.last_stop = None;
    }
}

pub(crate) fn debugger_args() -> Vec<String> {
    dap_client::DEFAULT_DEBUGGER_ARGS
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// Absolute form of a source path; symlinks are resolved when the file
/// exists, otherwise the path is made absolute lexically.
pub fn normalize_path(file: &str) -> String {
    let path = Path::new(file);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };
    match absolute.canonicalize() {
        Ok(resolved) => resolved.to_string_lossy().into_owned(),
        Err(_) => absolute.to_string_lossy().into_owned(),
    }
}

/// Spawn the per-session event listener for the session's current client.
///
/// The listener mutates session state for stopped/output events and hands
/// `terminated` to the watch controller in watch mode.
pub async fn start_event_listener(handle: SessionHandle) {
    let client = { handle.lock().await.client.clone() };
    let Some(client) = client else {
        return;
    };
    let task = spawn_event_listener(handle.clone(), client);
    handle.lock().await.event_listener_task = Some(task);
}

fn spawn_event_listener(handle: SessionHandle, client: DapClient) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = client.recv_event().await {
            handle_event(&handle, event).await;
        }
        info!("event listener stopped");
    })
}

async fn handle_event(handle: &SessionHandle, event: DapEvent) {
    match event.event.as_str() {
        "stopped" => match serde_json::from_value::<StoppedEventBody>(event.body) {
            Ok(body) => {
                let mut session = handle.lock().await;
                debug!(
                    session = %session.id,
                    reason = %body.reason,
                    thread_id = ?body.thread_id,
                    "debuggee stopped"
                );
                session.last_stop = Some(StopInfo {
                    reason: body.reason,
                    thread_id: body.thread_id,
                });
            }
            Err(e) => debug!(error = %e, "malformed stopped event"),
        },
        "output" => {
            if let Ok(body) = serde_json::from_value::<OutputEventBody>(event.body) {
                let mut session = handle.lock().await;
                session.push_output(body.output.trim_end_matches('\n').to_string());
            }
        }
        "exited" => {
            let code = serde_json::from_value::<ExitedEventBody>(event.body)
                .ok()
                .and_then(|body| body.exit_code);
            let mut session = handle.lock().await;
            match code {
                Some(code) => {
                    session.push_output(format!("[debugger] process exited with code {code}"))
                }
                None => session.push_output("[debugger] process exited".to_string()),
            }
        }
        "terminated" => {
            let is_watch = {
                let session = handle.lock().await;
                session.watch.is_some()
            };
            if is_watch {
                // Runs detached: the reconnect path aborts this listener.
                tokio::spawn(watch::handle_terminated(handle.clone()));
            } else {
                let mut session = handle.lock().await;
                session.client = None;
                session.last_stop = None;
                session.push_output("[debugger] target terminated".to_string());
            }
        }
        other => {
            debug!(event = other, "unhandled debugger event");
        }
    }
}

// --- Session manager ---

const WELL_KNOWN_SUFFIXES: &[&str] = &[
    "api", "worker", "web", "service", "server", "client", "app", "host",
];

/// Process-wide registry of sessions.
///
/// Cheap to clone; all clones share the map and the default pointer.
#[derive(Clone)]
pub struct SessionManager {
    sessions: Arc<Mutex<HashMap<SessionId, SessionHandle>>>,
    default_session: Arc<Mutex<Option<SessionId>>>,
    anon_counter: Arc<AtomicU64>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            default_session: Arc::new(Mutex::new(None)),
            anon_counter: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Insert a new session. The first session becomes the default.
    pub async fn create_session(&self, id: &str) -> Result<SessionHandle, String> {
        let mut sessions = self.sessions.lock().await;
        if sessions.contains_key(id) {
            return Err(format!("Session '{id}' already exists"));
        }
        let handle: SessionHandle = Arc::new(Mutex::new(DebugSession::new(id)));
        sessions.insert(id.to_string(), Arc::clone(&handle));

        let mut default = self.default_session.lock().await;
        if default.is_none() {
            *default = Some(id.to_string());
        }
        Ok(handle)
    }

    /// Derive a free session id from a program or project name.
    pub async fn derive_session_id(&self, name: &str) -> SessionId {
        let sessions = self.sessions.lock().await;
        let last = name
            .rsplit('.')
            .next()
            .unwrap_or(name)
            .to_ascii_lowercase();
        let base = if WELL_KNOWN_SUFFIXES.contains(&last.as_str()) {
            last
        } else {
            kebab_case(name)
        };

        if !sessions.contains_key(&base) {
            return base;
        }
        let mut n = 2;
        loop {
            let candidate = format!("{base}-{n}");
            if !sessions.contains_key(&candidate) {
                return candidate;
            }
            n += 1;
        }
    }

    pub async fn anonymous_id(&self) -> SessionId {
        let sessions = self.sessions.lock().await;
        loop {
            let n = self.anon_counter.fetch_add(1, Ordering::SeqCst) + 1;
            let candidate = format!("session-{n}");
            if !sessions.contains_key(&candidate) {
                return candidate;
            }
        }
    }

    /// Resolve an explicit id or fall back to the default session.
    pub async fn get_session(
        &self,
        id: Option<&str>,
    ) -> Result<(SessionId, SessionHandle), String> {
        let id = match id {
            Some(id) => id.to_string(),
            None => self.default_session.lock().await.clone().ok_or_else(|| {
                "No active debug sessions. Use launch, attach or launch_watch to start one."
                    .to_string()
            })?,
        };

        let sessions = self.sessions.lock().await;
        match sessions.get(&id) {
            Some(handle) => Ok((id, Arc::clone(handle))),
            None => {
                let mut ids: Vec<&str> = sessions.keys().map(|s| s.as_str()).collect();
                ids.sort_unstable();
                let available = if ids.is_empty() {
                    "none".to_string()
                } else {
                    ids.join(", ")
                };
                Err(format!(
                    "Unknown session '{id}'. Available sessions: {available}"
                ))
            }
        }
    }

    pub async fn select_session(&self, id: &str) -> Result<(), String> {
        {
            let sessions = self.sessions.lock().await;
            if !sessions.contains_key(id) {
                return Err(format!("Unknown session '{id}'"));
            }
        }
        *self.default_session.lock().await = Some(id.to_string());
        Ok(())
    }

    pub async fn default_session_id(&self) -> Option<SessionId> {
        self.default_session.lock().await.clone()
    }

    pub async fn session_ids(&self) -> Vec<SessionId> {
        let sessions = self.sessions.lock().await;
        let mut ids: Vec<SessionId> = sessions.keys().cloned().collect();
        ids.sort_unstable();
        ids
    }

    /// Tear a session down and drop it; promotes another session to default
    /// when the removed one held that role.
    pub async fn remove_session(&self, id: &str) -> Result<(), String> {
        let handle = {
            let mut sessions = self.sessions.lock().await;
            sessions
                .remove(id)
                .ok_or_else(|| format!("Unknown session '{id}'"))?
        };

        handle.lock().await.shutdown().await;

        let next = {
            let sessions = self.sessions.lock().await;
            sessions.keys().next().cloned()
        };
        let mut default = self.default_session.lock().await;
        if default.as_deref() == Some(id) {
            *default = next;
        }
        Ok(())
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Kebab-case a dotted program name: `Company.Feature.Api` becomes
/// `company-feature-api`.
pub fn kebab_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut last_dash = true;
    for ch in name.chars() {
        let mapped = match ch {
            '.' | '_' | ' ' | '/' | '\\' => '-',
            other => other.to_ascii_lowercase(),
        };
        if mapped == '-' {
            if !last_dash {
                out.push('-');
                last_dash = true;
            }
        } else {
            out.push(mapped);
            last_dash = false;
        }
    }
    while out.ends_with('-') {
        out.pop();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kebab_case_dotted_name() {
        assert_eq!(kebab_case("Company.Feature.Api"), "company-feature-api");
        assert_eq!(kebab_case("My_Tool"), "my-tool");
        assert_eq!(kebab_case("..Edge..Case.."), "edge-case");
    }

    #[test]
    fn output_ring_is_bounded() {
        let mut session = DebugSession::new("test");
        for i in 0..250 {
            session.push_output(format!("line {i}"));
        }
        assert_eq!(session.output.len(), OUTPUT_BUFFER_CAP);
        assert_eq!(session.output.front().unwrap(), "line 150");
        assert_eq!(session.output.back().unwrap(), "line 249");
    }

    #[test]
    fn output_tail_returns_newest_last() {
        let mut session = DebugSession::new("test");
        for i in 0..10 {
            session.push_output(format!("line {i}"));
        }
        let tail = session.output_tail(3);
        assert_eq!(tail, vec!["line 7", "line 8", "line 9"]);
    }

    #[test]
    fn file_breakpoints_request_list_is_ordered_with_conditions() {
        let mut fb = FileBreakpoints::default();
        fb.lines.insert(30);
        fb.lines.insert(10);
        fb.lines.insert(20);
        fb.conditions.insert(20, "x > 5".to_string());

        let request = fb.request_list();
        let lines: Vec<i64> = request.iter().map(|b| b.line).collect();
        assert_eq!(lines, vec![10, 20, 30]);
        assert_eq!(request[1].condition.as_deref(), Some("x > 5"));
        assert!(request[0].condition.is_none());
    }

    #[test]
    fn status_without_transport_is_terminated() {
        let session = DebugSession::new("test");
        let status = session.status();
        assert_eq!(status.state, SessionState::Terminated);
        assert_eq!(status.breakpoint_count, 0);
    }

    #[test]
    fn guard_names_launch_when_no_transport() {
        let session = DebugSession::new("test");
        let err = session.client_or_err().unwrap_err();
        assert!(err.contains("launch"));
    }

    #[test]
    fn resolve_thread_prefers_explicit_then_stop_then_one() {
        let mut session = DebugSession::new("test");
        assert_eq!(session.resolve_thread(None), 1);
        session.last_stop = Some(StopInfo {
            reason: "breakpoint".to_string(),
            thread_id: Some(4),
        });
        assert_eq!(session.resolve_thread(None), 4);
        assert_eq!(session.resolve_thread(Some(9)), 9);
    }

    #[tokio::test]
    async fn first_session_becomes_default() {
        let manager = SessionManager::new();
        manager.create_session("api").await.unwrap();
        manager.create_session("worker").await.unwrap();
        assert_eq!(manager.default_session_id().await.as_deref(), Some("api"));
    }

    #[tokio::test]
    async fn duplicate_session_id_is_rejected() {
        let manager = SessionManager::new();
        manager.create_session("api").await.unwrap();
        assert!(manager.create_session("api").await.is_err());
    }

    #[tokio::test]
    async fn derive_id_uses_well_known_suffix() {
        let manager = SessionManager::new();
        assert_eq!(manager.derive_session_id("Company.Feature.Api").await, "api");
    }

    #[tokio::test]
    async fn derive_id_suffixes_on_collision() {
        let manager = SessionManager::new();
        manager.create_session("api").await.unwrap();
        assert_eq!(
            manager.derive_session_id("Other.Project.Api").await,
            "api-2"
        );
    }

    #[tokio::test]
    async fn derive_id_kebab_cases_unknown_names() {
        let manager = SessionManager::new();
        assert_eq!(
            manager.derive_session_id("MyTool.Cli").await,
            "mytool-cli"
        );
    }

    #[tokio::test]
    async fn anonymous_ids_are_monotonic() {
        let manager = SessionManager::new();
        assert_eq!(manager.anonymous_id().await, "session-1");
        assert_eq!(manager.anonymous_id().await, "session-2");
    }

    #[tokio::test]
    async fn removal_promotes_remaining_session() {
        let manager = SessionManager::new();
        manager.create_session("api").await.unwrap();
        manager.create_session("worker").await.unwrap();
        manager.select_session("worker").await.unwrap();

        manager.remove_session("worker").await.unwrap();
        assert_eq!(manager.default_session_id().await.as_deref(), Some("api"));

        manager.remove_session("api").await.unwrap();
        assert!(manager.default_session_id().await.is_none());
        assert!(manager.session_ids().await.is_empty());
    }

    #[tokio::test]
    async fn get_session_without_default_reports_how_to_start() {
        let manager = SessionManager::new();
        let err = manager.get_session(None).await.unwrap_err();
        assert!(err.contains("launch"));
    }

    #[tokio::test]
    async fn get_session_with_unknown_id_lists_available() {
        let manager = SessionManager::new();
        manager.create_session("api").await.unwrap();
        let err = manager.get_session(Some("nope")).await.unwrap_err();
        assert!(err.contains("api"));
    }
}
