// MCP request handlers
//
// Handles initialize, list tools, and debug tool execution

use crate::harness::{self, InvokeRequest};
use crate::profile;
use crate::protocol::*;
use crate::session::{
    start_event_listener, LaunchParams, SessionManager, SessionMode, SessionState,
    DEFAULT_STACK_DEPTH,
};
use crate::tools;
use crate::watch::{self, WatchOptions};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info, warn};

pub struct RequestHandler {
    session_manager: SessionManager,
}

impl RequestHandler {
    pub fn new() -> Self {
        Self {
            session_manager: SessionManager::new(),
        }
    }

    pub async fn handle_request(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        debug!(version = %request.jsonrpc, method = %request.method, "handling request");
        let result = match request.method.as_str() {
            "initialize" => self.handle_initialize(request.params),
            "tools/list" => self.handle_list_tools(),
            "tools/call" => self.handle_call_tool(request.params).await,
            _ => Err(JsonRpcError {
                code: METHOD_NOT_FOUND,
                message: format!("Method not found: {}", request.method),
                data: None,
            }),
        };

        match result {
            Ok(value) => JsonRpcResponse {
                jsonrpc: "2.0".to_string(),
                id: request.id,
                result: Some(value),
                error: None,
            },
            Err(error) => JsonRpcResponse {
                jsonrpc: "2.0".to_string(),
                id: request.id,
                result: None,
                error: Some(error),
            },
        }
    }

    pub async fn handle_notification(&self, notification: JsonRpcNotification) {
        match notification.method.as_str() {
            "notifications/initialized" => {
                info!("Client initialized");
            }
            "notifications/cancelled" => {
                debug!(params = ?notification.params, "Request cancelled");
            }
            _ => {
                warn!("Unknown notification: {}", notification.method);
            }
        }
    }

    fn handle_initialize(&self, params: Option<Value>) -> Result<Value, JsonRpcError> {
        let params: InitializeParams = serde_json::from_value(params.unwrap_or(json!({})))
            .map_err(|e| JsonRpcError {
                code: INVALID_PARAMS,
                message: format!("Invalid initialize params: {}", e),
                data: None,
            })?;
        debug!(
            protocol = ?params.protocol_version,
            client = ?params.client_info,
            capabilities = ?params.capabilities,
            "client initialize"
        );

        let result = InitializeResult {
            protocol_version: "2024-11-05".to_string(),
            capabilities: ServerCapabilities {
                tools: ToolsCapability {},
            },
            server_info: ServerInfo {
                name: "dap-mcp".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            instructions: Some(
                ".NET debugging server driving netcoredbg. \
                Start with launch (a DLL), attach (a pid) or launch_watch \
                (a project directory, keeps debugging across hot reloads), \
                then use set_breakpoint, stack_trace, evaluate, etc."
                    .to_string(),
            ),
        };

        Ok(serde_json::to_value(result).unwrap())
    }

    fn handle_list_tools(&self) -> Result<Value, JsonRpcError> {
        let result = ListToolsResult {
            tools: tools::get_tools(),
        };

        Ok(serde_json::to_value(result).unwrap())
    }

    async fn handle_call_tool(&self, params: Option<Value>) -> Result<Value, JsonRpcError> {
        let call_params: CallToolParams = serde_json::from_value(params.unwrap_or(json!({})))
            .map_err(|e| JsonRpcError {
                code: INVALID_PARAMS,
                message: format!("Invalid tool call params: {}", e),
                data: None,
            })?;

        let args = call_params.arguments;
        let result = match call_params.name.as_str() {
            "launch" => self.handle_launch(args).await,
            "attach" => self.handle_attach(args).await,
            "launch_watch" => self.handle_launch_watch(args).await,
            "stop_watch" => self.handle_stop_watch(args).await,
            "restart" => self.handle_restart(args).await,
            "set_breakpoint" => self.handle_set_breakpoint(args).await,
            "remove_breakpoint" => self.handle_remove_breakpoint(args).await,
            "list_breakpoints" => self.handle_list_breakpoints(args).await,
            "continue" => self.handle_continue(args).await,
            "pause" => self.handle_pause(args).await,
            "step_over" => self.handle_step(args, Step::Over).await,
            "step_into" => self.handle_step(args, Step::Into).await,
            "step_out" => self.handle_step(args, Step::Out).await,
            "stack_trace" => self.handle_stack_trace(args).await,
            "scopes" => self.handle_scopes(args).await,
            "variables" => self.handle_variables(args).await,
            "evaluate" => self.handle_evaluate(args).await,
            "threads" => self.handle_threads(args).await,
            "output" => self.handle_output(args).await,
            "status" => self.handle_status(args).await,
            "terminate" => self.handle_terminate(args).await,
            "list_sessions" => self.handle_list_sessions().await,
            "select_session" => self.handle_select_session(args).await,
            "terminate_session" => self.handle_terminate_session(args).await,
            "invoke" => self.handle_invoke(args).await,
            _ => Err(format!("Unknown tool: {}", call_params.name)),
        };

        match result {
            Ok(content) => {
                let call_result = CallToolResult {
                    content: vec![ContentBlock::Text { text: content }],
                    is_error: None,
                };
                Ok(serde_json::to_value(call_result).unwrap())
            }
            Err(error) => {
                let call_result = CallToolResult {
                    content: vec![ContentBlock::Text { text: error.clone() }],
                    is_error: Some(true),
                };
                Ok(serde_json::to_value(call_result).unwrap())
            }
        }
    }

    // --- Session lifecycle tools ---

    async fn handle_launch(&self, args: Value) -> Result<String, String> {
        let program = require_str(&args, "program")?;
        let params = LaunchParams {
            program: program.clone(),
            args: string_vec(&args, "args"),
            cwd: optional_str(&args, "cwd"),
            stop_at_entry: args
                .get("stopAtEntry")
                .and_then(|v| v.as_bool())
                .unwrap_or(false),
            env: env_map(&args),
            launch_profile: optional_str(&args, "launchProfile"),
        };

        let id = match optional_str(&args, "sessionId") {
            Some(id) => id,
            None => {
                let stem = Path::new(&program)
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .unwrap_or("program");
                self.session_manager.derive_session_id(stem).await
            }
        };

        let handle = self.session_manager.create_session(&id).await?;
        let launched = { handle.lock().await.launch(params).await };
        match launched {
            Ok(caps) => {
                start_event_listener(handle.clone()).await;
                let env = {
                    let session = handle.lock().await;
                    session
                        .config
                        .as_ref()
                        .map(|config| config.resolved_env.clone())
                        .unwrap_or_default()
                };
                let mut reply = format!("✅ Launched {program} (session: {id})");
                if caps.supports_conditional_breakpoints == Some(true) {
                    reply.push_str("\n   Conditional breakpoints: supported");
                }
                if caps.supports_terminate_request == Some(true) {
                    reply.push_str("\n   Graceful terminate: supported");
                }
                if !env.is_empty() {
                    let mut pairs: Vec<String> =
                        env.iter().map(|(k, v)| format!("{k}={v}")).collect();
                    pairs.sort();
                    reply.push_str(&format!("\n   Environment: {}", pairs.join(", ")));
                }
                Ok(reply)
            }
            Err(e) => {
                let _ = self.session_manager.remove_session(&id).await;
                Err(e)
            }
        }
    }

    async fn handle_attach(&self, args: Value) -> Result<String, String> {
        let process_id = require_u32(&args, "processId")?;
        let id = match optional_str(&args, "sessionId") {
            Some(id) => id,
            None => self.session_manager.anonymous_id().await,
        };

        let handle = self.session_manager.create_session(&id).await?;
        let attached = { handle.lock().await.attach(process_id).await };
        match attached {
            Ok(_caps) => {
                start_event_listener(handle.clone()).await;
                Ok(format!("✅ Attached to pid {process_id} (session: {id})"))
            }
            Err(e) => {
                let _ = self.session_manager.remove_session(&id).await;
                Err(e)
            }
        }
    }

    async fn handle_launch_watch(&self, args: Value) -> Result<String, String> {
        let project_path = require_str(&args, "projectPath")?;
        let options = WatchOptions {
            project_path: project_path.clone(),
            launch_profile: optional_str(&args, "launchProfile"),
            args: string_vec(&args, "args"),
            no_hot_reload: args
                .get("noHotReload")
                .and_then(|v| v.as_bool())
                .unwrap_or(false),
        };

        let id = match optional_str(&args, "sessionId") {
            Some(id) => id,
            None => {
                let name = Path::new(&project_path)
                    .file_name()
                    .and_then(|s| s.to_str())
                    .unwrap_or("watch");
                self.session_manager.derive_session_id(name).await
            }
        };

        let handle = self.session_manager.create_session(&id).await?;
        match watch::start_watch(handle, options).await {
            Ok(pid) => Ok(format!(
                "✅ Watching {project_path} (session: {id})\n   Attached to pid {pid}; the debugger will follow hot-reload restarts"
            )),
            Err(e) => {
                let _ = self.session_manager.remove_session(&id).await;
                Err(e)
            }
        }
    }

    async fn handle_stop_watch(&self, args: Value) -> Result<String, String> {
        let (id, handle) = self.resolve_session(&args).await?;
        {
            let session = handle.lock().await;
            if session.watch.is_none() {
                return Err(format!("Session '{id}' is not a watch session"));
            }
        }
        self.session_manager.remove_session(&id).await?;
        Ok(format!("✅ Stopped watching (session: {id})"))
    }

    async fn handle_restart(&self, args: Value) -> Result<String, String> {
        let rebuild = args
            .get("rebuild")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        let (id, handle) = self.resolve_session(&args).await?;

        let config = {
            let session = handle.lock().await;
            session
                .config
                .clone()
                .ok_or_else(|| format!("Session '{id}' has never launched"))?
        };
        if config.mode != SessionMode::Launch {
            return Err("Restart is only available for sessions started with launch".to_string());
        }

        if rebuild {
            let project_dir = profile::find_project_dir(Path::new(&config.program))
                .ok_or_else(|| {
                    format!("No project directory found above {}", config.program)
                })?;
            let build_output = harness::run_dotnet_build(&project_dir).await?;
            let mut session = handle.lock().await;
            for line in build_output.lines().filter(|l| !l.trim().is_empty()) {
                session.push_output(line.to_string());
            }
        }

        let params = LaunchParams {
            program: config.program.clone(),
            args: config.args.clone(),
            cwd: config.cwd.clone(),
            stop_at_entry: config.stop_at_entry,
            env: config.env_overrides.clone(),
            launch_profile: config.launch_profile.clone(),
        };
        {
            handle.lock().await.launch(params).await?;
        }
        start_event_listener(handle.clone()).await;

        if rebuild {
            Ok(format!("✅ Rebuilt and relaunched {} (session: {id})", config.program))
        } else {
            Ok(format!("✅ Relaunched {} (session: {id})", config.program))
        }
    }

    // --- Breakpoint tools ---

    async fn handle_set_breakpoint(&self, args: Value) -> Result<String, String> {
        let file = require_str(&args, "file")?;
        let line = require_i64(&args, "line")?;
        let condition = optional_str(&args, "condition");

        let (_, handle) = self.resolve_session(&args).await?;
        let echo = {
            handle
                .lock()
                .await
                .set_breakpoint(&file, line, condition.clone())
                .await?
        };

        let location = format!("{file}:{line}");
        let mut reply = if echo.verified {
            format!("✅ Breakpoint set at {location}")
        } else {
            match &echo.message {
                Some(message) => format!("⏳ Breakpoint pending at {location}: {message}"),
                None => format!("⏳ Breakpoint pending at {location}"),
            }
        };
        if let Some(condition) = condition {
            reply.push_str(&format!("\n   Condition: {condition}"));
        }
        Ok(reply)
    }

    async fn handle_remove_breakpoint(&self, args: Value) -> Result<String, String> {
        let file = require_str(&args, "file")?;
        let line = require_i64(&args, "line")?;

        let (_, handle) = self.resolve_session(&args).await?;
        handle.lock().await.remove_breakpoint(&file, line).await?;
        Ok(format!("✅ Breakpoint removed: {file}:{line}"))
    }

    async fn handle_list_breakpoints(&self, args: Value) -> Result<String, String> {
        let (_, handle) = self.resolve_session(&args).await?;
        let rows = { handle.lock().await.breakpoint_rows() };

        if rows.is_empty() {
            return Ok("No breakpoints set".to_string());
        }

        let mut output = format!("📍 {} breakpoint(s):\n\n", rows.len());
        for row in rows {
            let mark = match &row.echo {
                Some(echo) if echo.verified => "✓",
                _ => "✗",
            };
            output.push_str(&format!("  {} {}:{}\n", mark, row.file, row.line));
            if let Some(condition) = &row.condition {
                output.push_str(&format!("     Condition: {condition}\n"));
            }
            if let Some(message) = row.echo.as_ref().and_then(|e| e.message.as_ref()) {
                output.push_str(&format!("     {message}\n"));
            }
        }
        Ok(output)
    }

    // --- Execution control tools ---

    async fn handle_continue(&self, args: Value) -> Result<String, String> {
        let thread_id = optional_i64(&args, "threadId");
        let (_, handle) = self.resolve_session(&args).await?;
        handle.lock().await.continue_(thread_id).await?;
        Ok("▶️  Execution resumed".to_string())
    }

    async fn handle_pause(&self, args: Value) -> Result<String, String> {
        let thread_id = optional_i64(&args, "threadId");
        let (_, handle) = self.resolve_session(&args).await?;
        handle.lock().await.pause(thread_id).await?;
        Ok("⏸️  Pause requested; check status for the stop location".to_string())
    }

    async fn handle_step(&self, args: Value, step: Step) -> Result<String, String> {
        let thread_id = optional_i64(&args, "threadId");
        let (_, handle) = self.resolve_session(&args).await?;
        {
            let mut session = handle.lock().await;
            match step {
                Step::Over => session.step_over(thread_id).await?,
                Step::Into => session.step_into(thread_id).await?,
                Step::Out => session.step_out(thread_id).await?,
            }
        }
        Ok(format!(
            "➡️  Step {} started; check status for the new location",
            step.as_str()
        ))
    }

    // --- Inspection tools ---

    async fn handle_stack_trace(&self, args: Value) -> Result<String, String> {
        let thread_id = optional_i64(&args, "threadId");
        let depth = optional_i64(&args, "depth").unwrap_or(DEFAULT_STACK_DEPTH);

        let (_, handle) = self.resolve_session(&args).await?;
        let body = {
            let session = handle.lock().await;
            session.stack_trace(thread_id, depth).await?
        };

        if body.stack_frames.is_empty() {
            return Ok("No stack frames (is the debuggee stopped?)".to_string());
        }

        let mut output = format!("🔍 Stack ({} frames):\n\n", body.stack_frames.len());
        for (idx, frame) in body.stack_frames.iter().enumerate() {
            match frame.source.as_ref().and_then(|s| s.path.as_ref()) {
                Some(path) => output.push_str(&format!(
                    "  #{idx} [{}] {} at {}:{}\n",
                    frame.id, frame.name, path, frame.line
                )),
                None => output.push_str(&format!("  #{idx} [{}] {}\n", frame.id, frame.name)),
            }
        }
        Ok(output)
    }

    async fn handle_scopes(&self, args: Value) -> Result<String, String> {
        let frame_id = require_i64(&args, "frameId")?;
        let (_, handle) = self.resolve_session(&args).await?;
        let scopes = {
            let session = handle.lock().await;
            session.scopes(frame_id).await?
        };

        if scopes.is_empty() {
            return Ok("No scopes for this frame".to_string());
        }

        let mut output = format!("Scopes for frame {frame_id}:\n");
        for scope in scopes {
            if scope.expensive == Some(true) {
                output.push_str(&format!(
                    "  {} (ref {}, expensive)\n",
                    scope.name, scope.variables_reference
                ));
            } else {
                output.push_str(&format!(
                    "  {} (ref {})\n",
                    scope.name, scope.variables_reference
                ));
            }
        }
        Ok(output)
    }

    async fn handle_variables(&self, args: Value) -> Result<String, String> {
        let reference = require_i64(&args, "variablesReference")?;
        let depth = optional_i64(&args, "depth").unwrap_or(1).clamp(1, 3);

        let (_, handle) = self.resolve_session(&args).await?;
        let session = handle.lock().await;

        // Iterative walk over the (reference -> children) graph; references
        // are reissued per stop, so there are no cycles to guard against.
        enum Job {
            Container {
                reference: i64,
                indent: usize,
                remaining: i64,
            },
            Line {
                variable: dap_client::types::Variable,
                indent: usize,
                remaining: i64,
            },
        }

        let mut jobs = vec![Job::Container {
            reference,
            indent: 0,
            remaining: depth,
        }];
        let mut lines = Vec::new();

        while let Some(job) = jobs.pop() {
            match job {
                Job::Container {
                    reference,
                    indent,
                    remaining,
                } => {
                    let variables = session.variables(reference).await?;
                    for variable in variables.into_iter().rev() {
                        jobs.push(Job::Line {
                            variable,
                            indent,
                            remaining,
                        });
                    }
                }
                Job::Line {
                    variable,
                    indent,
                    remaining,
                } => {
                    lines.push(format!(
                        "{}{}",
                        "  ".repeat(indent + 1),
                        variable.format()
                    ));
                    if variable.variables_reference != 0 && remaining > 1 {
                        jobs.push(Job::Container {
                            reference: variable.variables_reference,
                            indent: indent + 1,
                            remaining: remaining - 1,
                        });
                    }
                }
            }
        }

        if lines.is_empty() {
            return Ok("No variables in this container".to_string());
        }
        Ok(format!("Variables (ref {reference}):\n{}", lines.join("\n")))
    }

    async fn handle_evaluate(&self, args: Value) -> Result<String, String> {
        let expression = require_str(&args, "expression")?;
        let frame_id = optional_i64(&args, "frameId");

        let (_, handle) = self.resolve_session(&args).await?;
        let result = {
            let session = handle.lock().await;
            session.evaluate(&expression, frame_id).await?
        };

        let mut output = result.result;
        if let Some(ty) = result.ty {
            output.push_str(&format!(" ({ty})"));
        }
        if result.variables_reference != 0 {
            output.push_str(&format!(
                "\n   Expandable via variables (ref {})",
                result.variables_reference
            ));
        }
        Ok(output)
    }

    async fn handle_threads(&self, args: Value) -> Result<String, String> {
        let (_, handle) = self.resolve_session(&args).await?;
        let threads = {
            let session = handle.lock().await;
            session.threads().await?
        };

        let mut output = format!("🧵 {} thread(s):\n", threads.len());
        for thread in threads {
            output.push_str(&format!("  Thread {} \"{}\"\n", thread.id, thread.name));
        }
        Ok(output)
    }

    // --- Introspection tools ---

    async fn handle_output(&self, args: Value) -> Result<String, String> {
        let lines = optional_i64(&args, "lines").unwrap_or(20).max(0) as usize;
        let (_, handle) = self.resolve_session(&args).await?;
        let tail = { handle.lock().await.output_tail(lines) };

        if tail.is_empty() {
            return Ok("No output captured yet".to_string());
        }
        Ok(tail.join("\n"))
    }

    async fn handle_status(&self, args: Value) -> Result<String, String> {
        let (id, handle) = self.resolve_session(&args).await?;
        let status = { handle.lock().await.status() };

        let headline = match status.state {
            SessionState::Stopped => {
                let reason = status.stop_reason.as_deref().unwrap_or("unknown");
                match status.stopped_thread {
                    Some(thread) => format!("stopped ({reason}) on thread {thread}"),
                    None => format!("stopped ({reason})"),
                }
            }
            SessionState::Reconnecting => "reconnecting (retry shortly)".to_string(),
            other => other.as_str().to_string(),
        };

        let mut output = format!("Session '{id}': {headline}\n");
        if let Some(pid) = status.process_id {
            output.push_str(&format!("  Process: {pid}\n"));
        }
        if let Some(uptime) = status.uptime_secs {
            output.push_str(&format!("  Uptime: {uptime}s\n"));
        }
        output.push_str(&format!("  Breakpoints: {}\n", status.breakpoint_count));
        output.push_str(&format!("  Output lines: {}\n", status.output_lines));
        Ok(output)
    }

    async fn handle_terminate(&self, args: Value) -> Result<String, String> {
        let (id, _) = self.resolve_session(&args).await?;
        self.session_manager.remove_session(&id).await?;
        Ok(format!("✅ Terminated session '{id}'"))
    }

    async fn handle_list_sessions(&self) -> Result<String, String> {
        let ids = self.session_manager.session_ids().await;
        if ids.is_empty() {
            return Ok("No active debug sessions".to_string());
        }
        let default = self.session_manager.default_session_id().await;

        let mut output = format!("Sessions ({}):\n", ids.len());
        for id in ids {
            let marker = if Some(&id) == default.as_ref() {
                "*"
            } else {
                " "
            };
            let line = match self.session_manager.get_session(Some(&id)).await {
                Ok((_, handle)) => {
                    let status = handle.lock().await.status();
                    match status.process_id {
                        Some(pid) => {
                            format!("{marker} {id}: {} (pid {pid})", status.state.as_str())
                        }
                        None => format!("{marker} {id}: {}", status.state.as_str()),
                    }
                }
                Err(_) => format!("{marker} {id}"),
            };
            output.push_str(&line);
            output.push('\n');
        }
        Ok(output)
    }

    async fn handle_select_session(&self, args: Value) -> Result<String, String> {
        let id = require_str(&args, "sessionId")?;
        self.session_manager.select_session(&id).await?;
        Ok(format!("✅ Session '{id}' is now the default"))
    }

    async fn handle_terminate_session(&self, args: Value) -> Result<String, String> {
        let id = require_str(&args, "sessionId")?;
        self.session_manager.remove_session(&id).await?;
        Ok(format!("✅ Terminated session '{id}'"))
    }

    // --- Harness tool ---

    async fn handle_invoke(&self, args: Value) -> Result<String, String> {
        let request = InvokeRequest {
            assembly: require_str(&args, "assembly")?,
            type_name: require_str(&args, "type")?,
            method: require_str(&args, "method")?,
            args: string_vec(&args, "args"),
            ctor_args: string_vec(&args, "ctorArgs"),
            cwd: optional_str(&args, "cwd"),
        };
        let debug_mode = args
            .get("debug")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);

        if !debug_mode {
            let output = harness::run_harness(&request).await?;
            let mut reply = match output.exit_code {
                Some(0) => format!(
                    "✅ Invoked {}.{}",
                    request.type_name, request.method
                ),
                Some(code) => format!(
                    "⚠️ {}.{} exited with code {code}",
                    request.type_name, request.method
                ),
                None => format!(
                    "⚠️ {}.{} was killed by a signal",
                    request.type_name, request.method
                ),
            };
            if !output.stdout.trim().is_empty() {
                reply.push_str(&format!("\n{}", output.stdout.trim_end()));
            }
            if !output.stderr.trim().is_empty() {
                reply.push_str(&format!("\n[stderr] {}", output.stderr.trim_end()));
            }
            return Ok(reply);
        }

        // Debug mode: the harness command line becomes a regular session.
        let harness_dll = harness::harness_path()?;
        let id = match optional_str(&args, "sessionId") {
            Some(id) => id,
            None => {
                let stem = Path::new(&request.assembly)
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .unwrap_or("invoke");
                self.session_manager.derive_session_id(stem).await
            }
        };

        let params = LaunchParams {
            program: harness_dll.to_string_lossy().into_owned(),
            args: harness::harness_args(&request),
            cwd: request.cwd.clone(),
            stop_at_entry: true,
            env: HashMap::new(),
            launch_profile: None,
        };

        let handle = self.session_manager.create_session(&id).await?;
        let launched = { handle.lock().await.launch(params).await };
        match launched {
            Ok(_) => {
                start_event_listener(handle.clone()).await;
                Ok(format!(
                    "✅ Debugging {}.{} under the harness (session: {id})\n   Stopped at entry; set breakpoints, then continue",
                    request.type_name, request.method
                ))
            }
            Err(e) => {
                let _ = self.session_manager.remove_session(&id).await;
                Err(e)
            }
        }
    }

    async fn resolve_session(
        &self,
        args: &Value,
    ) -> Result<(String, crate::session::SessionHandle), String> {
        let id = optional_str(args, "sessionId");
        self.session_manager.get_session(id.as_deref()).await
    }
}

#[derive(Debug, Clone, Copy)]
enum Step {
    Over,
    Into,
    Out,
}

impl Step {
    fn as_str(&self) -> &'static str {
        match self {
            Step::Over => "over",
            Step::Into => "into",
            Step::Out => "out",
        }
    }
}

// --- Argument extraction helpers ---

fn require_str(args: &Value, key: &str) -> Result<String, String> {
    args.get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| format!("Missing '{key}' parameter"))
}

fn require_i64(args: &Value, key: &str) -> Result<i64, String> {
    args.get(key)
        .and_then(|v| v.as_i64())
        .ok_or_else(|| format!("Missing '{key}' parameter"))
}

fn require_u32(args: &Value, key: &str) -> Result<u32, String> {
    let value = require_i64(args, key)?;
    u32::try_from(value).map_err(|_| format!("Invalid '{key}': {value}"))
}

fn optional_str(args: &Value, key: &str) -> Option<String> {
    args.get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}

fn optional_i64(args: &Value, key: &str) -> Option<i64> {
    args.get(key).and_then(|v| v.as_i64())
}

fn string_vec(args: &Value, key: &str) -> Vec<String> {
    args.get(key)
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.as_str().map(|s| s.to_string()))
                .collect()
        })
        .unwrap_or_default()
}

fn env_map(args: &Value) -> HashMap<String, String> {
    args.get("env")
        .and_then(|v| v.as_object())
        .map(|map| {
            map.iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unknown_tool_reports_error_result() {
        let handler = RequestHandler::new();
        let params = json!({"name": "debug.fly", "arguments": {}});
        let value = handler.handle_call_tool(Some(params)).await.unwrap();
        assert_eq!(value["isError"], true);
        let text = value["content"][0]["text"].as_str().unwrap();
        assert!(text.contains("Unknown tool"));
    }

    #[tokio::test]
    async fn status_without_sessions_names_how_to_start() {
        let handler = RequestHandler::new();
        let params = json!({"name": "status", "arguments": {}});
        let value = handler.handle_call_tool(Some(params)).await.unwrap();
        assert_eq!(value["isError"], true);
        let text = value["content"][0]["text"].as_str().unwrap();
        assert!(text.contains("No active debug sessions"));
    }

    #[tokio::test]
    async fn list_sessions_empty_message() {
        let handler = RequestHandler::new();
        let params = json!({"name": "list_sessions", "arguments": {}});
        let value = handler.handle_call_tool(Some(params)).await.unwrap();
        let text = value["content"][0]["text"].as_str().unwrap();
        assert_eq!(text, "No active debug sessions");
    }

    #[tokio::test]
    async fn set_breakpoint_requires_file_and_line() {
        let handler = RequestHandler::new();
        let params = json!({"name": "set_breakpoint", "arguments": {"line": 10}});
        let value = handler.handle_call_tool(Some(params)).await.unwrap();
        let text = value["content"][0]["text"].as_str().unwrap();
        assert!(text.contains("Missing 'file'"));
    }

    #[tokio::test]
    async fn initialize_reports_tool_capability() {
        let handler = RequestHandler::new();
        let request = JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            id: json!(1),
            method: "initialize".to_string(),
            params: Some(json!({})),
        };
        let response = handler.handle_request(request).await;
        let result = response.result.unwrap();
        assert_eq!(result["serverInfo"]["name"], "dap-mcp");
        assert!(result["capabilities"]["tools"].is_object());
    }

    #[tokio::test]
    async fn tools_list_round_trips() {
        let handler = RequestHandler::new();
        let request = JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            id: json!(2),
            method: "tools/list".to_string(),
            params: None,
        };
        let response = handler.handle_request(request).await;
        let tools = response.result.unwrap()["tools"].as_array().unwrap().len();
        assert_eq!(tools, 25);
    }

    #[tokio::test]
    async fn unknown_method_is_method_not_found() {
        let handler = RequestHandler::new();
        let request = JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            id: json!(3),
            method: "resources/list".to_string(),
            params: None,
        };
        let response = handler.handle_request(request).await;
        assert_eq!(response.error.unwrap().code, METHOD_NOT_FOUND);
    }
}
