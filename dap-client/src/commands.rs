// DAP command implementations
//
// One wrapper per request the mediator issues; bodies are built inline and
// response bodies are deserialized into the typed shapes in types.rs

use serde::de::DeserializeOwned;
use serde_json::json;
use std::collections::HashMap;

use crate::client::DapClient;
use crate::protocol::{DapError, DapResult, Response};
use crate::types::{
    Breakpoint, Capabilities, ContinueResponseBody, EvaluateResponseBody, Scope,
    ScopesResponseBody, SetBreakpointsResponseBody, SourceBreakpoint, StackTraceResponseBody,
    Thread, ThreadsResponseBody, Variable, VariablesResponseBody,
};

fn body_as<T: DeserializeOwned>(response: Response) -> DapResult<T> {
    let body = response
        .body
        .ok_or_else(|| DapError::Protocol("response body missing".to_string()))?;
    Ok(serde_json::from_value(body)?)
}

impl DapClient {
    /// Perform the initialize handshake and cache the returned capabilities.
    pub async fn initialize(&self, adapter_id: &str) -> DapResult<Capabilities> {
        let response = self
            .send_request(
                "initialize",
                json!({
                    "clientID": "dap-mcp",
                    "clientName": "dap-mcp",
                    "adapterID": adapter_id,
                    "pathFormat": "path",
                    "linesStartAt1": true,
                    "columnsStartAt1": true,
                    "supportsRunInTerminalRequest": false,
                }),
            )
            .await?;

        let caps: Capabilities = match response.body {
            Some(body) => serde_json::from_value(body)?,
            None => Capabilities::default(),
        };
        self.store_capabilities(caps.clone()).await;
        Ok(caps)
    }

    /// Launch the debuggee, then signal configurationDone.
    ///
    /// `env` is only included when non-empty so the debugger keeps its own
    /// inherited environment otherwise.
    pub async fn launch(
        &self,
        program: &str,
        args: &[String],
        cwd: Option<&str>,
        stop_at_entry: bool,
        env: &HashMap<String, String>,
    ) -> DapResult<()> {
        let mut body = json!({
            "program": program,
            "args": args,
            "stopAtEntry": stop_at_entry,
            "console": "internalConsole",
        });
        if let Some(cwd) = cwd {
            body["cwd"] = json!(cwd);
        }
        if !env.is_empty() {
            body["env"] = json!(env);
        }

        self.send_request("launch", body).await?;
        self.configuration_done().await
    }

    /// Attach to a running process, then signal configurationDone.
    pub async fn attach(&self, process_id: u32) -> DapResult<()> {
        self.send_request("attach", json!({ "processId": process_id }))
            .await?;
        self.configuration_done().await
    }

    pub async fn configuration_done(&self) -> DapResult<()> {
        self.send_request("configurationDone", json!({})).await?;
        Ok(())
    }

    /// Replace the complete breakpoint set for one source file.
    pub async fn set_breakpoints(
        &self,
        path: &str,
        breakpoints: &[SourceBreakpoint],
    ) -> DapResult<Vec<Breakpoint>> {
        let response = self
            .send_request(
                "setBreakpoints",
                json!({
                    "source": { "path": path },
                    "breakpoints": breakpoints,
                    "sourceModified": false,
                }),
            )
            .await?;
        let body: SetBreakpointsResponseBody = body_as(response)?;
        Ok(body.breakpoints)
    }

    // --- Execution control ---

    pub async fn continue_(&self, thread_id: Option<i64>) -> DapResult<Option<bool>> {
        let thread_id = self.default_thread(thread_id)?;
        let response = self
            .send_request("continue", json!({ "threadId": thread_id }))
            .await?;
        let all = response
            .body
            .map(serde_json::from_value::<ContinueResponseBody>)
            .transpose()?
            .and_then(|b| b.all_threads_continued);
        Ok(all)
    }

    pub async fn pause(&self, thread_id: Option<i64>) -> DapResult<()> {
        self.thread_request("pause", thread_id).await
    }

    pub async fn next(&self, thread_id: Option<i64>) -> DapResult<()> {
        self.thread_request("next", thread_id).await
    }

    pub async fn step_in(&self, thread_id: Option<i64>) -> DapResult<()> {
        self.thread_request("stepIn", thread_id).await
    }

    pub async fn step_out(&self, thread_id: Option<i64>) -> DapResult<()> {
        self.thread_request("stepOut", thread_id).await
    }

    async fn thread_request(&self, command: &str, thread_id: Option<i64>) -> DapResult<()> {
        let thread_id = self.default_thread(thread_id)?;
        self.send_request(command, json!({ "threadId": thread_id }))
            .await?;
        Ok(())
    }

    // --- Inspection ---

    pub async fn threads(&self) -> DapResult<Vec<Thread>> {
        let response = self.send_request("threads", json!({})).await?;
        let body: ThreadsResponseBody = body_as(response)?;
        Ok(body.threads)
    }

    pub async fn stack_trace(
        &self,
        thread_id: i64,
        start_frame: i64,
        levels: i64,
    ) -> DapResult<StackTraceResponseBody> {
        let response = self
            .send_request(
                "stackTrace",
                json!({
                    "threadId": thread_id,
                    "startFrame": start_frame,
                    "levels": levels,
                }),
            )
            .await?;
        body_as(response)
    }

    pub async fn scopes(&self, frame_id: i64) -> DapResult<Vec<Scope>> {
        let response = self
            .send_request("scopes", json!({ "frameId": frame_id }))
            .await?;
        let body: ScopesResponseBody = body_as(response)?;
        Ok(body.scopes)
    }

    pub async fn variables(&self, variables_reference: i64) -> DapResult<Vec<Variable>> {
        let response = self
            .send_request(
                "variables",
                json!({ "variablesReference": variables_reference }),
            )
            .await?;
        let body: VariablesResponseBody = body_as(response)?;
        Ok(body.variables)
    }

    pub async fn evaluate(
        &self,
        expression: &str,
        frame_id: Option<i64>,
    ) -> DapResult<EvaluateResponseBody> {
        let mut body = json!({
            "expression": expression,
            "context": "repl",
        });
        if let Some(frame_id) = frame_id {
            body["frameId"] = json!(frame_id);
        }
        let response = self.send_request("evaluate", body).await?;
        body_as(response)
    }

    // --- Teardown ---

    /// Best-effort disconnect, then kill the child.
    pub async fn disconnect(&self, terminate_debuggee: bool) {
        let _ = self
            .send_request(
                "disconnect",
                json!({ "terminateDebuggee": terminate_debuggee }),
            )
            .await;
        self.kill().await;
    }

    /// Graceful terminate when the debugger supports it, otherwise a
    /// disconnect that takes the debuggee down.
    pub async fn terminate(&self) -> DapResult<()> {
        let supports = self
            .capabilities()
            .await
            .and_then(|caps| caps.supports_terminate_request)
            .unwrap_or(false);

        if supports {
            self.send_request("terminate", json!({})).await?;
            Ok(())
        } else {
            self.disconnect(true).await;
            Ok(())
        }
    }
}
