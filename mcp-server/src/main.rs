// dap-mcp server entry point
//
// Newline-delimited JSON-RPC over stdio: requests and responses on
// stdin/stdout, logs on stderr.

mod handlers;
mod harness;
mod procs;
mod profile;
mod protocol;
mod session;
mod tools;
mod watch;

use handlers::RequestHandler;
use protocol::{
    JsonRpcError, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, INVALID_REQUEST,
    PARSE_ERROR,
};

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // stdout is the protocol channel; everything else goes to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "dap-mcp starting");
    let handler = RequestHandler::new();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    while let Ok(Some(line)) = lines.next_line().await {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let value: serde_json::Value = match serde_json::from_str(line) {
            Ok(value) => value,
            Err(e) => {
                error!(error = %e, "invalid JSON on stdin");
                let response = parse_error_response(e);
                write_message(&mut stdout, &response).await;
                continue;
            }
        };

        if value.get("id").is_some() {
            let id = value.get("id").cloned().unwrap_or(serde_json::Value::Null);
            let request: JsonRpcRequest = match serde_json::from_value(value) {
                Ok(request) => request,
                Err(e) => {
                    error!(error = %e, "malformed request");
                    let response = JsonRpcResponse {
                        jsonrpc: "2.0".to_string(),
                        id,
                        result: None,
                        error: Some(JsonRpcError {
                            code: INVALID_REQUEST,
                            message: format!("Invalid request: {e}"),
                            data: None,
                        }),
                    };
                    write_message(&mut stdout, &response).await;
                    continue;
                }
            };
            let response = handler.handle_request(request).await;
            write_message(&mut stdout, &response).await;
        } else {
            // Notifications never get a reply.
            match serde_json::from_value::<JsonRpcNotification>(value) {
                Ok(notification) => handler.handle_notification(notification).await,
                Err(e) => debug!(error = %e, "ignoring malformed notification"),
            }
        }
    }

    info!("stdin closed, shutting down");
}

fn parse_error_response(e: serde_json::Error) -> JsonRpcResponse {
    JsonRpcResponse {
        jsonrpc: "2.0".to_string(),
        id: serde_json::Value::Null,
        result: None,
        error: Some(JsonRpcError {
            code: PARSE_ERROR,
            message: format!("Parse error: {e}"),
            data: None,
        }),
    }
}

async fn write_message(stdout: &mut tokio::io::Stdout, response: &JsonRpcResponse) {
    let text = serde_json::to_string(response).unwrap_or_else(|e| {
        error!(error = %e, "failed to serialize response");
        format!(
            r#"{{"jsonrpc":"2.0","id":null,"error":{{"code":{},"message":"serialization error"}}}}"#,
            protocol::INTERNAL_ERROR
        )
    });

    // One message per line, flushed immediately. Write errors mean the
    // client hung up; the read loop will notice on the next line.
    let _ = stdout.write_all(text.as_bytes()).await;
    let _ = stdout.write_all(b"\n").await;
    let _ = stdout.flush().await;
}
