// DAP client over a debugger child process
//
// Owns one child; correlates responses to requests by sequence and
// forwards events to the owning session's listener task.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::protocol::{
    encode_frame, DapError, DapResult, FrameDecoder, ProtocolMessage, Request, Response,
};
use crate::types::Capabilities;

/// A debugger event forwarded to whoever called [`DapClient::recv_event`].
///
/// The body stays raw JSON; known events have typed bodies in
/// [`crate::types`] that callers deserialize when they care.
#[derive(Debug, Clone)]
pub struct DapEvent {
    pub event: String,
    pub body: serde_json::Value,
}

struct PendingRequest {
    command: String,
    tx: oneshot::Sender<DapResult<Response>>,
}

type PendingMap = Arc<Mutex<HashMap<i64, PendingRequest>>>;

/// Client for one debugger child process.
///
/// Cheap to clone; all clones share the child, the sequence counter and the
/// pending-request table.
#[derive(Clone)]
pub struct DapClient {
    inner: Arc<ClientInner>,
}

impl std::fmt::Debug for DapClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DapClient").finish_non_exhaustive()
    }
}

struct ClientInner {
    stdin: Mutex<ChildStdin>,
    child: Mutex<Child>,
    seq: AtomicI64,
    pending: PendingMap,
    events: Mutex<mpsc::UnboundedReceiver<DapEvent>>,
    current_thread: Arc<AtomicI64>,
    capabilities: Mutex<Option<Capabilities>>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl DapClient {
    /// Spawn the debugger binary with piped stdio and start the reader task.
    pub async fn spawn(program: &str, args: &[String]) -> DapResult<Self> {
        debug!(%program, "spawning debugger");
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| DapError::Protocol("debugger stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| DapError::Protocol("debugger stdout unavailable".to_string()))?;

        let pending: PendingMap = Arc::default();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let current_thread = Arc::new(AtomicI64::new(0));

        let reader = tokio::spawn(read_loop(
            stdout,
            Arc::clone(&pending),
            events_tx,
            Arc::clone(&current_thread),
        ));

        Ok(Self {
            inner: Arc::new(ClientInner {
                stdin: Mutex::new(stdin),
                child: Mutex::new(child),
                seq: AtomicI64::new(0),
                pending,
                events: Mutex::new(events_rx),
                current_thread,
                capabilities: Mutex::new(None),
                reader: Mutex::new(Some(reader)),
            }),
        })
    }

    /// Send one request and await its response.
    ///
    /// Sequence numbers start at 1 and increase monotonically. The header
    /// and JSON body go out in a single write.
    pub async fn send_request(
        &self,
        command: &str,
        arguments: serde_json::Value,
    ) -> DapResult<Response> {
        let seq = self.inner.seq.fetch_add(1, Ordering::SeqCst) + 1;
        let frame = encode_frame(&ProtocolMessage::Request(Request {
            seq,
            command: command.to_string(),
            arguments,
        }))?;

        let (tx, rx) = oneshot::channel();
        self.inner.pending.lock().await.insert(
            seq,
            PendingRequest {
                command: command.to_string(),
                tx,
            },
        );

        let write_result = {
            let mut stdin = self.inner.stdin.lock().await;
            match stdin.write_all(&frame).await {
                Ok(()) => stdin.flush().await,
                Err(e) => Err(e),
            }
        };
        if let Err(e) = write_result {
            self.inner.pending.lock().await.remove(&seq);
            return Err(e.into());
        }

        rx.await.map_err(|_| DapError::Closed)?
    }

    /// Receive the next event. `None` means the transport is gone.
    pub async fn recv_event(&self) -> Option<DapEvent> {
        self.inner.events.lock().await.recv().await
    }

    /// Thread id for step/continue requests: the explicit argument, or the
    /// thread of the last `stopped` event.
    pub fn default_thread(&self, explicit: Option<i64>) -> DapResult<i64> {
        if let Some(id) = explicit {
            return Ok(id);
        }
        match self.inner.current_thread.load(Ordering::SeqCst) {
            0 => Err(DapError::NoThread),
            id => Ok(id),
        }
    }

    /// Thread id cached from the most recent `stopped` event, if any.
    pub fn last_stopped_thread(&self) -> Option<i64> {
        match self.inner.current_thread.load(Ordering::SeqCst) {
            0 => None,
            id => Some(id),
        }
    }

    pub(crate) async fn store_capabilities(&self, caps: Capabilities) {
        *self.inner.capabilities.lock().await = Some(caps);
    }

    pub async fn capabilities(&self) -> Option<Capabilities> {
        self.inner.capabilities.lock().await.clone()
    }

    /// Tear the transport down: stop the reader, reject everything pending,
    /// kill the child.
    pub async fn kill(&self) {
        if let Some(handle) = self.inner.reader.lock().await.take() {
            handle.abort();
        }
        reject_all(&self.inner.pending).await;
        if let Err(e) = self.inner.child.lock().await.kill().await {
            debug!(error = %e, "debugger child already gone");
        }
    }
}

async fn read_loop<R>(
    mut input: R,
    pending: PendingMap,
    events: mpsc::UnboundedSender<DapEvent>,
    current_thread: Arc<AtomicI64>,
) where
    R: AsyncRead + Unpin,
{
    let mut decoder = FrameDecoder::new();
    let mut chunk = [0u8; 8192];

    'outer: loop {
        let read = match input.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                warn!(error = %e, "debugger stdout read failed");
                break;
            }
        };
        decoder.extend(&chunk[..read]);

        loop {
            match decoder.next_frame() {
                Ok(Some(message)) => {
                    dispatch(message, &pending, &events, &current_thread).await;
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "malformed DAP frame, closing transport");
                    break 'outer;
                }
            }
        }
    }

    reject_all(&pending).await;
}

async fn dispatch(
    message: ProtocolMessage,
    pending: &PendingMap,
    events: &mpsc::UnboundedSender<DapEvent>,
    current_thread: &AtomicI64,
) {
    match message {
        ProtocolMessage::Response(response) => {
            let waiting = pending.lock().await.remove(&response.request_seq);
            match waiting {
                Some(PendingRequest { command, tx }) => {
                    let result = if response.success {
                        Ok(response)
                    } else {
                        let message = response
                            .message
                            .clone()
                            .unwrap_or_else(|| format!("Request {command} failed"));
                        Err(DapError::Request(message))
                    };
                    let _ = tx.send(result);
                }
                None => {
                    debug!(
                        request_seq = response.request_seq,
                        "discarding response without a pending request"
                    );
                }
            }
        }
        ProtocolMessage::Event(event) => {
            if event.event == "stopped" {
                if let Some(thread_id) = event.body.get("threadId").and_then(|v| v.as_i64()) {
                    current_thread.store(thread_id, Ordering::SeqCst);
                }
            }
            let _ = events.send(DapEvent {
                event: event.event,
                body: event.body,
            });
        }
        ProtocolMessage::Request(request) => {
            // Reverse requests are declined at initialize time.
            warn!(command = %request.command, "ignoring reverse request from debugger");
        }
    }
}

async fn reject_all(pending: &PendingMap) {
    let drained: Vec<PendingRequest> = pending.lock().await.drain().map(|(_, p)| p).collect();
    for request in drained {
        let _ = request.tx.send(Err(DapError::Closed));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(json: &str) -> Vec<u8> {
        format!("Content-Length: {}\r\n\r\n{}", json.len(), json).into_bytes()
    }

    struct Harness {
        server: tokio::io::DuplexStream,
        pending: PendingMap,
        events: mpsc::UnboundedReceiver<DapEvent>,
        current_thread: Arc<AtomicI64>,
        task: JoinHandle<()>,
    }

    fn start_read_loop() -> Harness {
        let (server, client) = tokio::io::duplex(4096);
        let pending: PendingMap = Arc::default();
        let (events_tx, events) = mpsc::unbounded_channel();
        let current_thread = Arc::new(AtomicI64::new(0));
        let task = tokio::spawn(read_loop(
            client,
            Arc::clone(&pending),
            events_tx,
            Arc::clone(&current_thread),
        ));
        Harness {
            server,
            pending,
            events,
            current_thread,
            task,
        }
    }

    #[tokio::test]
    async fn successful_response_completes_pending_request() {
        let mut h = start_read_loop();

        let (tx, rx) = oneshot::channel();
        h.pending.lock().await.insert(
            3,
            PendingRequest {
                command: "threads".to_string(),
                tx,
            },
        );

        let json = r#"{"type":"response","request_seq":3,"success":true,"command":"threads","body":{"threads":[{"id":1,"name":"main"}]}}"#;
        h.server.write_all(&frame(json)).await.unwrap();

        let response = rx.await.unwrap().unwrap();
        assert_eq!(response.request_seq, 3);
        assert!(response.success);

        drop(h.server);
        h.task.await.unwrap();
    }

    #[tokio::test]
    async fn failed_response_carries_debugger_message() {
        let mut h = start_read_loop();

        let (tx, rx) = oneshot::channel();
        h.pending.lock().await.insert(
            5,
            PendingRequest {
                command: "evaluate".to_string(),
                tx,
            },
        );

        let json = r#"{"type":"response","request_seq":5,"success":false,"command":"evaluate","message":"error CS0103: The name 'b' does not exist"}"#;
        h.server.write_all(&frame(json)).await.unwrap();

        let err = rx.await.unwrap().unwrap_err();
        assert!(err.to_string().contains("CS0103"));

        drop(h.server);
        h.task.await.unwrap();
    }

    #[tokio::test]
    async fn failed_response_without_message_gets_default() {
        let mut h = start_read_loop();

        let (tx, rx) = oneshot::channel();
        h.pending.lock().await.insert(
            2,
            PendingRequest {
                command: "pause".to_string(),
                tx,
            },
        );

        let json = r#"{"type":"response","request_seq":2,"success":false,"command":"pause"}"#;
        h.server.write_all(&frame(json)).await.unwrap();

        let err = rx.await.unwrap().unwrap_err();
        assert_eq!(err.to_string(), "Request pause failed");

        drop(h.server);
        h.task.await.unwrap();
    }

    #[tokio::test]
    async fn stopped_event_caches_thread_and_is_forwarded() {
        let mut h = start_read_loop();

        let json = r#"{"type":"event","event":"stopped","body":{"reason":"breakpoint","threadId":7}}"#;
        h.server.write_all(&frame(json)).await.unwrap();

        let event = h.events.recv().await.unwrap();
        assert_eq!(event.event, "stopped");
        assert_eq!(h.current_thread.load(Ordering::SeqCst), 7);

        drop(h.server);
        h.task.await.unwrap();
    }

    #[tokio::test]
    async fn stream_close_rejects_pending_requests() {
        let h = start_read_loop();

        let (tx, rx) = oneshot::channel();
        h.pending.lock().await.insert(
            9,
            PendingRequest {
                command: "stackTrace".to_string(),
                tx,
            },
        );

        drop(h.server);
        h.task.await.unwrap();

        let err = rx.await.unwrap().unwrap_err();
        assert!(matches!(err, DapError::Closed));
        assert!(h.pending.lock().await.is_empty());
    }

    #[tokio::test]
    async fn unmatched_response_is_discarded() {
        let mut h = start_read_loop();

        let json = r#"{"type":"response","request_seq":99,"success":true,"command":"threads"}"#;
        h.server.write_all(&frame(json)).await.unwrap();

        // Follow with an event to prove the loop is still alive.
        let json = r#"{"type":"event","event":"terminated"}"#;
        h.server.write_all(&frame(json)).await.unwrap();

        let event = h.events.recv().await.unwrap();
        assert_eq!(event.event, "terminated");

        drop(h.server);
        h.task.await.unwrap();
    }
}
