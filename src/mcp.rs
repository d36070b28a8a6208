// Supabase MCP Gateway - MCP Server (JSON-RPC 2.0 over stdio)
// Copyright 2026 Joseph Stone - All Rights Reserved
//
// ALL tool calls route through the gateway.
// tools/list exposes the sealed registry; tools/call runs on its own
// worker so overlapping calls and notifications/cancelled are honored.

use crate::audit::AuditLog;
use crate::envelope::ResponseEnvelope;
use crate::gateway::{CancelToken, Gateway};
use crate::registry::Capability;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::io::{self, BufRead, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

pub const PROTOCOL_VERSION: &str = "2024-11-05";
pub const SERVER_NAME: &str = "supabase-mcp-gateway";
pub const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

const PARSE_ERROR: i64 = -32700;
const METHOD_NOT_FOUND: i64 = -32601;

/// Shared line-oriented output. Each message is written and flushed under
/// one lock so concurrent workers never interleave.
type Output = Arc<Mutex<Box<dyn Write + Send>>>;

fn write_message(out: &Output, message: &Value) {
    let msg = match serde_json::to_string(message) {
        Ok(s) => s,
        Err(e) => {
            log::error!("Failed to serialize response: {}", e);
            return;
        }
    };
    let mut guard = match out.lock() {
        Ok(g) => g,
        Err(poisoned) => poisoned.into_inner(),
    };
    let _ = guard.write_all(msg.as_bytes());
    let _ = guard.write_all(b"\n");
    let _ = guard.flush();
}

/// Send JSON-RPC response
fn send_response(out: &Output, id: &Value, result: Value) {
    write_message(out, &json!({
        "jsonrpc": "2.0",
        "id": id,
        "result": result,
    }));
}

/// Send JSON-RPC error response
fn send_error(out: &Output, id: &Value, code: i64, message: &str) {
    write_message(out, &json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": { "code": code, "message": message },
    }));
}

/// MCP tool definition for one capability
fn tool_def(capability: &Capability) -> Value {
    json!({
        "name": capability.name(),
        "description": capability.description(),
        "inputSchema": capability.input_schema(),
    })
}

/// MCP tools/call result for one envelope
pub fn call_result(envelope: &ResponseEnvelope) -> Value {
    json!({
        "content": [{ "type": "text", "text": envelope.display_text() }],
        "isError": !envelope.is_success(),
    })
}

/// Request ids may be numbers or strings
fn request_key(id: &Value) -> String {
    id.to_string()
}

/// In-flight calls by worker sequence number. Request ids are not unique
/// enough: a client may reuse one while the first call is still running.
type InFlight = Arc<Mutex<HashMap<u64, (String, CancelToken)>>>;

fn forget(in_flight: &InFlight, seq: u64) {
    if let Ok(mut map) = in_flight.lock() {
        map.remove(&seq);
    }
}

pub struct Server {
    gateway: Arc<Gateway>,
    audit: Arc<AuditLog>,
    out: Output,
    in_flight: InFlight,
    next_call: AtomicU64,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Server {
    pub fn new(gateway: Arc<Gateway>, audit: AuditLog, out: Box<dyn Write + Send>) -> Self {
        Self {
            gateway,
            audit: Arc::new(audit),
            out: Arc::new(Mutex::new(out)),
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            next_call: AtomicU64::new(1),
            workers: Mutex::new(Vec::new()),
        }
    }

    /// Read line-delimited JSON-RPC until EOF, then wait for in-flight calls
    pub fn serve<R: BufRead>(&self, input: R) {
        for line in input.lines() {
            let line = match line {
                Ok(l) => l,
                Err(e) => {
                    log::error!("stdin read error: {}", e);
                    break;
                }
            };

            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            match serde_json::from_str::<Value>(line) {
                Ok(msg) => self.handle_message(&msg),
                Err(e) => {
                    log::warn!("JSON parse error: {}", e);
                    send_error(&self.out, &Value::Null, PARSE_ERROR, &format!("Parse error: {}", e));
                }
            }
        }

        let workers: Vec<JoinHandle<()>> = match self.workers.lock() {
            Ok(mut w) => w.drain(..).collect(),
            Err(poisoned) => poisoned.into_inner().drain(..).collect(),
        };
        log::info!("stdin closed; waiting on {} worker(s)", workers.len());
        for worker in workers {
            let _ = worker.join();
        }
    }

    fn handle_message(&self, msg: &Value) {
        let method = msg["method"].as_str().unwrap_or("");
        let id = &msg["id"];
        let params = &msg["params"];

        log::debug!("Received: {}", method);

        match method {
            "initialize" => {
                send_response(&self.out, id, json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "capabilities": { "tools": { "listChanged": false } },
                    "serverInfo": {
                        "name": SERVER_NAME,
                        "version": SERVER_VERSION,
                    }
                }));
            }

            "notifications/initialized" => {
                // No response needed
            }

            "tools/list" => {
                let tools: Vec<Value> = self.gateway.registry().list().iter().map(tool_def).collect();
                send_response(&self.out, id, json!({ "tools": tools }));
            }

            "tools/call" => {
                if id.is_null() {
                    // A notification cannot carry a result back, so nothing runs
                    log::warn!("Ignoring tools/call sent without an id");
                } else {
                    self.spawn_call(id.clone(), params);
                }
            }

            "notifications/cancelled" => {
                let request_id = &params["requestId"];
                let key = request_key(request_id);
                let tokens: Vec<CancelToken> = match self.in_flight.lock() {
                    Ok(map) => map
                        .values()
                        .filter(|(k, _)| *k == key)
                        .map(|(_, token)| token.clone())
                        .collect(),
                    Err(_) => Vec::new(),
                };
                if tokens.is_empty() {
                    log::debug!("Cancel for unknown or finished request {}", request_id);
                }
                for token in tokens {
                    log::info!("Cancelling request {}", request_id);
                    token.cancel();
                }
            }

            "ping" => {
                send_response(&self.out, id, json!({}));
            }

            _ => {
                if !id.is_null() {
                    send_error(&self.out, id, METHOD_NOT_FOUND, &format!("Unknown method: {}", method));
                }
            }
        }
    }

    fn spawn_call(&self, id: Value, params: &Value) {
        let name = params["name"].as_str().unwrap_or("").to_string();
        let args = params.get("arguments").cloned().unwrap_or_else(|| json!({}));
        let seq = self.next_call.fetch_add(1, Ordering::Relaxed);
        let cancel = CancelToken::new();

        if let Ok(mut map) = self.in_flight.lock() {
            map.insert(seq, (request_key(&id), cancel.clone()));
        }
        self.audit.record_call(&name, &args);

        let worker = {
            let gateway = Arc::clone(&self.gateway);
            let audit = Arc::clone(&self.audit);
            let out = Arc::clone(&self.out);
            let in_flight = Arc::clone(&self.in_flight);
            let id = id.clone();
            let name = name.clone();
            move || {
                let envelope = gateway.handle_cancellable(&name, &args, &cancel);
                forget(&in_flight, seq);
                audit.record_outcome(&name, &envelope);
                send_response(&out, &id, call_result(&envelope));
            }
        };
        let spawned = std::thread::Builder::new().name("tools-call".to_string()).spawn(worker);
        self.track_worker(seq, &id, &name, spawned);
    }

    /// Keep a started worker for the EOF join. If it never started, drop its
    /// in-flight entry and answer the request with a TransportError.
    fn track_worker(&self, seq: u64, id: &Value, name: &str, spawned: io::Result<JoinHandle<()>>) {
        match spawned {
            Ok(handle) => {
                if let Ok(mut workers) = self.workers.lock() {
                    workers.retain(|w| !w.is_finished());
                    workers.push(handle);
                }
            }
            Err(e) => {
                log::error!("Failed to spawn tools/call worker: {}", e);
                forget(&self.in_flight, seq);
                let envelope = ResponseEnvelope::transport_error(format!("could not start '{}': {}", name, e));
                self.audit.record_outcome(name, &envelope);
                send_response(&self.out, id, call_result(&envelope));
            }
        }
    }
}

/// Main MCP server loop on stdio. Returns when stdin closes.
pub fn run(gateway: Arc<Gateway>, audit: AuditLog) {
    log::info!("Starting {} v{}", SERVER_NAME, SERVER_VERSION);
    log::info!("Serving {} capabilities", gateway.registry().len());
    if let Some(path) = audit.path() {
        log::info!("Audit log: {:?}", path);
    }

    let server = Server::new(gateway, audit, Box::new(io::stdout()));
    let stdin = io::stdin();
    server.serve(stdin.lock());
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::testing::ScriptedBackend;
    use crate::backend::BackendError;
    use crate::tools;
    use std::io::Cursor;
    use std::time::Duration;

    /// Writer that hands its bytes back to the test
    #[derive(Clone, Default)]
    struct Sink(Arc<Mutex<Vec<u8>>>);

    impl Write for Sink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Sink {
        fn messages(&self) -> Vec<Value> {
            let bytes = self.0.lock().unwrap().clone();
            String::from_utf8(bytes)
                .unwrap()
                .lines()
                .map(|l| serde_json::from_str(l).unwrap())
                .collect()
        }
    }

    fn run_session(backend: ScriptedBackend, input: &str) -> Vec<Value> {
        let gateway = Arc::new(Gateway::new(tools::build_registry(false).unwrap(), Arc::new(backend)));
        let sink = Sink::default();
        let server = Server::new(gateway, AuditLog::disabled(), Box::new(sink.clone()));
        server.serve(Cursor::new(input.to_string()));
        sink.messages()
    }

    fn by_id(messages: &[Value], id: i64) -> &Value {
        messages.iter().find(|m| m["id"] == json!(id)).expect("response for id")
    }

    #[test]
    fn initialize_and_list_tools() {
        let input = concat!(
            r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{}}"#, "\n",
            r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#, "\n",
            r#"{"jsonrpc":"2.0","id":2,"method":"tools/list"}"#, "\n",
        );
        let messages = run_session(ScriptedBackend::returning(json!([])), input);
        assert_eq!(messages.len(), 2);

        let init = by_id(&messages, 1);
        assert_eq!(init["result"]["protocolVersion"], PROTOCOL_VERSION);
        assert_eq!(init["result"]["serverInfo"]["name"], SERVER_NAME);

        let tools = by_id(&messages, 2)["result"]["tools"].as_array().unwrap().clone();
        assert_eq!(tools.len(), 8);
        assert_eq!(tools[0]["name"], "list_tables");
        assert_eq!(tools[0]["inputSchema"]["properties"]["schemas"]["default"], json!(["public"]));
    }

    #[test]
    fn tool_call_renders_payload() {
        let backend = ScriptedBackend::returning(json!([]))
            .then(Ok(json!([{"schema": "public", "name": "users"}])));
        let input = concat!(
            r#"{"jsonrpc":"2.0","id":1,"method":"tools/call","params":{"name":"list_tables","arguments":{}}}"#, "\n",
        );
        let messages = run_session(backend, input);
        let result = &by_id(&messages, 1)["result"];
        assert_eq!(result["isError"], json!(false));
        assert_eq!(result["content"][0]["text"], "public.users");
    }

    #[test]
    fn rejected_call_is_flagged_as_error() {
        let backend = ScriptedBackend::failing(BackendError::Rejected("permission denied".into()));
        let input = concat!(
            r#"{"jsonrpc":"2.0","id":"a","method":"tools/call","params":{"name":"execute_sql","arguments":{"query":"select 1"}}}"#, "\n",
        );
        let messages = run_session(backend, input);
        let result = &messages[0]["result"];
        assert_eq!(messages[0]["id"], "a");
        assert_eq!(result["isError"], json!(true));
        assert_eq!(result["content"][0]["text"], "CapabilityError: permission denied");
    }

    #[test]
    fn unknown_tool_is_validation_error_not_rpc_error() {
        let input = concat!(
            r#"{"jsonrpc":"2.0","id":7,"method":"tools/call","params":{"name":"drop_database"}}"#, "\n",
        );
        let messages = run_session(ScriptedBackend::returning(json!([])), input);
        let text = messages[0]["result"]["content"][0]["text"].as_str().unwrap();
        assert!(text.starts_with("ValidationError"));
        assert!(text.contains("drop_database"));
    }

    #[test]
    fn cancelled_call_still_gets_one_response() {
        let backend = ScriptedBackend::returning(json!([])).slow(Duration::from_millis(400));
        let input = concat!(
            r#"{"jsonrpc":"2.0","id":3,"method":"tools/call","params":{"name":"list_extensions"}}"#, "\n",
            r#"{"jsonrpc":"2.0","method":"notifications/cancelled","params":{"requestId":3}}"#, "\n",
        );
        let messages = run_session(backend, input);
        assert_eq!(messages.len(), 1);
        let text = messages[0]["result"]["content"][0]["text"].as_str().unwrap();
        assert!(text.starts_with("TransportError"), "{}", text);
    }

    #[test]
    fn protocol_errors() {
        let input = concat!(
            "not json\n",
            r#"{"jsonrpc":"2.0","id":9,"method":"resources/list"}"#, "\n",
            r#"{"jsonrpc":"2.0","method":"notifications/unknown"}"#, "\n",
            r#"{"jsonrpc":"2.0","id":10,"method":"ping"}"#, "\n",
        );
        let messages = run_session(ScriptedBackend::returning(json!([])), input);
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0]["error"]["code"], json!(PARSE_ERROR));
        assert!(messages[0]["id"].is_null());
        assert_eq!(by_id(&messages, 9)["error"]["code"], json!(METHOD_NOT_FOUND));
        assert_eq!(by_id(&messages, 10)["result"], json!({}));
    }

    #[test]
    fn tool_call_without_id_never_runs() {
        let backend = Arc::new(ScriptedBackend::returning(json!([])));
        let gateway = Arc::new(Gateway::new(tools::build_registry(false).unwrap(), backend.clone()));
        let sink = Sink::default();
        let server = Server::new(gateway, AuditLog::disabled(), Box::new(sink.clone()));
        let input = concat!(
            r#"{"jsonrpc":"2.0","method":"tools/call","params":{"name":"list_tables","arguments":{}}}"#, "\n",
            r#"{"jsonrpc":"2.0","id":null,"method":"tools/call","params":{"name":"list_tables"}}"#, "\n",
        );
        server.serve(Cursor::new(input.to_string()));
        assert!(sink.messages().is_empty());
        assert_eq!(backend.call_count(), 0);
    }

    #[test]
    fn reused_request_id_cancels_every_matching_call() {
        let backend = ScriptedBackend::returning(json!([])).slow(Duration::from_millis(400));
        let input = concat!(
            r#"{"jsonrpc":"2.0","id":5,"method":"tools/call","params":{"name":"list_extensions"}}"#, "\n",
            r#"{"jsonrpc":"2.0","id":5,"method":"tools/call","params":{"name":"list_migrations"}}"#, "\n",
            r#"{"jsonrpc":"2.0","method":"notifications/cancelled","params":{"requestId":5}}"#, "\n",
        );
        let messages = run_session(backend, input);
        assert_eq!(messages.len(), 2);
        for message in &messages {
            assert_eq!(message["id"], json!(5));
            let text = message["result"]["content"][0]["text"].as_str().unwrap();
            assert!(text.starts_with("TransportError"), "{}", text);
        }
    }

    #[test]
    fn worker_that_fails_to_start_is_still_answered() {
        let gateway = Arc::new(Gateway::new(
            tools::build_registry(false).unwrap(),
            Arc::new(ScriptedBackend::returning(json!([]))),
        ));
        let sink = Sink::default();
        let server = Server::new(gateway, AuditLog::disabled(), Box::new(sink.clone()));
        server
            .in_flight
            .lock()
            .unwrap()
            .insert(42, (request_key(&json!(4)), CancelToken::new()));

        let failed = Err(io::Error::new(io::ErrorKind::Other, "no threads left"));
        server.track_worker(42, &json!(4), "list_tables", failed);

        assert!(server.in_flight.lock().unwrap().is_empty());
        let messages = sink.messages();
        assert_eq!(messages.len(), 1);
        let result = &by_id(&messages, 4)["result"];
        assert_eq!(result["isError"], json!(true));
        let text = result["content"][0]["text"].as_str().unwrap();
        assert!(text.starts_with("TransportError"), "{}", text);
        assert!(text.contains("no threads left"));
    }
}
