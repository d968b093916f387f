//! Scripted transports for exercising the connection client without a real
//! server process or socket.
//!
//! `ScriptedTransport` answers requests from per-method queues, falling back
//! to plausible defaults so tests only script the step they care about.
//! `ScriptedFactory` hands out a planned sequence of transports (or connect
//! failures) and counts how many sessions were opened, which is how tests
//! observe reconnects.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};

use super::errors::McpError;
use super::transport::{Transport, TransportFactory};
use super::types::{JsonRpcResponse, MCP_PROTOCOL_VERSION};

/// One scripted answer for a request.
pub(crate) enum Scripted {
    Ok(Value),
    Err(McpError),
    /// Never answer; lets timeout paths fire.
    Hang,
}

/// Shared log of every request and notification sent, in order.
pub(crate) type CallLog = Arc<Mutex<Vec<(String, Option<Value>)>>>;

// ─── Scripted Transport ──────────────────────────────────────────────────────

pub(crate) struct ScriptedTransport {
    script: Mutex<HashMap<String, VecDeque<Scripted>>>,
    calls: CallLog,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(HashMap::new()),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Queue a successful result for the next request with this method.
    pub fn script_ok(&self, method: &str, value: Value) {
        self.push(method, Scripted::Ok(value));
    }

    /// Queue a failure for the next request with this method.
    pub fn script_err(&self, method: &str, err: McpError) {
        self.push(method, Scripted::Err(err));
    }

    /// Queue a request with this method to hang forever.
    pub fn script_hang(&self, method: &str) {
        self.push(method, Scripted::Hang);
    }

    fn push(&self, method: &str, entry: Scripted) {
        self.script
            .lock()
            .unwrap()
            .entry(method.to_string())
            .or_default()
            .push_back(entry);
    }

    fn attach_log(&mut self, calls: CallLog) {
        self.calls = calls;
    }

    /// Default answer when nothing is scripted for `method`.
    fn default_result(method: &str) -> Value {
        match method {
            "initialize" => json!({
                "protocolVersion": MCP_PROTOCOL_VERSION,
                "capabilities": {},
                "serverInfo": { "name": "scripted-server", "version": "0.0.1" },
            }),
            "tools/list" => json!({
                "tools": [
                    {
                        "name": "getFleetOverview",
                        "description": "Summarize fleet state",
                        "inputSchema": { "type": "object", "properties": {} },
                    },
                    {
                        "name": "searchDevices",
                        "description": "Search devices by attribute",
                        "inputSchema": { "type": "object", "properties": {} },
                    },
                    {
                        "name": "createPolicy",
                        "description": "Create an enforcement policy",
                        "inputSchema": { "type": "object", "properties": {} },
                    },
                ],
            }),
            "resources/list" => json!({ "resources": [] }),
            "tools/call" => json!({
                "content": [{ "type": "text", "text": "ok" }],
                "isError": false,
            }),
            "resources/read" => json!({
                "contents": [{ "uri": "fleet://status", "text": "all good" }],
            }),
            _ => json!({}),
        }
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn request(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Result<JsonRpcResponse, McpError> {
        self.calls
            .lock()
            .unwrap()
            .push((method.to_string(), params));

        let scripted = self
            .script
            .lock()
            .unwrap()
            .get_mut(method)
            .and_then(|queue| queue.pop_front());

        let value = match scripted {
            Some(Scripted::Ok(value)) => value,
            Some(Scripted::Err(err)) => return Err(err),
            Some(Scripted::Hang) => {
                std::future::pending::<()>().await;
                unreachable!()
            }
            None => Self::default_result(method),
        };

        Ok(JsonRpcResponse {
            jsonrpc: "2.0".into(),
            id: 0,
            result: Some(value),
            error: None,
        })
    }

    async fn notify(&self, method: &str, params: Option<Value>) -> Result<(), McpError> {
        self.calls
            .lock()
            .unwrap()
            .push((method.to_string(), params));
        Ok(())
    }

    async fn close(&self) -> Result<(), McpError> {
        self.calls.lock().unwrap().push(("close".to_string(), None));
        Ok(())
    }
}

// ─── Scripted Factory ────────────────────────────────────────────────────────

pub(crate) struct ScriptedFactory {
    planned: Mutex<VecDeque<Result<ScriptedTransport, McpError>>>,
    connects: AtomicU32,
    calls: CallLog,
}

impl ScriptedFactory {
    pub fn new() -> Self {
        Self {
            planned: Mutex::new(VecDeque::new()),
            connects: AtomicU32::new(0),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Queue a transport to hand out on the next connect. When the queue is
    /// empty, connects succeed with a fresh all-defaults transport.
    pub fn push_transport(&self, transport: ScriptedTransport) {
        self.planned.lock().unwrap().push_back(Ok(transport));
    }

    /// Queue the next connect to fail.
    pub fn push_connect_failure(&self, err: McpError) {
        self.planned.lock().unwrap().push_back(Err(err));
    }

    /// How many sessions have been opened (initial connect plus reconnects).
    pub fn connect_count(&self) -> u32 {
        self.connects.load(Ordering::SeqCst)
    }

    /// Every request/notification sent across all transports, in order.
    pub fn call_log(&self) -> Vec<(String, Option<Value>)> {
        self.calls.lock().unwrap().clone()
    }

    /// Method names from the call log, for order assertions.
    pub fn methods_called(&self) -> Vec<String> {
        self.call_log().into_iter().map(|(method, _)| method).collect()
    }
}

#[async_trait]
impl TransportFactory for Arc<ScriptedFactory> {
    fn describe(&self) -> String {
        "scripted".into()
    }

    async fn connect(&self) -> Result<Box<dyn Transport>, McpError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let planned = self.planned.lock().unwrap().pop_front();
        let mut transport = match planned {
            Some(Ok(transport)) => transport,
            Some(Err(err)) => return Err(err),
            None => ScriptedTransport::new(),
        };
        transport.attach_log(Arc::clone(&self.calls));
        Ok(Box::new(transport))
    }
}
