//! Dispatch fixtures backed by the scripted backend.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};

use crate::execution::test_utils::ScriptedBackend;
use crate::execution::{BackendGateway, ExecutionEngine};
use crate::metrics::SessionMetrics;

use super::{CommandRequest, DispatchContext};

pub(crate) const TEST_GRACE: Duration = Duration::from_millis(200);
pub(crate) const TEST_DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

/// Context over a fresh scripted backend, returned alongside it.
pub(crate) fn scripted_context() -> (Arc<ScriptedBackend>, DispatchContext) {
    let backend = Arc::new(ScriptedBackend::new());
    let gateway = Arc::new(BackendGateway::new(backend.clone()));
    let engine = Arc::new(ExecutionEngine::new(gateway, TEST_GRACE));
    let metrics = Arc::new(SessionMetrics::with_session_id("test-session"));
    let context = DispatchContext::new(engine, metrics, TEST_DEFAULT_TIMEOUT);
    (backend, context)
}

/// Request with arguments taken from a JSON object literal.
pub(crate) fn request(id: i64, command: &str, args: Value) -> CommandRequest {
    let args = match args {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    CommandRequest::new(id, command, args)
}
