//! Connectivity, version, and backend query commands.

use std::time::Duration;

use serde_json::json;

use crate::dispatch::{HandlerError, HandlerOutput, Invocation};

const DEFAULT_DUMP_LENGTH: u64 = 32;
/// Deadline for bulk and long-running commands without `timeout_ms`.
const BULK_TIMEOUT: Duration = Duration::from_secs(60);
const STREAM_THRESHOLD_BYTES: usize = 50_000;
const STREAM_CHUNK_BYTES: usize = 4096;

pub(super) fn check_connection(call: &Invocation<'_>) -> Result<HandlerOutput, HandlerError> {
    let session_id = call.context().metrics().session_id();
    Ok(HandlerOutput::text("Connected to debugger bridge").with_details(json!({
        "connected": true,
        "session_id": session_id,
    })))
}

pub(super) fn version(_call: &Invocation<'_>) -> Result<HandlerOutput, HandlerError> {
    Ok(HandlerOutput::text(concat!(
        env!("CARGO_PKG_NAME"),
        " ",
        env!("CARGO_PKG_VERSION")
    )))
}

/// Backs both `execute_command` and `execute_control`; the registered kind
/// decides how empty output is treated.
pub(super) fn execute(call: &Invocation<'_>) -> Result<HandlerOutput, HandlerError> {
    let command = call.required_str("command")?;
    call.execute(command).map(HandlerOutput::executed)
}

/// `execute_command` with an opt-out for the metadata block.
pub(super) fn execute_enhanced(call: &Invocation<'_>) -> Result<HandlerOutput, HandlerError> {
    let command = call.required_str("command")?;
    let include_metadata = call.bool_arg("include_metadata")?.unwrap_or(true);
    let output = call.execute(command).map(HandlerOutput::executed)?;
    Ok(if include_metadata {
        output
    } else {
        output.without_metadata()
    })
}

/// Runs a long command and describes how its output would be chunked.
pub(super) fn execute_streaming(call: &Invocation<'_>) -> Result<HandlerOutput, HandlerError> {
    let command = call.required_str("command")?;
    let executed = call.execute_with_timeout(command, call.timeout_or(BULK_TIMEOUT)?)?;
    let output_size = executed.output.len();
    let enabled = output_size > STREAM_THRESHOLD_BYTES;
    let chunk_count = if enabled {
        output_size / STREAM_CHUNK_BYTES + 1
    } else {
        1
    };
    Ok(HandlerOutput::executed(executed).with_details(json!({
        "streaming": {
            "enabled": enabled,
            "output_size": output_size,
            "chunk_count": chunk_count,
        }
    })))
}

/// Runs `args.command` once per loaded module.
pub(super) fn for_each_module(call: &Invocation<'_>) -> Result<HandlerOutput, HandlerError> {
    let module_command = call.required_str("command")?;
    call.execute_with_timeout(
        &format!("!for_each_module {module_command}"),
        call.timeout_or(BULK_TIMEOUT)?,
    )
    .map(HandlerOutput::executed)
}

pub(super) fn list_modules(call: &Invocation<'_>) -> Result<HandlerOutput, HandlerError> {
    let command = match call.str_arg("options")? {
        Some(options) => format!("lm {options}"),
        None => "lm".to_owned(),
    };
    call.execute(&command).map(HandlerOutput::executed)
}

pub(super) fn display_type(call: &Invocation<'_>) -> Result<HandlerOutput, HandlerError> {
    let type_name = call.required_str("type_name")?;
    let command = match call.str_arg("address")? {
        Some(address) => format!("dt {type_name} {address}"),
        None => format!("dt {type_name}"),
    };
    call.execute(&command).map(HandlerOutput::executed)
}

pub(super) fn display_memory(call: &Invocation<'_>) -> Result<HandlerOutput, HandlerError> {
    let address = call.required_str("address")?;
    let length = call.u64_arg("length")?.unwrap_or(DEFAULT_DUMP_LENGTH);
    if length == 0 {
        return Err(HandlerError::invalid_arguments(
            "'length' must be greater than zero",
        ));
    }
    call.execute(&format!("dd {address} L{length}"))
        .map(HandlerOutput::executed)
}

pub(super) fn metadata(call: &Invocation<'_>) -> Result<HandlerOutput, HandlerError> {
    let target = call.execute("!target")?;
    let modules = call.execute("lm")?;
    let output = format!("Target:\n{}\n\nModules:\n{}", target.output, modules.output);
    Ok(HandlerOutput {
        output,
        execution_time: Some(target.elapsed + modules.elapsed),
        details: None,
        include_metadata: true,
    })
}
