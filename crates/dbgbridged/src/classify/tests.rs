//! Classification checked against a fixed corpus of backend diagnostics.

use rstest::rstest;

use super::*;
use crate::execution::ResultCode;

#[rstest]
#[case("Syntax error at '!foo bar'", ErrorCategory::CommandSyntax)]
#[case("Unknown command 'zz'", ErrorCategory::CommandSyntax)]
#[case("No export badext found", ErrorCategory::ExtensionOrDependencyMissing)]
#[case(
    "!heapx is not extension gallery command",
    ErrorCategory::ExtensionOrDependencyMissing
)]
#[case("Couldn't resolve error at 'nt!NotAThing'", ErrorCategory::ResourceResolution)]
#[case("Symbol not found: _EPROCESS", ErrorCategory::ResourceResolution)]
#[case("Memory access error at ')'", ErrorCategory::MemoryAccess)]
#[case(
    "Unable to read memory at Address fffff800`00000000",
    ErrorCategory::MemoryAccess
)]
#[case("Access denied", ErrorCategory::PermissionDenied)]
#[case("Out of memory while building module list", ErrorCategory::ResourceExhaustion)]
#[case("RPC connection dropped", ErrorCategory::ConnectionLost)]
#[case("Operation TIMED OUT", ErrorCategory::Timeout)]
#[case("Invalid process context", ErrorCategory::ExecutionContext)]
#[case("Internal error: promise not set", ErrorCategory::InternalError)]
#[case("something odd happened", ErrorCategory::Unknown)]
#[case("", ErrorCategory::Unknown)]
fn classifies_known_diagnostics(#[case] message: &str, #[case] expected: ErrorCategory) {
    assert_eq!(classify(message, None), expected);
}

#[rstest]
#[case(ResultCode::INVALID_ARG, ErrorCategory::CommandSyntax)]
#[case(ResultCode::ACCESS_DENIED, ErrorCategory::PermissionDenied)]
#[case(ResultCode::OUT_OF_MEMORY, ErrorCategory::ResourceExhaustion)]
#[case(ResultCode::RPC_DISCONNECTED, ErrorCategory::ConnectionLost)]
#[case(ResultCode::RPC_SERVER_DIED, ErrorCategory::ConnectionLost)]
fn result_codes_take_precedence(#[case] code: ResultCode, #[case] expected: ErrorCategory) {
    assert_eq!(classify("Syntax error at 'x'", Some(code)), expected);
}

#[test]
fn unrecognised_codes_fall_back_to_keywords() {
    assert_eq!(
        classify("Memory access error at 'x'", Some(ResultCode::FAIL)),
        ErrorCategory::MemoryAccess
    );
}

#[test]
fn syntax_hint_names_the_command_verb() {
    let hint = suggest(ErrorCategory::CommandSyntax, "dt nt!_PEB").expect("hint");
    assert!(hint.contains(".help dt"), "unexpected hint: {hint}");
}

#[test]
fn extension_hint_mentions_bang_command() {
    let hint = suggest(ErrorCategory::ExtensionOrDependencyMissing, "!heapx -s").expect("hint");
    assert!(hint.contains("'!heapx'"), "unexpected hint: {hint}");
}

#[rstest]
#[case("dd 0x1000 L4")]
#[case("DQ rsp")]
fn memory_display_commands_get_address_hint(#[case] command: &str) {
    let hint = suggest(ErrorCategory::MemoryAccess, command).expect("hint");
    assert!(hint.contains("!address"), "unexpected hint: {hint}");
}

#[test]
fn unknown_has_no_suggestion() {
    assert_eq!(suggest(ErrorCategory::Unknown, "k"), None);
}

#[test]
fn wire_names_are_pascal_case() {
    let json = serde_json::to_string(&ErrorCategory::ExtensionOrDependencyMissing)
        .expect("serialize");
    assert_eq!(json, "\"ExtensionOrDependencyMissing\"");
    assert_eq!(ErrorCategory::Timeout.to_string(), "Timeout");
}
