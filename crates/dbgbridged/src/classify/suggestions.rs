use super::ErrorCategory;

/// Remediation hint for `category`, refined by the leading word of `command`.
///
/// Returns `None` for [`ErrorCategory::Unknown`].
#[must_use]
pub fn suggest(category: ErrorCategory, command: &str) -> Option<String> {
    let verb = command.split_whitespace().next().unwrap_or_default();
    let hint = match category {
        ErrorCategory::CommandSyntax if verb.is_empty() => {
            "Check the command syntax.".to_owned()
        }
        ErrorCategory::CommandSyntax => {
            format!("Check the command syntax. Use '.help {verb}' for help.")
        }
        ErrorCategory::ExtensionOrDependencyMissing if verb.starts_with('!') => format!(
            "'{verb}' is provided by a debugger extension. Load it with '.load' and retry."
        ),
        ErrorCategory::ExtensionOrDependencyMissing => {
            "A required extension or dependency is missing. Load it and retry.".to_owned()
        }
        ErrorCategory::ResourceResolution if verb.eq_ignore_ascii_case("dt") => {
            "Verify the type name and module prefix, then reload symbols with '.reload'."
                .to_owned()
        }
        ErrorCategory::ResourceResolution => {
            "The symbol or module could not be resolved. Check the name and reload symbols with '.reload'."
                .to_owned()
        }
        ErrorCategory::MemoryAccess if is_memory_display(verb) => {
            "The address is not readable in the target. Verify it with '!address' first."
                .to_owned()
        }
        ErrorCategory::MemoryAccess => {
            "The command touched memory that could not be accessed. Verify the address is mapped."
                .to_owned()
        }
        ErrorCategory::PermissionDenied => {
            "The command requires elevated privileges. Run the debugger with sufficient rights."
                .to_owned()
        }
        ErrorCategory::ResourceExhaustion => {
            "The system is low on resources. Close unnecessary applications and try again."
                .to_owned()
        }
        ErrorCategory::ConnectionLost => {
            "The connection to the debugger was lost. Try reconnecting to the target.".to_owned()
        }
        ErrorCategory::Timeout => {
            "The command timed out. Try increasing the timeout or breaking the command into smaller parts."
                .to_owned()
        }
        ErrorCategory::ExecutionContext => {
            "The command failed due to execution context. Ensure you are in the correct process/thread context."
                .to_owned()
        }
        ErrorCategory::InternalError => {
            "An internal error occurred. Check the debugger state and try again.".to_owned()
        }
        ErrorCategory::Unknown => return None,
    };
    Some(hint)
}

fn is_memory_display(verb: &str) -> bool {
    let verb = verb.to_ascii_lowercase();
    ["db", "dw", "dd", "dq", "da", "du", "dp"]
        .iter()
        .any(|prefix| verb.starts_with(prefix))
}
