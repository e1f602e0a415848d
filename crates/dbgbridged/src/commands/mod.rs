//! Built-in bridge commands.

mod basic;
mod diagnostic;

use crate::dispatch::{CommandKind, HandlerRegistry, HandlerRegistryBuilder, RegistryError};

/// Registers every built-in command on `builder`.
///
/// # Errors
///
/// Fails when a built-in name is already registered.
pub fn register_builtins(builder: &mut HandlerRegistryBuilder) -> Result<(), RegistryError> {
    builder
        .register("check_connection", CommandKind::Query, basic::check_connection)?
        .register("version", CommandKind::Query, basic::version)?
        .register("execute_command", CommandKind::Query, basic::execute)?
        .register("execute_control", CommandKind::SideEffecting, basic::execute)?
        .register(
            "execute_command_enhanced",
            CommandKind::Query,
            basic::execute_enhanced,
        )?
        .register(
            "execute_command_streaming",
            CommandKind::Query,
            basic::execute_streaming,
        )?
        .register("for_each_module", CommandKind::Query, basic::for_each_module)?
        .register("lm", CommandKind::Query, basic::list_modules)?
        .register("dt", CommandKind::Query, basic::display_type)?
        .register("dd", CommandKind::Query, basic::display_memory)?
        .register("get_metadata", CommandKind::Query, basic::metadata)?
        .register("health_check", CommandKind::Query, diagnostic::health_check)?
        .register(
            "performance_metrics",
            CommandKind::Query,
            diagnostic::performance_metrics,
        )?;
    Ok(())
}

/// Registry holding exactly the built-in commands.
///
/// # Errors
///
/// See [`register_builtins`].
pub fn builtin_registry() -> Result<HandlerRegistry, RegistryError> {
    let mut builder = HandlerRegistryBuilder::new();
    register_builtins(&mut builder)?;
    Ok(builder.build())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_register_without_collisions() {
        let registry = builtin_registry().expect("builtins");
        assert_eq!(registry.len(), 13);
        assert_eq!(registry.kind("for_each_module"), Some(CommandKind::Query));
        assert_eq!(
            registry.kind("execute_control"),
            Some(CommandKind::SideEffecting)
        );
        assert_eq!(registry.kind("execute_command"), Some(CommandKind::Query));
    }

    #[test]
    fn builtins_cannot_be_registered_twice() {
        let mut builder = HandlerRegistryBuilder::new();
        register_builtins(&mut builder).expect("first pass");
        let error = register_builtins(&mut builder).expect_err("second pass");
        assert_eq!(
            error,
            RegistryError::Duplicate {
                name: "check_connection".into()
            }
        );
    }
}
