use std::time::Duration;

use crate::execution::{Backend, BackendReply, ResultCode};

/// Stand-in used when no backend program is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableBackend;

impl Backend for UnavailableBackend {
    fn execute(&self, _command: &str, _timeout: Duration) -> BackendReply {
        BackendReply::new(
            "backend engine is not configured",
            ResultCode::RPC_SERVER_DIED,
        )
    }

    fn interrupt(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::{ErrorCategory, classify};

    #[test]
    fn every_command_reports_a_lost_engine() {
        let reply = UnavailableBackend.execute("version", Duration::from_secs(1));
        assert_eq!(reply.code, ResultCode::RPC_SERVER_DIED);
        assert_eq!(
            classify(&reply.output, Some(reply.code)),
            ErrorCategory::ConnectionLost
        );
        assert!(!UnavailableBackend.interrupt());
    }
}
