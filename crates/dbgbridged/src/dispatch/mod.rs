//! Request dispatch for the bridge.
//!
//! Inbound frames are parsed into [`CommandRequest`]s, routed through the
//! frozen [`HandlerRegistry`], and answered with exactly one reply:
//!
//! ```json
//! {"id":1,"type":"command","command":"version","args":{}}
//! {"id":1,"type":"response","command":"version","status":"success","output":"..."}
//! ```
//!
//! Frames that are not commands are answered with an error frame and the
//! connection stays open:
//!
//! ```json
//! {"type":"error","error_code":"invalid_message","error_message":"..."}
//! ```

mod context;
mod dispatcher;
mod errors;
mod registry;
mod request;
mod response;
mod shaping;
#[cfg(test)]
pub(crate) mod test_utils;

pub use self::context::{CommandKind, DispatchContext, Executed, Invocation};
pub use self::dispatcher::Dispatcher;
pub use self::errors::{HandlerError, RegistryError};
pub use self::registry::{HandlerOutput, HandlerRegistry, HandlerRegistryBuilder};
pub use self::request::CommandRequest;
pub use self::response::{
    CommandResponse, ErrorCode, ErrorDetails, FailureCategory, ProtocolError, ProtocolErrorCode,
    Reply, ResponseBody, ResponseMetadata,
};

pub(crate) const DISPATCH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::dispatch");
