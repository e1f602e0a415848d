//! End-to-end suites driving a live server over TCP.

mod session_behaviour;
mod support;
