//! Behavioural scenarios for a client session against a live server.

use std::cell::RefCell;
use std::thread;
use std::time::{Duration, Instant};

use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use serde_json::{Value, json};

use crate::execution::test_utils::Step;

use super::support::{BridgeWorld, Client, INTERRUPT_GRACE};

const REQUEST_ID: i64 = 42;

struct SessionWorld {
    bridge: Option<BridgeWorld>,
    client: Option<Client>,
    reply: Option<Value>,
    deadline: Duration,
    waited: Duration,
}

impl SessionWorld {
    fn new() -> Self {
        Self {
            bridge: None,
            client: None,
            reply: None,
            deadline: Duration::ZERO,
            waited: Duration::ZERO,
        }
    }

    fn bridge(&self) -> &BridgeWorld {
        self.bridge.as_ref().expect("bridge server should be running")
    }

    fn client(&mut self) -> &mut Client {
        if self.client.is_none() {
            self.client = Some(self.bridge().connect());
        }
        self.client.as_mut().expect("client connected")
    }

    fn call(&mut self, command: &str, args: Value) {
        let started = Instant::now();
        let reply = self.client().call(REQUEST_ID, command, args);
        self.waited = started.elapsed();
        self.reply = Some(reply);
    }

    fn reply(&self) -> &Value {
        self.reply.as_ref().expect("a reply should have been read")
    }

    fn tracked_connections(&self) -> usize {
        let deadline = Instant::now() + Duration::from_secs(4);
        loop {
            let tracked = self.bridge().server.status().connections;
            if tracked == 0 || Instant::now() >= deadline {
                return tracked;
            }
            thread::sleep(Duration::from_millis(20));
        }
    }
}

impl Drop for SessionWorld {
    fn drop(&mut self) {
        self.client = None;
        self.bridge = None;
    }
}

#[fixture]
fn world() -> RefCell<SessionWorld> {
    RefCell::new(SessionWorld::new())
}

#[given("a bridge server is running")]
fn given_bridge_server(world: &RefCell<SessionWorld>) {
    world.borrow_mut().bridge = Some(BridgeWorld::start_with(|_| {}));
}

#[given("the engine ignores interrupts")]
fn given_stubborn_engine(world: &RefCell<SessionWorld>) {
    world
        .borrow()
        .bridge()
        .backend
        .push(Step::hang_ignoring_interrupt(Duration::from_secs(5)));
}

#[when(r#"a client sends "{command}""#)]
fn when_client_sends(world: &RefCell<SessionWorld>, command: String) {
    world.borrow_mut().call(strip_quotes(&command), json!({}));
}

#[when(r#"the client sends "{command}""#)]
fn when_same_client_sends(world: &RefCell<SessionWorld>, command: String) {
    world.borrow_mut().call(strip_quotes(&command), json!({}));
}

#[when("a client sends a malformed frame")]
fn when_client_sends_garbage(world: &RefCell<SessionWorld>) {
    let mut world = world.borrow_mut();
    let client = world.client();
    client.send_line("this is not json");
    let reply = client.recv();
    world.reply = Some(reply);
}

#[when(r#"a client runs "{command}" with a {timeout} ms timeout"#)]
fn when_client_runs_with_timeout(world: &RefCell<SessionWorld>, command: String, timeout: u64) {
    let mut world = world.borrow_mut();
    world.deadline = Duration::from_millis(timeout);
    world.call(
        "execute_command",
        json!({"command": strip_quotes(&command), "timeout_ms": timeout}),
    );
}

#[when("two clients connect and disconnect")]
fn when_clients_come_and_go(world: &RefCell<SessionWorld>) {
    let world = world.borrow();
    let bridge = world.bridge();
    let clients = [bridge.connect(), bridge.connect()];
    assert!(bridge.wait_for_connections(2), "clients were never tracked");
    drop(clients);
}

#[then(r#"the reply status is "{status}""#)]
fn then_reply_status(world: &RefCell<SessionWorld>, status: String) {
    let world = world.borrow();
    assert_eq!(world.reply()["status"], strip_quotes(&status), "{}", world.reply());
}

#[then("the reply echoes the request id")]
fn then_reply_echoes_id(world: &RefCell<SessionWorld>) {
    assert_eq!(world.borrow().reply()["id"], REQUEST_ID);
}

#[then(r#"the reply error code is "{code}""#)]
fn then_reply_error_code(world: &RefCell<SessionWorld>, code: String) {
    let world = world.borrow();
    assert_eq!(world.reply()["error_code"], strip_quotes(&code), "{}", world.reply());
}

#[then(r#"the reply error category is "{category}""#)]
fn then_reply_error_category(world: &RefCell<SessionWorld>, category: String) {
    let world = world.borrow();
    assert_eq!(
        world.reply()["error_category"],
        strip_quotes(&category),
        "{}",
        world.reply()
    );
}

#[then("the reply arrives within the interrupt grace period")]
fn then_reply_is_prompt(world: &RefCell<SessionWorld>) {
    let world = world.borrow();
    let limit = world.deadline + INTERRUPT_GRACE + Duration::from_millis(300);
    assert!(world.waited >= world.deadline, "replied early: {:?}", world.waited);
    assert!(world.waited < limit, "waited {:?}", world.waited);
}

#[then("the engine has run {count} commands")]
fn then_engine_ran(world: &RefCell<SessionWorld>, count: usize) {
    assert_eq!(world.borrow().bridge().backend.commands().len(), count);
}

#[then("the engine was interrupted {count} time")]
fn then_engine_interrupted(world: &RefCell<SessionWorld>, count: usize) {
    assert_eq!(world.borrow().bridge().backend.interrupts(), count);
}

#[then("the server tracks {count} connections")]
fn then_server_tracks(world: &RefCell<SessionWorld>, count: usize) {
    assert_eq!(world.borrow().tracked_connections(), count);
}

fn strip_quotes(value: &str) -> &str {
    value.trim_matches('"')
}

#[scenario(path = "tests/features/bridge_session.feature")]
fn bridge_session(#[from(world)] world: RefCell<SessionWorld>) {
    drop(world);
}
