//! Breakpoint semantics observed through the hook.

use crate::common::{self, MockVm, Step, call};
use luadap::debugger::state::State;
use serde_json::json;

#[test]
fn breakpoint_hit_then_continue() {
    let (transport, mut client) = common::pair();
    let script = vec![
        Step::TickUntil(State::Running),
        call("@main.lua", "main"),
        Step::Line(9),
        Step::Line(10),
        Step::Line(11),
        Step::Ret,
    ];
    let handle = common::run_script(transport, MockVm::new(), script);

    client.start_session(json!({}));
    let seq = client.request(
        "setBreakpoints",
        json!({"source": {"path": "main.lua"}, "breakpoints": [{"line": 10}]}),
    );
    client.expect_response(seq);
    client.configuration_done();

    let stopped = client.expect_event("stopped");
    assert_eq!(stopped["body"]["reason"], "breakpoint");
    assert_eq!(stopped["body"]["threadId"], 1);

    let seq = client.request("continue", json!({"threadId": 1}));
    let response = client.expect_response(seq);
    assert_eq!(response["body"]["allThreadsContinued"], true);

    // Line 11 must not stop again.
    let summary = handle.join().unwrap();
    assert_eq!(summary.state, State::Running);
    assert!(client.try_recv().is_none());
}

#[test]
fn set_breakpoints_replaces_previous_set() {
    let (transport, mut client) = common::pair();
    let script = vec![
        Step::TickUntil(State::Running),
        call("@main.lua", "main"),
        Step::Line(10),
        // After the swap only line 20 stops.
        Step::Line(10),
        Step::Line(20),
    ];
    let handle = common::run_script(transport, MockVm::new(), script);

    client.start_session(json!({}));
    let seq = client.request(
        "setBreakpoints",
        json!({"source": {"path": "main.lua"}, "breakpoints": [{"line": 10}]}),
    );
    client.expect_response(seq);
    client.configuration_done();

    client.expect_event("stopped");

    // Replace while stopped: main commands stay available inside a stop.
    let seq = client.request(
        "setBreakpoints",
        json!({"source": {"path": "main.lua"}, "breakpoints": [{"line": 20}]}),
    );
    let response = client.expect_response(seq);
    assert_eq!(response["body"]["breakpoints"][0]["verified"], true);
    assert_eq!(response["body"]["breakpoints"][0]["line"], 20);

    let seq = client.request("continue", json!({}));
    client.expect_response(seq);

    let stopped = client.expect_event("stopped");
    assert_eq!(stopped["body"]["reason"], "breakpoint");

    let seq = client.request("continue", json!({}));
    client.expect_response(seq);
    handle.join().unwrap();
}

#[test]
fn client_paths_are_normalized_to_vm_sources() {
    let (transport, mut client) = common::pair();
    let script = vec![
        Step::TickUntil(State::Running),
        call("@scripts/game/init.lua", "init"),
        Step::Line(3),
    ];
    let handle = common::run_script(transport, MockVm::new(), script);

    client.start_session(json!({}));
    // Windows-style client path for a forward-slash VM chunk.
    let seq = client.request(
        "setBreakpoints",
        json!({"source": {"path": "scripts\\game\\init.lua"}, "breakpoints": [{"line": 3}]}),
    );
    client.expect_response(seq);
    client.configuration_done();

    let stopped = client.expect_event("stopped");
    assert_eq!(stopped["body"]["reason"], "breakpoint");

    let seq = client.request("continue", json!({}));
    client.expect_response(seq);
    handle.join().unwrap();
}

#[test]
fn source_map_rewrites_client_prefixes() {
    let (transport, mut client) = common::pair();
    let script = vec![
        Step::TickUntil(State::Running),
        call("@game/brain.lua", "think"),
        Step::Line(7),
    ];
    let handle = common::run_script(transport, MockVm::new(), script);

    client.start_session(json!({"sourceMap": {"game/": "/home/dev/proj/scripts"}}));
    let seq = client.request(
        "setBreakpoints",
        json!({
            "source": {"path": "/home/dev/proj/scripts/brain.lua"},
            "breakpoints": [{"line": 7}],
        }),
    );
    client.expect_response(seq);
    client.configuration_done();

    let stopped = client.expect_event("stopped");
    assert_eq!(stopped["body"]["reason"], "breakpoint");

    // The stack trace maps back to the client's path.
    let seq = client.request("stackTrace", json!({"threadId": 1}));
    let response = client.expect_response(seq);
    assert_eq!(
        response["body"]["stackFrames"][0]["source"]["path"],
        "/home/dev/proj/scripts/brain.lua"
    );

    let seq = client.request("continue", json!({}));
    client.expect_response(seq);
    handle.join().unwrap();
}

#[test]
fn call_ret_balance_restores_depth() {
    let (transport, mut client) = common::pair();
    let script = vec![
        Step::TickUntil(State::Running),
        call("@main.lua", "main"),
        Step::Line(1),
        call("@main.lua", "a"),
        Step::Line(10),
        call("@main.lua", "b"),
        Step::Line(20),
        Step::Ret,
        Step::Line(11),
        Step::Ret,
        Step::Line(2),
        Step::Ret,
    ];
    let handle = common::run_script(transport, MockVm::new(), script);

    client.start_session(json!({}));
    client.configuration_done();

    let summary = handle.join().unwrap();
    assert_eq!(summary.stack_level, 0);
}

#[test]
fn lines_without_breakpoints_do_not_stop() {
    let (transport, mut client) = common::pair();
    let script = vec![
        Step::TickUntil(State::Running),
        call("@main.lua", "main"),
        Step::Line(1),
        Step::Line(2),
        Step::Line(3),
        Step::Ret,
    ];
    let handle = common::run_script(transport, MockVm::new(), script);

    client.start_session(json!({}));
    client.configuration_done();

    handle.join().unwrap();
    // thread-started is the last thing the client hears.
    client.expect_event("thread");
    assert!(client.try_recv().is_none());
}
