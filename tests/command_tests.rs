//! Tests for command dispatch
//!
//! These tests verify:
//! - SET/GET/DEL/INCR/INCRBY semantics and reply shapes
//! - Argument validation happens before any mutation
//! - Arity and unknown-command errors
//! - MSET, EXISTS, TTL, KEYS, PING and ECHO

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use flatkv::backend::MemoryBackend;
use flatkv::command::SCALAR_PREFIX;
use flatkv::protocol::{Reply, Request};
use flatkv::{Backend, CommandTable, Store};

// =============================================================================
// Helper Functions
// =============================================================================

struct Harness {
    table: CommandTable,
    store: Store,
}

impl Harness {
    fn new() -> Self {
        Self {
            table: CommandTable::builtin(),
            store: Store::new(Arc::new(MemoryBackend::new())),
        }
    }

    fn run(&self, line: &str) -> Reply {
        let parts = line
            .split_whitespace()
            .map(|p| p.as_bytes().to_vec())
            .collect();
        let request = Request::from_parts(parts).unwrap();
        self.table.dispatch(&request, &self.store)
    }

    fn run_raw(&self, name: &str, args: &[&[u8]]) -> Reply {
        let request = Request::new(name, args.iter().map(|a| a.to_vec()).collect());
        self.table.dispatch(&request, &self.store)
    }
}

fn bulk(s: &str) -> Reply {
    Reply::Bulk(s.as_bytes().to_vec())
}

fn error_text(reply: &Reply) -> &str {
    match reply {
        Reply::Error(message) => message,
        other => panic!("expected error reply, got {:?}", other),
    }
}

// =============================================================================
// SET / GET Tests
// =============================================================================

#[test]
fn test_set_get() {
    let h = Harness::new();
    assert_eq!(h.run("SET greeting hello"), Reply::ok());
    assert_eq!(h.run("GET greeting"), bulk("hello"));
    assert_eq!(h.run("GET nothing"), Reply::Null);
}

#[test]
fn test_command_names_are_case_insensitive() {
    let h = Harness::new();
    assert_eq!(h.run("set k v"), Reply::ok());
    assert_eq!(h.run("gEt k"), bulk("v"));
}

#[test]
fn test_keys_are_namespaced() {
    let h = Harness::new();
    h.run("SET k v");

    let mut raw_key = SCALAR_PREFIX.to_vec();
    raw_key.extend_from_slice(b"k");
    assert!(h.store.backend().get(&raw_key).unwrap().is_some());
    assert!(h.store.backend().get(b"k").unwrap().is_none());
}

#[test]
fn test_set_binary_value() {
    let h = Harness::new();
    let value = [0u8, 13, 10, 255];
    assert_eq!(h.run_raw("SET", &[b"bin", &value]), Reply::ok());
    assert_eq!(h.run_raw("GET", &[b"bin"]), Reply::Bulk(value.to_vec()));
}

#[test]
fn test_set_with_ttl_expires() {
    let h = Harness::new();
    assert_eq!(h.run("SET temp v 30ms"), Reply::ok());
    assert_eq!(h.run("GET temp"), bulk("v"));

    thread::sleep(Duration::from_millis(80));
    assert_eq!(h.run("GET temp"), Reply::Null);
}

#[test]
fn test_set_with_compound_ttl() {
    let h = Harness::new();
    assert_eq!(h.run("SET k v 1h30m"), Reply::ok());
    assert_eq!(h.run("TTL k"), Reply::Integer(5400));
}

#[test]
fn test_set_malformed_ttl_does_not_mutate() {
    let h = Harness::new();
    h.run("SET k original");

    for bad in ["SET k changed soon", "SET k changed 10", "SET k changed -5s", "SET k changed 0s"] {
        let reply = h.run(bad);
        assert!(error_text(&reply).starts_with("ERR "), "{}", bad);
    }
    assert_eq!(h.run("GET k"), bulk("original"));
}

// =============================================================================
// DEL Tests
// =============================================================================

#[test]
fn test_del_counts_keys_named() {
    let h = Harness::new();
    h.run("SET a 1");

    assert_eq!(h.run("DEL a b"), Reply::Integer(2));
    assert_eq!(h.run("GET a"), Reply::Null);
}

#[test]
fn test_del_without_keys() {
    let h = Harness::new();
    assert_eq!(h.run("DEL"), Reply::Integer(0));
}

// =============================================================================
// INCR / INCRBY Tests
// =============================================================================

#[test]
fn test_incr_integer_reply() {
    let h = Harness::new();
    assert_eq!(h.run("INCR n 10"), Reply::Integer(10));
    assert_eq!(h.run("GET n"), bulk("10"));
}

#[test]
fn test_incr_fractional_reply() {
    let h = Harness::new();
    assert_eq!(h.run("INCR n 10.5"), bulk("10.5"));
    assert_eq!(h.run("INCRBY n -0.5"), Reply::Integer(10));
}

#[test]
fn test_incr_without_delta_reads_back() {
    let h = Harness::new();
    assert_eq!(h.run("INCR fresh"), Reply::Integer(0));
    h.run("INCR n 3");
    assert_eq!(h.run("INCR n"), Reply::Integer(3));
}

#[test]
fn test_incr_with_ttl() {
    let h = Harness::new();
    assert_eq!(h.run("INCRBY n 2 30ms"), Reply::Integer(2));
    thread::sleep(Duration::from_millis(80));
    assert_eq!(h.run("GET n"), Reply::Null);
}

#[test]
fn test_incr_on_text_value() {
    let h = Harness::new();
    h.run("SET s hello");

    let reply = h.run("INCR s 1");
    assert_eq!(error_text(&reply), "ERR value is not a valid float");
    assert_eq!(h.run("GET s"), bulk("hello"));
}

#[test]
fn test_incr_bad_arguments_do_not_mutate() {
    let h = Harness::new();
    h.run("INCR n 1");

    assert!(h.run("INCR n abc").is_error());
    assert!(h.run("INCR n inf").is_error());
    assert!(h.run("INCR n 1 whenever").is_error());
    assert_eq!(h.run("GET n"), bulk("1"));
}

// =============================================================================
// Dispatch Error Tests
// =============================================================================

#[test]
fn test_unknown_command() {
    let h = Harness::new();
    let reply = h.run("FLY away");
    assert_eq!(error_text(&reply), "ERR unknown command 'FLY'");
}

#[test]
fn test_wrong_arity() {
    let h = Harness::new();
    assert_eq!(
        error_text(&h.run("GET")),
        "ERR wrong number of arguments for 'get' command"
    );
    assert_eq!(
        error_text(&h.run("SET k")),
        "ERR wrong number of arguments for 'set' command"
    );
    assert!(h.run("SET k v 1s extra").is_error());
    assert!(h.run("INCR").is_error());
    assert!(h.run("INCR n 1 1s extra").is_error());
}

#[test]
fn test_builtin_command_names() {
    let table = CommandTable::builtin();
    for name in ["set", "get", "del", "incr", "incrby", "mset", "exists", "ttl", "keys", "ping", "echo"] {
        assert!(table.get(name).is_some(), "missing {}", name);
    }
    assert!(table.get("INCRBY").is_some());
}

// =============================================================================
// Extra Command Tests
// =============================================================================

#[test]
fn test_mset() {
    let h = Harness::new();
    assert_eq!(h.run("MSET a 1 b 2"), Reply::ok());
    assert_eq!(h.run("GET a"), bulk("1"));
    assert_eq!(h.run("GET b"), bulk("2"));

    assert!(h.run("MSET a 1 b").is_error());
}

#[test]
fn test_exists() {
    let h = Harness::new();
    h.run("SET a 1");
    h.run("SET b 2");
    assert_eq!(h.run("EXISTS a b c a"), Reply::Integer(3));
}

#[test]
fn test_ttl_command() {
    let h = Harness::new();
    h.run("SET p v");
    h.run("SET e v 10s");

    assert_eq!(h.run("TTL p"), Reply::Integer(-1));
    assert_eq!(h.run("TTL missing"), Reply::Integer(-2));
    assert_eq!(h.run("TTL e"), Reply::Integer(10));
}

#[test]
fn test_keys_pattern() {
    let h = Harness::new();
    h.run("MSET user:1 a user:2 b order:1 c");

    assert_eq!(
        h.run("KEYS user:*"),
        Reply::Array(vec![bulk("user:1"), bulk("user:2")])
    );
    assert_eq!(h.run("KEYS *:1"), Reply::Array(vec![bulk("order:1"), bulk("user:1")]));
    assert_eq!(h.run("KEYS nope*"), Reply::Array(vec![]));
}

#[test]
fn test_ping_and_echo() {
    let h = Harness::new();
    assert_eq!(h.run("PING"), Reply::Simple("PONG".to_string()));
    assert_eq!(h.run("PING hi"), bulk("hi"));
    assert_eq!(h.run("ECHO hello"), bulk("hello"));
}
