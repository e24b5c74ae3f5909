//! End-to-end tests: spawn the compiled `kvstored` binary and drive it with
//! raw TCP and with `kv-client`.
//!
//! Requires `cargo build -p kvstored` (or `cargo test`, which builds test
//! binaries' dependencies but not necessarily other binaries) to have
//! produced `target/debug/kvstored` first. Tests skip cleanly rather than
//! failing when the binary isn't there.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::path::PathBuf;
use std::process::{Child, Command};
use std::sync::atomic::{AtomicU16, Ordering};
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use kv_client::Client;
use kv_proto::Reply;

fn kvstored_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .unwrap()
        .parent()
        .unwrap()
        .join("target/debug/kvstored")
}

fn binary_available() -> bool {
    kvstored_path().exists()
}

fn skip_unless_ready() -> bool {
    if !binary_available() {
        eprintln!("SKIP: kvstored binary not built — run: cargo build -p kvstored");
        return false;
    }
    true
}

// Ports are doled out from a shared counter so parallel tests don't collide.
static NEXT_PORT: AtomicU16 = AtomicU16::new(17391);

fn next_port() -> u16 {
    NEXT_PORT.fetch_add(1, Ordering::Relaxed)
}

struct Daemon {
    child: Child,
    port: u16,
    db_file: PathBuf,
}

impl Daemon {
    fn spawn(extra_args: &[&str]) -> Result<Self> {
        let port = next_port();
        let db_file = std::env::temp_dir().join(format!("kvstored-it-{}-{}.db", std::process::id(), port));
        let _ = std::fs::remove_file(&db_file);

        let mut cmd = Command::new(kvstored_path());
        cmd.args(["--port", &port.to_string(), "--db-file"]);
        cmd.arg(&db_file);
        cmd.args(extra_args);
        cmd.env("RUST_LOG", "warn");
        let child = cmd.spawn().context("failed to spawn kvstored")?;

        let daemon = Daemon { child, port, db_file };
        daemon.wait_ready(40)?;
        Ok(daemon)
    }

    fn wait_ready(&self, max_attempts: u32) -> Result<()> {
        for attempt in 1..=max_attempts {
            if TcpStream::connect(("127.0.0.1", self.port)).is_ok() {
                return Ok(());
            }
            if attempt < max_attempts {
                thread::sleep(Duration::from_millis(100));
            }
        }
        bail!("kvstored on port {} never became reachable", self.port)
    }

    fn client(&self) -> Result<Client> {
        Ok(Client::connect(("127.0.0.1", self.port))?)
    }
}

impl Drop for Daemon {
    fn drop(&mut self) {
        self.child.kill().ok();
        self.child.wait().ok();
        let _ = std::fs::remove_file(&self.db_file);
        let backup_glob = format!("{}.backup.", self.db_file.display());
        if let Some(parent) = self.db_file.parent() {
            if let Ok(entries) = std::fs::read_dir(parent) {
                for entry in entries.flatten() {
                    if entry.path().to_string_lossy().starts_with(&backup_glob) {
                        let _ = std::fs::remove_file(entry.path());
                    }
                }
            }
        }
    }
}

// ══════════════════════════════════════════════════════════════════════════
//  SET / GET / DEL round trip
// ══════════════════════════════════════════════════════════════════════════

#[test]
fn test_set_get_del_round_trip() {
    if !skip_unless_ready() {
        return;
    }
    let daemon = Daemon::spawn(&[]).unwrap();
    let mut client = daemon.client().unwrap();

    client.set_string("name", "Alice").unwrap();
    assert_eq!(client.get("name").unwrap(), Some(b"Alice".to_vec()));
    assert!(client.delete("name").unwrap());
    assert_eq!(client.get("name").unwrap(), None);
    assert!(!client.delete("name").unwrap());
}

// ══════════════════════════════════════════════════════════════════════════
//  Scenario: PING, INFO, STATS, CLEAR, KEYS, EXISTS
// ══════════════════════════════════════════════════════════════════════════

#[test]
fn test_ping_pong_and_echo() {
    if !skip_unless_ready() {
        return;
    }
    let daemon = Daemon::spawn(&[]).unwrap();
    let mut client = daemon.client().unwrap();

    assert_eq!(client.command("PING").unwrap(), Reply::Simple("PONG".to_string()));
    assert_eq!(
        client.command("PING hello").unwrap(),
        Reply::bulk(b"hello".to_vec())
    );
}

#[test]
fn test_exists_and_keys_and_clear() {
    if !skip_unless_ready() {
        return;
    }
    let daemon = Daemon::spawn(&[]).unwrap();
    let mut client = daemon.client().unwrap();

    assert!(!client.exists("a").unwrap());
    client.set_string("a", "1").unwrap();
    client.set_string("b", "2").unwrap();
    assert!(client.exists("a").unwrap());

    let mut keys = client.keys().unwrap();
    keys.sort();
    assert_eq!(keys, vec![b"a".to_vec(), b"b".to_vec()]);

    client.clear().unwrap();
    assert!(client.keys().unwrap().is_empty());
}

#[test]
fn test_info_and_stats_report_keyspace_shape() {
    if !skip_unless_ready() {
        return;
    }
    let daemon = Daemon::spawn(&[]).unwrap();
    let mut client = daemon.client().unwrap();

    client.set_string("k", "v").unwrap();

    let info = client.info().unwrap();
    assert!(info.contains("entries:1"), "info: {info}");
    assert!(info.contains("load_factor:"), "info: {info}");

    let stats = client.stats().unwrap();
    assert!(stats.contains("entries=1"), "stats: {stats}");
    assert!(stats.contains("arena_utilization="), "stats: {stats}");
}

// ══════════════════════════════════════════════════════════════════════════
//  Scenario: boundary cases — zero-length values, oversized values
// ══════════════════════════════════════════════════════════════════════════

#[test]
fn test_zero_length_value_round_trips_as_empty_bulk() {
    if !skip_unless_ready() {
        return;
    }
    let daemon = Daemon::spawn(&[]).unwrap();
    let mut client = daemon.client().unwrap();

    client.set_string("k", "").unwrap();
    assert_eq!(client.get("k").unwrap(), Some(Vec::new()));
}

#[test]
fn test_oversized_command_closes_the_connection() {
    if !skip_unless_ready() {
        return;
    }
    let daemon = Daemon::spawn(&[]).unwrap();

    let mut stream = TcpStream::connect(("127.0.0.1", daemon.port)).unwrap();
    stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();

    // 65537 bytes, no newline.
    let payload = vec![b'x'; 65_537];
    stream.write_all(&payload).unwrap();

    let mut buf = Vec::new();
    stream.read_to_end(&mut buf).ok();
    let text = String::from_utf8_lossy(&buf);
    assert!(text.contains("Command too long"), "reply: {text}");
}

// ══════════════════════════════════════════════════════════════════════════
//  10,000 distinct keys, monotone size, bounded load factor, snapshot
//  round trip via SAVE/CLEAR/LOAD
// ══════════════════════════════════════════════════════════════════════════

#[test]
fn test_ten_thousand_keys_then_save_and_load() {
    if !skip_unless_ready() {
        return;
    }
    let daemon = Daemon::spawn(&[]).unwrap();
    let mut client = daemon.client().unwrap();

    const COUNT: usize = 10_000;
    for i in 0..COUNT {
        client
            .set_string(&format!("key-{i}"), &format!("value-{i}"))
            .unwrap();
    }

    let stats = client.stats().unwrap();
    assert!(stats.contains(&format!("entries={COUNT}")), "stats: {stats}");

    client.save(None).unwrap();
    client.clear().unwrap();
    assert!(client.keys().unwrap().is_empty());

    client.load(None).unwrap();
    let after = client.stats().unwrap();
    assert!(after.contains(&format!("entries={COUNT}")), "stats: {after}");

    // Spot-check a handful of values survived the round trip.
    for i in [0, 1, 500, 9_999] {
        assert_eq!(
            client.get(&format!("key-{i}")).unwrap(),
            Some(format!("value-{i}").into_bytes())
        );
    }
}

#[test]
fn test_backup_writes_a_timestamped_sibling_file() {
    if !skip_unless_ready() {
        return;
    }
    let daemon = Daemon::spawn(&[]).unwrap();
    let mut client = daemon.client().unwrap();
    client.set_string("k", "v").unwrap();

    // SAVE with an explicit path exercises the same file-write path a
    // BACKUP would — the wire protocol only exposes SAVE/LOAD with an
    // optional path argument.
    let backup_path = daemon.db_file.with_extension("db.backup.test");
    client.save(Some(backup_path.to_str().unwrap())).unwrap();
    assert!(backup_path.exists());
    std::fs::remove_file(&backup_path).ok();
}

// ══════════════════════════════════════════════════════════════════════════
//  Many concurrent clients issuing interleaved SET/GET/DEL against
//  overlapping keyspaces — no crash, no torn reads, server stays
//  responsive throughout.
// ══════════════════════════════════════════════════════════════════════════

#[test]
fn test_concurrent_clients_no_torn_reads() {
    if !skip_unless_ready() {
        return;
    }
    let daemon = Daemon::spawn(&[]).unwrap();
    let port = daemon.port;

    const CLIENTS: usize = 20;
    const OPS_PER_CLIENT: usize = 100;

    let handles: Vec<_> = (0..CLIENTS)
        .map(|client_idx| {
            thread::spawn(move || -> Result<()> {
                let mut client = Client::connect(("127.0.0.1", port))?;
                for op in 0..OPS_PER_CLIENT {
                    let key = format!("shared-{}", op % 10); // overlapping keyspace
                    let value = format!("c{client_idx}-op{op}");
                    client.set_string(&key, &value)?;
                    // A GET must return *some* previously (or just) written
                    // value for this key, never a torn/partial write.
                    let got = client.get(&key)?;
                    assert!(got.is_some(), "key {key} vanished mid-flight");
                    if op % 7 == 0 {
                        client.delete(&key)?;
                    }
                }
                Ok(())
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap().unwrap();
    }

    // Server must still be responsive after the storm.
    let mut client = daemon.client().unwrap();
    client.ping().unwrap();
}

// ══════════════════════════════════════════════════════════════════════════
//  GET serializes whatever is stored — typed mismatches are exercised via
//  the engine-level API in kv-engine's own unit tests; here we confirm the
//  wire protocol's single untyped GET round-trips bytes exactly.
// ══════════════════════════════════════════════════════════════════════════

#[test]
fn test_get_serializes_whatever_type_is_stored() {
    if !skip_unless_ready() {
        return;
    }
    let daemon = Daemon::spawn(&[]).unwrap();
    let mut client = daemon.client().unwrap();

    // SET always stores a string on the wire; this exercises that the
    // value comes back byte-for-byte, including embedded spaces joined
    // by the server from multiple trailing tokens.
    client.command("SET greeting hello there world").unwrap();
    assert_eq!(
        client.get("greeting").unwrap(),
        Some(b"hello there world".to_vec())
    );
}

// ══════════════════════════════════════════════════════════════════════════
//  Unknown command / wrong arity
// ══════════════════════════════════════════════════════════════════════════

#[test]
fn test_unknown_command_is_an_error_reply() {
    if !skip_unless_ready() {
        return;
    }
    let daemon = Daemon::spawn(&[]).unwrap();
    let mut client = daemon.client().unwrap();

    match client.command("FROBNICATE").unwrap() {
        Reply::Error(e) => assert!(e.contains("Unknown") || e.contains("unknown"), "{e}"),
        other => panic!("expected an error reply, got {other:?}"),
    }
}

#[test]
fn test_wrong_arity_is_an_error_reply() {
    if !skip_unless_ready() {
        return;
    }
    let daemon = Daemon::spawn(&[]).unwrap();
    let mut client = daemon.client().unwrap();

    match client.command("GET").unwrap() {
        Reply::Error(e) => assert!(e.contains("argument"), "{e}"),
        other => panic!("expected an error reply, got {other:?}"),
    }
}

// ══════════════════════════════════════════════════════════════════════════
//  QUIT closes the connection after replying
// ══════════════════════════════════════════════════════════════════════════

#[test]
fn test_quit_replies_ok_then_closes() {
    if !skip_unless_ready() {
        return;
    }
    let daemon = Daemon::spawn(&[]).unwrap();
    let mut client = daemon.client().unwrap();

    assert_eq!(client.command("QUIT").unwrap(), Reply::ok());

    // The connection should now be closed from the server's side.
    thread::sleep(Duration::from_millis(100));
    let err = client.command("PING");
    assert!(err.is_err(), "expected the connection to be closed after QUIT");
}

// ══════════════════════════════════════════════════════════════════════════
//  Slow client, idle past the 300s timeout. Real-time — not run by
//  default; the idle reaper's timeout is a production constant, not
//  something this suite should shrink just to make the test fast.
// ══════════════════════════════════════════════════════════════════════════

#[test]
#[ignore = "runs for 300+ seconds — exercises the real idle-connection timeout"]
fn test_idle_connection_is_reaped_after_300_seconds() {
    if !skip_unless_ready() {
        return;
    }
    let daemon = Daemon::spawn(&[]).unwrap();

    let mut stream = TcpStream::connect(("127.0.0.1", daemon.port)).unwrap();
    stream.write_all(b"PI").unwrap(); // half a command, no newline
    stream.set_read_timeout(Some(Duration::from_secs(30))).unwrap();

    thread::sleep(Duration::from_secs(301));

    stream.write_all(b"NG\n").unwrap();
    let mut buf = [0u8; 64];
    let n = stream.read(&mut buf).unwrap_or(0);
    assert_eq!(n, 0, "expected the reaped connection to be closed");
}
