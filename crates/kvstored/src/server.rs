//! The network server: listener, per-connection framing, dispatch, idle
//! reaper, and shutdown. Implemented as a task-per-connection Tokio runtime
//! rather than a hand-rolled edge-triggered loop — an explicitly sanctioned
//! alternative, since the engine facade's mutex remains the sole
//! serialization point either way.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use kv_engine::Engine;
use kv_proto::{parse_line, strip_cr, Reply};
use socket2::{Domain, Protocol, Socket, TcpKeepalive, Type};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
#[cfg(unix)]
use std::os::unix::io::{AsRawFd, FromRawFd};

use crate::dispatch::{self, Outcome};
use crate::registry::ConnectionRegistry;

const READ_BUF_CAP: usize = 64 * 1024;
const MAX_LIVE_CONNECTIONS: usize = 10_000;
const IDLE_TIMEOUT_SECS: i64 = 300;
const IDLE_SCAN_INTERVAL: Duration = Duration::from_secs(10);

pub struct ServerState {
    pub engine: Arc<Engine>,
    pub registry: ConnectionRegistry,
    pub started_at: Instant,
    pub requests: AtomicU64,
    pub errors: AtomicU64,
    pub shutdown: AtomicBool,
}

impl ServerState {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self {
            engine,
            registry: ConnectionRegistry::new(),
            started_at: Instant::now(),
            requests: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            shutdown: AtomicBool::new(false),
        }
    }
}

/// Runs the accept loop and idle reaper until `shutdown` flips, then drains
/// every connection and returns.
pub async fn run(bind: &str, port: u16, backlog: u32, state: Arc<ServerState>) -> Result<()> {
    let addr = format!("{bind}:{port}");
    let std_addr = std::net::ToSocketAddrs::to_socket_addrs(&addr)
        .with_context(|| format!("failed to resolve bind address {addr}"))?
        .next()
        .with_context(|| format!("{addr} resolved to no addresses"))?;
    let listener =
        bind_listener(std_addr, backlog).with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(%addr, backlog, "kvstored listening");

    let reaper = tokio::spawn(idle_reaper(state.clone()));

    loop {
        if state.shutdown.load(Ordering::Relaxed) {
            break;
        }

        tokio::select! {
            accepted = listener.accept() => {
                match accepted {
                    Ok((socket, peer_addr)) => {
                        if state.registry.len() >= MAX_LIVE_CONNECTIONS {
                            tracing::warn!(%peer_addr, "rejecting connection: too many live connections");
                            continue;
                        }
                        let state = state.clone();
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(socket, peer_addr.to_string(), state).await {
                                tracing::debug!(%peer_addr, error = %e, "connection ended with error");
                            }
                        });
                    }
                    Err(e) => tracing::warn!(error = %e, "accept failed"),
                }
            }
            _ = tokio::time::sleep(Duration::from_millis(200)) => {
                // periodic wakeup so the shutdown flag is observed promptly
            }
        }
    }

    tracing::info!("shutting down: closing all connections");
    state.registry.close_all();
    reaper.abort();
    Ok(())
}

/// Builds the listening socket directly with `socket2` so `SO_REUSEADDR`,
/// `SO_REUSEPORT` (best-effort — not every platform supports it), and the
/// configured backlog are all applied before the first `accept`.
fn bind_listener(addr: std::net::SocketAddr, backlog: u32) -> Result<TcpListener> {
    let domain = if addr.is_ipv6() { Domain::IPV6 } else { Domain::IPV4 };
    let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP)).context("socket()")?;

    socket.set_reuse_address(true).context("SO_REUSEADDR")?;
    if let Err(e) = socket.set_reuse_port(true) {
        tracing::debug!(error = %e, "SO_REUSEPORT unavailable, continuing without it");
    }
    socket.set_nonblocking(true).context("set_nonblocking")?;
    socket.bind(&addr.into()).context("bind()")?;
    socket
        .listen(backlog.max(1) as i32)
        .context("listen()")?;

    let listener: std::net::TcpListener = socket.into();
    TcpListener::from_std(listener).context("registering listener with the async runtime")
}

/// Applies the per-connection socket options spec.md §4.7 calls for:
/// `TCP_NODELAY` and `SO_KEEPALIVE` with idle=60s, interval=10s, probes=3.
fn apply_connection_options(stream: &TcpStream) {
    if let Err(e) = stream.set_nodelay(true) {
        tracing::debug!(error = %e, "failed to set TCP_NODELAY");
        return;
    }

    // socket2 has no safe, owning way to wrap a borrowed fd; clone the raw fd
    // so applying keepalive never touches tokio's ownership of the original.
    let socket = clone_as_socket2(stream);
    let keepalive = TcpKeepalive::new()
        .with_time(Duration::from_secs(60))
        .with_interval(Duration::from_secs(10));
    #[cfg(target_os = "linux")]
    let keepalive = keepalive.with_retries(3);
    if let Err(e) = socket.set_tcp_keepalive(&keepalive) {
        tracing::debug!(error = %e, "failed to set SO_KEEPALIVE");
    }
    // `socket` owns a dup'd fd; let it drop and close independently of `stream`.
}

#[cfg(unix)]
fn clone_as_socket2(stream: &TcpStream) -> Socket {
    let raw = stream.as_raw_fd();
    // `socket2::Socket` takes ownership of the fd it's given, so duplicate
    // first rather than let it close tokio's half on drop.
    let dup = unsafe { libc::dup(raw) };
    unsafe { Socket::from_raw_fd(dup) }
}

async fn idle_reaper(state: Arc<ServerState>) {
    let mut interval = tokio::time::interval(IDLE_SCAN_INTERVAL);
    loop {
        interval.tick().await;
        if state.shutdown.load(Ordering::Relaxed) {
            return;
        }
        state.registry.reap_idle(IDLE_TIMEOUT_SECS);
    }
}

async fn handle_connection(mut socket: TcpStream, peer: String, state: Arc<ServerState>) -> Result<()> {
    apply_connection_options(&socket);

    let (id, conn) = state.registry.register(peer.clone());
    tracing::debug!(%peer, "connection accepted");

    let mut read_buf = vec![0u8; READ_BUF_CAP];
    let mut filled = 0usize;
    let mut write_buf: Vec<u8> = Vec::new();

    let result: Result<()> = 'conn: loop {
        tokio::select! {
            _ = conn.closed() => {
                break 'conn Ok(());
            }
            read_result = socket.read(&mut read_buf[filled..]) => {
                let n = match read_result {
                    Ok(0) => break 'conn Ok(()), // peer closed
                    Ok(n) => n,
                    Err(e) => break 'conn Err(e.into()),
                };
                filled += n;
                conn.touch();

                loop {
                    let consumed_window = &read_buf[..filled];
                    let newline_pos = consumed_window.iter().position(|&b| b == b'\n');
                    let Some(pos) = newline_pos else {
                        if filled >= READ_BUF_CAP - 1 {
                            write_buf.clear();
                            Reply::error("ERR Command too long").encode(&mut write_buf);
                            let _ = socket.write_all(&write_buf).await;
                            break 'conn Ok(());
                        }
                        break;
                    };

                    let line = String::from_utf8_lossy(&read_buf[..pos]).to_string();
                    let line = strip_cr(&line).to_string();

                    // compact the remaining partial data to the front
                    let remainder_start = pos + 1;
                    read_buf.copy_within(remainder_start..filled, 0);
                    filled -= remainder_start;

                    if let Some(req) = parse_line(&line) {
                        let outcome = dispatch::dispatch(&state, &req).await;
                        write_buf.clear();
                        match outcome {
                            Outcome::Reply(reply) => {
                                reply.encode(&mut write_buf);
                                if socket.write_all(&write_buf).await.is_err() {
                                    break 'conn Ok(());
                                }
                            }
                            Outcome::CloseAfter(reply) => {
                                reply.encode(&mut write_buf);
                                let _ = socket.write_all(&write_buf).await;
                                break 'conn Ok(());
                            }
                        }
                    }
                }
            }
        }
    };

    state.registry.unregister(id);
    tracing::debug!(%peer, "connection closed");
    result
}
