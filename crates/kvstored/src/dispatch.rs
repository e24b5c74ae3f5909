//! Command dispatch: validates arity against [`kv_proto::command`], runs the
//! handler under the engine's lock, and translates results into replies.

use std::path::PathBuf;
use std::sync::atomic::Ordering;

use kv_core::error::EngineError;
use kv_proto::{command, value_to_reply, Reply, Request};

use crate::server::ServerState;

/// What the caller should do after a handler ran.
pub enum Outcome {
    Reply(Reply),
    /// Send the reply, then close the connection (`QUIT`).
    CloseAfter(Reply),
}

pub async fn dispatch(state: &ServerState, req: &Request<'_>) -> Outcome {
    let Some(spec) = command::find(req.name) else {
        return Outcome::Reply(Reply::error("ERR Unknown command"));
    };

    if !spec.arity.accepts(req.args.len()) {
        return Outcome::Reply(Reply::error("ERR Wrong number of arguments"));
    }

    state.requests.fetch_add(1, Ordering::Relaxed);

    match spec.name {
        "PING" => Outcome::Reply(handle_ping(req)),
        "INFO" => Outcome::Reply(Reply::bulk(build_info(state).into_bytes())),
        "SET" => Outcome::Reply(handle_set(state, req)),
        "GET" => Outcome::Reply(handle_get(state, req)),
        "DEL" => Outcome::Reply(handle_del(state, req)),
        "EXISTS" => Outcome::Reply(handle_exists(state, req)),
        "KEYS" => Outcome::Reply(handle_keys(state)),
        "CLEAR" => Outcome::Reply(handle_clear(state)),
        "STATS" => Outcome::Reply(Reply::bulk(build_stats(state).into_bytes())),
        "SAVE" => Outcome::Reply(handle_save(state, req)),
        "LOAD" => Outcome::Reply(handle_load(state, req)),
        "QUIT" => Outcome::CloseAfter(Reply::ok()),
        other => {
            state.errors.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(command = other, "command in table has no handler");
            Outcome::Reply(Reply::error("ERR unknown command"))
        }
    }
}

fn handle_ping(req: &Request<'_>) -> Reply {
    match req.args.first() {
        Some(msg) => Reply::bulk(msg.as_bytes().to_vec()),
        None => Reply::Simple("PONG".to_string()),
    }
}

fn handle_set(state: &ServerState, req: &Request<'_>) -> Reply {
    let key = req.args[0].as_bytes();
    let value = req.args[1..].join(" ");
    match state.engine.set_string(key, value.into_bytes()) {
        Ok(()) => Reply::ok(),
        Err(e) => engine_error_reply(state, e),
    }
}

fn handle_get(state: &ServerState, req: &Request<'_>) -> Reply {
    match state.engine.get(req.args[0].as_bytes()) {
        Ok(value) => value_to_reply(&value),
        Err(EngineError::KeyNotFound) => Reply::null(),
        Err(e) => engine_error_reply(state, e),
    }
}

fn handle_del(state: &ServerState, req: &Request<'_>) -> Reply {
    let removed = state.engine.delete(req.args[0].as_bytes());
    Reply::Integer(if removed { 1 } else { 0 })
}

fn handle_exists(state: &ServerState, req: &Request<'_>) -> Reply {
    let exists = state.engine.exists(req.args[0].as_bytes());
    Reply::Integer(if exists { 1 } else { 0 })
}

fn handle_keys(state: &ServerState) -> Reply {
    let keys = state.engine.keys();
    Reply::Array(keys.into_iter().map(Reply::bulk).collect())
}

fn handle_clear(state: &ServerState) -> Reply {
    state.engine.clear();
    Reply::ok()
}

fn handle_save(state: &ServerState, req: &Request<'_>) -> Reply {
    let path = req.args.first().map(PathBuf::from);
    match state.engine.save(path.as_deref()) {
        Ok(()) => Reply::ok(),
        Err(e) => engine_error_reply(state, e),
    }
}

fn handle_load(state: &ServerState, req: &Request<'_>) -> Reply {
    let path = req.args.first().map(PathBuf::from);
    match state.engine.load(path.as_deref()) {
        Ok(()) => Reply::ok(),
        Err(e) => engine_error_reply(state, e),
    }
}

fn engine_error_reply(state: &ServerState, e: EngineError) -> Reply {
    state.errors.fetch_add(1, Ordering::Relaxed);
    Reply::error(format!("ERR {e}"))
}

fn build_info(state: &ServerState) -> String {
    let stats = state.engine.stats();
    let uptime = state.started_at.elapsed().as_secs();
    format!(
        "kvstored_protocol:1\r\nuptime_seconds:{}\r\nentries:{}\r\nbuckets:{}\r\nload_factor:{:.4}\r\narena_utilization:{:.4}\r\nconnected_clients:{}\r\n",
        uptime,
        stats.entry_count,
        stats.bucket_count,
        stats.load_factor,
        stats.arena_utilization,
        state.registry.len(),
    )
}

fn build_stats(state: &ServerState) -> String {
    let stats = state.engine.stats();
    format!(
        "entries={} buckets={} load_factor={:.4} arena_used={} arena_allocated={} arena_utilization={:.4} requests={} errors={}",
        stats.entry_count,
        stats.bucket_count,
        stats.load_factor,
        stats.arena_bytes_used,
        stats.arena_bytes_allocated,
        stats.arena_utilization,
        state.requests.load(Ordering::Relaxed),
        state.errors.load(Ordering::Relaxed),
    )
}
