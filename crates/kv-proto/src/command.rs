//! The command dispatch table shape: name, arity, and a one-line
//! description. `kvstored` supplies the actual handler closures; `kvcli`
//! reuses this table to print a `--help`-style command listing.

/// Inclusive arity bounds on the number of arguments *after* the command
/// name. `max: None` means unbounded (used by `SET`, whose trailing value
/// tokens are joined with single spaces by the caller).
#[derive(Debug, Clone, Copy)]
pub struct Arity {
    pub min: usize,
    pub max: Option<usize>,
}

impl Arity {
    pub const fn exact(n: usize) -> Self {
        Arity { min: n, max: Some(n) }
    }

    pub const fn range(min: usize, max: usize) -> Self {
        Arity { min, max: Some(max) }
    }

    pub const fn at_least(min: usize) -> Self {
        Arity { min, max: None }
    }

    pub fn accepts(&self, n: usize) -> bool {
        n >= self.min && self.max.map_or(true, |max| n <= max)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CommandSpec {
    pub name: &'static str,
    pub arity: Arity,
    pub description: &'static str,
}

/// The full command table, in the order `kvcli --help` prints them.
pub const COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        name: "PING",
        arity: Arity::range(0, 1),
        description: "echo a message, or reply +PONG with none",
    },
    CommandSpec {
        name: "INFO",
        arity: Arity::range(0, 1),
        description: "server and keyspace summary",
    },
    CommandSpec {
        name: "SET",
        arity: Arity::at_least(2),
        description: "SET key value... — store a string value",
    },
    CommandSpec {
        name: "GET",
        arity: Arity::exact(1),
        description: "fetch the value stored under key",
    },
    CommandSpec {
        name: "DEL",
        arity: Arity::exact(1),
        description: "delete a key, replying :1 or :0",
    },
    CommandSpec {
        name: "EXISTS",
        arity: Arity::exact(1),
        description: "membership check, replying :1 or :0",
    },
    CommandSpec {
        name: "KEYS",
        arity: Arity::exact(0),
        description: "list every key in the keyspace",
    },
    CommandSpec {
        name: "CLEAR",
        arity: Arity::exact(0),
        description: "remove every key",
    },
    CommandSpec {
        name: "STATS",
        arity: Arity::exact(0),
        description: "entry count, bucket count, load factor, arena utilization",
    },
    CommandSpec {
        name: "SAVE",
        arity: Arity::range(0, 1),
        description: "snapshot to the configured file, or the given path",
    },
    CommandSpec {
        name: "LOAD",
        arity: Arity::range(0, 1),
        description: "restore from the configured file, or the given path",
    },
    CommandSpec {
        name: "QUIT",
        arity: Arity::exact(0),
        description: "reply +OK and close the connection",
    },
];

/// Looks up a command by name, case-insensitively.
pub fn find(name: &str) -> Option<&'static CommandSpec> {
    COMMANDS.iter().find(|c| c.name.eq_ignore_ascii_case(name))
}
