//! Structured logging for depositor events.
//!
//! The depositor never installs a logger. Every depositor owns a
//! [`LogContext`] handed in through [`Options`](crate::Options); records are
//! emitted through the `log` facade as `event=<name> <scope> <message>`.

use std::fmt;

/// Default logging target.
pub const LOG_TARGET: &str = "depositor";

/// Logging target plus the key/value scope appended to every record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogContext {
    target: &'static str,
    scope: String,
}

impl LogContext {
    /// Creates a context that logs under `target` with an empty scope.
    pub fn new(target: &'static str) -> Self {
        Self { target, scope: String::new() }
    }

    /// The `log` target records are emitted under.
    pub fn target(&self) -> &'static str {
        self.target
    }

    /// Returns a copy of this context scoped to one (topic, table).
    pub fn scoped(&self, topic: &str, table: &str) -> Self {
        Self { target: self.target, scope: format!("topic={} table={}", topic, table) }
    }

    pub(crate) fn scope(&self) -> ScopeKv<'_> {
        ScopeKv(&self.scope)
    }
}

impl Default for LogContext {
    fn default() -> Self {
        Self::new(LOG_TARGET)
    }
}

/// Display adapter that renders the scope followed by a separator, or nothing.
pub(crate) struct ScopeKv<'a>(&'a str);

impl fmt::Display for ScopeKv<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            Ok(())
        } else {
            write!(f, "{} ", self.0)
        }
    }
}

macro_rules! depot_log {
    ($level:expr, ctx: $ctx:expr, $event:expr, $fmt:expr $(, $args:expr)* $(,)?) => {{
        let ctx: &$crate::logging::LogContext = &$ctx;
        if log::log_enabled!(target: ctx.target(), $level) {
            log::log!(
                target: ctx.target(),
                $level,
                "event={} {}{}",
                $event,
                ctx.scope(),
                format_args!($fmt $(, $args)*)
            );
        }
    }};
}

pub(crate) use depot_log;
