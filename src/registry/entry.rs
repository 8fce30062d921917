//! Pending entry types and diagnostics rendering.

use std::backtrace::Backtrace;
use std::fmt;
use std::panic::Location;
use std::sync::atomic::{AtomicU64, Ordering};

/// Unique identifier for a tracked operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OperationId(u64);

impl OperationId {
    /// Creates a new unique operation ID.
    pub(crate) fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw ID value.
    #[must_use]
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Op({})", self.0)
    }
}

/// Where and how a tracked operation was started.
///
/// The logical location comes from `#[track_caller]`, so it points at the
/// test or application code that called through the facade, not at this
/// crate. A cleaned backtrace is attached only when
/// [`TrackerConfig::capture_backtrace`](super::TrackerConfig) is on.
#[derive(Clone, Debug)]
pub struct CallSite {
    target: String,
    operation: String,
    args: Vec<String>,
    location: &'static Location<'static>,
    trace: Option<String>,
}

impl CallSite {
    /// Describes a call to `target.operation(args..)` made from `location`.
    #[must_use]
    pub fn new(
        target: impl Into<String>,
        operation: impl Into<String>,
        args: Vec<String>,
        location: &'static Location<'static>,
    ) -> Self {
        Self {
            target: target.into(),
            operation: operation.into(),
            args,
            location,
            trace: None,
        }
    }

    /// Describes a call made from the caller of this function.
    #[must_use]
    #[track_caller]
    pub fn here(target: impl Into<String>, operation: impl Into<String>, args: Vec<String>) -> Self {
        Self::new(target, operation, args, Location::caller())
    }

    /// Attaches a freshly captured backtrace, with internal frames removed.
    #[must_use]
    pub fn with_backtrace(mut self) -> Self {
        let trace = clean_trace(&Backtrace::force_capture().to_string());
        self.trace = (!trace.is_empty()).then_some(trace);
        self
    }

    /// The object type (or parent operation) the call was made on.
    #[must_use]
    pub fn target(&self) -> &str {
        &self.target
    }

    /// The operation name.
    #[must_use]
    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// The rendered arguments.
    #[must_use]
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// The logical call location.
    #[must_use]
    pub fn location(&self) -> &'static Location<'static> {
        self.location
    }

    /// The cleaned backtrace, if one was captured.
    #[must_use]
    pub fn trace(&self) -> Option<&str> {
        self.trace.as_deref()
    }

    /// Renders `target.operation(arg, arg)`.
    #[must_use]
    pub fn describe(&self) -> String {
        format!("{}.{}({})", self.target, self.operation, self.args.join(", "))
    }
}

/// A registry record for one operation that has not settled yet.
#[derive(Clone, Debug)]
pub struct PendingEntry {
    /// The operation's identifier.
    pub id: OperationId,
    /// Human-readable description, used only for diagnostics.
    pub description: String,
    /// Where the operation was started.
    pub call_site: CallSite,
}

impl PendingEntry {
    pub(crate) fn new(id: OperationId, call_site: CallSite) -> Self {
        Self {
            id,
            description: call_site.describe(),
            call_site,
        }
    }
}

impl fmt::Display for PendingEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Pending {}", self.description)?;
        write!(f, "    at {}", self.call_site.location)?;
        if let Some(trace) = &self.call_site.trace {
            for line in trace.lines() {
                write!(f, "\n    {line}")?;
            }
        }
        Ok(())
    }
}

/// Snapshot of every pending entry, ordered by operation ID.
#[derive(Clone, Debug, Default)]
pub struct PendingReport {
    entries: Vec<PendingEntry>,
}

impl PendingReport {
    pub(crate) fn new(entries: Vec<PendingEntry>) -> Self {
        Self { entries }
    }

    /// Number of pending entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing was pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The entries in creation order.
    #[must_use]
    pub fn entries(&self) -> &[PendingEntry] {
        &self.entries
    }

    /// Just the descriptions, in creation order.
    #[must_use]
    pub fn descriptions(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.description.as_str()).collect()
    }

    /// Returns true if any entry's description contains `needle`.
    #[must_use]
    pub fn mentions(&self, needle: &str) -> bool {
        self.entries.iter().any(|e| e.description.contains(needle))
    }
}

impl fmt::Display for PendingReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, entry) in self.entries.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{entry}")?;
        }
        Ok(())
    }
}

/// Symbols whose frames are dropped from captured traces.
const INTERNAL_FRAMES: &[&str] = &[
    "tracked_async::",
    "std::backtrace",
    "std::rt::",
    "std::panicking",
    "std::sys",
    "std::thread::",
    "std::panic::",
    "core::ops::function",
    "core::future::",
    "<core::pin::Pin<P> as core::future",
    "tokio::",
    "futures_executor::",
    "futures_util::",
    "test::run_test",
    "__rust_begin_short_backtrace",
    "__rust_end_short_backtrace",
    "__rust_try",
];

/// Removes the tracking machinery's own frames from a rendered backtrace.
///
/// A frame is its numbered symbol line plus the `at file:line` lines that
/// follow it; the whole group is kept or dropped together.
pub(crate) fn clean_trace(raw: &str) -> String {
    let mut kept = Vec::new();
    let mut keep_frame = false;
    for line in raw.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("at ") {
            if keep_frame {
                kept.push(trimmed);
            }
            continue;
        }
        keep_frame = !INTERNAL_FRAMES.iter().any(|marker| trimmed.contains(marker));
        if keep_frame && !trimmed.is_empty() {
            kept.push(trimmed);
        }
    }
    kept.join("\n")
}
