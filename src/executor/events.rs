//! Execution event log.
//!
//! The executor records what happened to each stage and item in an [`EventLog`]. The log
//! is append-only and lock-free, so worker threads record failures concurrently through a
//! shared reference. It ends up in the [`super::ExecutionReport`].
//!
//! # Example
//!
//! ```rust
//! use passplan::executor::{EventKind, EventLog};
//!
//! let log = EventLog::new();
//! log.record(EventKind::ItemFailed)
//!     .stage(3)
//!     .schedulable("inline")
//!     .item("Foo::bar")
//!     .message("method body too large");
//!
//! assert_eq!(log.count_kind(EventKind::ItemFailed), 1);
//! ```

use std::{collections::HashMap, fmt};

/// Categories of execution events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A stage started.
    StageStarted,
    /// A stage finished on every participating item.
    StageCompleted,
    /// A recoverable failure removed an item from the remaining stages.
    ItemFailed,
    /// A fatal failure stopped the execution.
    ExecutionAborted,
}

impl EventKind {
    /// Returns a human-readable description of this event kind.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::StageStarted => "stage started",
            Self::StageCompleted => "stage completed",
            Self::ItemFailed => "item failed",
            Self::ExecutionAborted => "execution aborted",
        }
    }

    /// Returns true for failure events.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::ItemFailed | Self::ExecutionAborted)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// A single logged event.
#[derive(Debug, Clone)]
pub struct Event {
    /// The type of event.
    pub kind: EventKind,
    /// Plan position of the stage (if applicable).
    pub stage: Option<usize>,
    /// Schedulable of the stage (if applicable).
    pub schedulable: Option<String>,
    /// Label of the item concerned (if applicable).
    pub item: Option<String>,
    /// Human-readable description.
    pub message: String,
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.kind)?;
        if let Some(stage) = self.stage {
            write!(f, " #{stage}")?;
        }
        if let Some(schedulable) = &self.schedulable {
            write!(f, " {schedulable}")?;
        }
        if let Some(item) = &self.item {
            write!(f, " on `{item}`")?;
        }
        write!(f, ": {}", self.message)
    }
}

/// Builder for creating events with a fluent API.
///
/// Created by [`EventLog::record`]. The event is added to the log when the builder is
/// dropped.
pub struct EventBuilder<'a> {
    log: &'a EventLog,
    kind: EventKind,
    stage: Option<usize>,
    schedulable: Option<String>,
    item: Option<String>,
    message: Option<String>,
}

impl<'a> EventBuilder<'a> {
    fn new(log: &'a EventLog, kind: EventKind) -> Self {
        Self {
            log,
            kind,
            stage: None,
            schedulable: None,
            item: None,
            message: None,
        }
    }

    /// Sets the plan position of the stage.
    pub fn stage(mut self, position: usize) -> Self {
        self.stage = Some(position);
        self
    }

    /// Sets the schedulable of the stage.
    pub fn schedulable(mut self, name: impl Into<String>) -> Self {
        self.schedulable = Some(name.into());
        self
    }

    /// Sets the item concerned.
    pub fn item(mut self, label: impl Into<String>) -> Self {
        self.item = Some(label.into());
        self
    }

    /// Sets a custom message describing the event.
    pub fn message(mut self, msg: impl Into<String>) -> Self {
        self.message = Some(msg.into());
        self
    }
}

impl Drop for EventBuilder<'_> {
    fn drop(&mut self) {
        let message = self
            .message
            .take()
            .unwrap_or_else(|| self.kind.description().to_string());

        self.log.events.push(Event {
            kind: self.kind,
            stage: self.stage.take(),
            schedulable: self.schedulable.take(),
            item: self.item.take(),
            message,
        });
    }
}

/// Append-only collection of execution events.
///
/// This type is thread-safe: events can be appended concurrently from multiple threads
/// using shared references (`&self`).
#[derive(Debug)]
pub struct EventLog {
    events: boxcar::Vec<Event>,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for EventLog {
    fn clone(&self) -> Self {
        let new_log = Self::new();
        for (_, event) in &self.events {
            new_log.events.push(event.clone());
        }
        new_log
    }
}

impl EventLog {
    /// Creates an empty event log.
    #[must_use]
    pub fn new() -> Self {
        Self {
            events: boxcar::Vec::new(),
        }
    }

    /// Returns true if no events have been logged.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.count() == 0
    }

    /// Returns the total number of events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.count()
    }

    /// Starts building a new event of the given kind.
    ///
    /// The event is added when the builder is dropped.
    pub fn record(&self, kind: EventKind) -> EventBuilder<'_> {
        EventBuilder::new(self, kind)
    }

    /// Returns true if any event of the given kind exists.
    #[must_use]
    pub fn has(&self, kind: EventKind) -> bool {
        self.events.iter().any(|(_, e)| e.kind == kind)
    }

    /// Counts events of the given kind.
    #[must_use]
    pub fn count_kind(&self, kind: EventKind) -> usize {
        self.events.iter().filter(|(_, e)| e.kind == kind).count()
    }

    /// Returns an iterator over all events, in recording order.
    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.events.iter().map(|(_, e)| e)
    }

    /// Returns an iterator over events of a specific kind.
    pub fn filter_kind(&self, kind: EventKind) -> impl Iterator<Item = &Event> + '_ {
        self.events
            .iter()
            .filter_map(move |(_, e)| if e.kind == kind { Some(e) } else { None })
    }

    /// Returns an iterator over failure events only.
    pub fn failures(&self) -> impl Iterator<Item = &Event> + '_ {
        self.events
            .iter()
            .filter_map(|(_, e)| if e.kind.is_failure() { Some(e) } else { None })
    }

    /// Counts events grouped by kind.
    #[must_use]
    pub fn count_by_kind(&self) -> HashMap<EventKind, usize> {
        let mut counts = HashMap::new();
        for (_, event) in &self.events {
            *counts.entry(event.kind).or_insert(0) += 1;
        }
        counts
    }

    /// Generates a human-readable summary of all events.
    #[must_use]
    pub fn summary(&self) -> String {
        if self.is_empty() {
            return "no events".to_string();
        }

        let mut parts: Vec<String> = self
            .count_by_kind()
            .iter()
            .map(|(kind, count)| format!("{} {}", count, kind.description()))
            .collect();
        parts.sort();
        parts.join(", ")
    }
}
