use thiserror::Error;

use crate::{
    plan::{CycleMembers, Demand, Exclusion, ProducerList},
    validator::ContractViolation,
};

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// Every variant carries the names of the tags, schedulables and items involved, so the
/// `Display` output is a complete diagnostic on its own. The variants fall into the
/// categories reported by [`Error::category`].
///
/// # Error Categories
///
/// ## Configuration Errors
/// Raised while building the catalog or validating the registry, before any plan exists:
/// - [`Error::CatalogFull`], [`Error::DuplicateName`], [`Error::DuplicateAlternatives`]
/// - [`Error::UnknownSchedulable`], [`Error::NotAProducer`]
/// - [`Error::TagGroupOverlap`], [`Error::ConflictingEffects`]
/// - [`Error::AmbiguousProducer`], [`Error::ExclusivityConflict`]
///
/// ## Plan Errors
/// Raised by the plan builder; fully diagnosable from registry and request:
/// - [`Error::PlanUnsatisfiable`], [`Error::PlanCycle`]
/// - [`Error::InclusionRejected`], [`Error::PlanUnsound`]
///
/// ## Contract Violations
/// - [`Error::ContractViolation`] - a schedulable touched a tag outside its declaration
///
/// ## Item Errors
/// - [`Error::Aborted`] - a schedulable failed fatally while processing an item
///
/// # Examples
///
/// ```rust
/// use passplan::{Error, ErrorCategory};
///
/// let err = Error::DuplicateName { name: "ssa".into() };
/// assert_eq!(err.category(), ErrorCategory::Configuration);
/// assert_eq!(err.to_string(), "Schedulable `ssa` is already registered");
/// ```
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    /// The catalog ran out of ids.
    #[error("Catalog is full - cannot define {kind} `{name}`, at most {capacity} are supported")]
    CatalogFull {
        /// `"tag"` or `"feature"`
        kind: &'static str,
        /// The name that could not be defined
        name: String,
        /// The fixed capacity
        capacity: usize,
    },

    /// A schedulable with the same name was already registered.
    #[error("Schedulable `{name}` is already registered")]
    DuplicateName {
        /// The clashing name
        name: String,
    },

    /// Alternatives were declared twice for the same tag.
    #[error("Alternative producers for tag `{tag}` are already declared")]
    DuplicateAlternatives {
        /// The tag
        tag: String,
    },

    /// A name does not refer to any registered schedulable.
    #[error("Unknown schedulable `{name}`")]
    UnknownSchedulable {
        /// The unknown name
        name: String,
    },

    /// A schedulable was listed as an alternative producer of a tag it does not produce.
    #[error("Schedulable `{schedulable}` is listed as an alternative producer of `{tag}` but does not produce it")]
    NotAProducer {
        /// The listed schedulable
        schedulable: String,
        /// The tag
        tag: String,
    },

    /// A tag was declared in two exclusive groups.
    #[error("Tag `{tag}` is declared in exclusive groups `{first}` and `{second}`")]
    TagGroupOverlap {
        /// The tag
        tag: String,
        /// The first group declaring it
        first: String,
        /// The second group declaring it
        second: String,
    },

    /// A schedulable both produces and removes a tag.
    #[error("Schedulable `{schedulable}` both produces and removes tag `{tag}`")]
    ConflictingEffects {
        /// The schedulable
        schedulable: String,
        /// The tag
        tag: String,
    },

    /// Two producers of one tag can be eligible in the same feature configuration.
    #[error("Ambiguous producers for tag `{tag}`: `{first}` and `{second}` can both be scheduled in the same configuration; declare them as alternatives or gate them on opposite features")]
    AmbiguousProducer {
        /// The tag produced twice
        tag: String,
        /// First producer in registration order
        first: String,
        /// Second producer in registration order
        second: String,
    },

    /// A schedulable could leave two tags of one exclusive group on an item.
    #[error("Schedulable `{schedulable}` produces `{tag}` of exclusive group `{group}` but does not supersede `{other}`")]
    ExclusivityConflict {
        /// The schedulable
        schedulable: String,
        /// The produced tag
        tag: String,
        /// The group member that may still hold
        other: String,
        /// The exclusive group
        group: String,
    },

    // Plan errors
    /// A required tag has no eligible producer.
    #[error("Cannot satisfy tag `{tag}` {demand}{}: {considered}", consumer_clause(.consumer))]
    PlanUnsatisfiable {
        /// The tag nobody can produce
        tag: String,
        /// Why the tag was required
        demand: Demand,
        /// The schedulable that needs the tag, `None` for a request target
        consumer: Option<String>,
        /// Every registered producer and why it was not eligible
        considered: ProducerList,
    },

    /// The dependency graph of the selected schedulables contains a cycle.
    #[error("Dependency cycle between schedulables: {members}")]
    PlanCycle {
        /// Cycle members in dependency order
        members: CycleMembers,
    },

    /// A schedulable named explicitly in the request is not eligible.
    #[error("Schedulable `{name}` was requested explicitly but {reason}")]
    InclusionRejected {
        /// The requested schedulable
        name: String,
        /// Why it is not eligible
        reason: Exclusion,
    },

    /// The built plan does not establish a tag it promised.
    #[error("Plan is unsound at position {position}{}: tag `{tag}` does not hold", schedulable_clause(.schedulable))]
    PlanUnsound {
        /// Plan position (equal to the plan length for a missing target)
        position: usize,
        /// The schedulable whose need does not hold
        schedulable: Option<String>,
        /// The missing tag
        tag: String,
    },

    // Contract errors
    /// A schedulable touched a tag outside its declared contract.
    #[error(transparent)]
    ContractViolation(#[from] ContractViolation),

    // Item errors
    /// A schedulable failed fatally; the execution was aborted.
    #[error("Execution aborted at stage {stage} (`{schedulable}`) on item `{item}`: {source}")]
    Aborted {
        /// Plan position of the failing stage
        stage: usize,
        /// The failing schedulable
        schedulable: String,
        /// The item being processed
        item: String,
        /// The error returned by the schedulable
        #[source]
        source: PassError,
    },

    // Runtime errors
    /// The worker pool could not be created.
    #[error("Failed to build worker pool - {0}")]
    ThreadPool(String),
}

fn consumer_clause(consumer: &Option<String>) -> String {
    match consumer {
        Some(name) => format!(" by `{name}`"),
        None => String::new(),
    }
}

fn schedulable_clause(schedulable: &Option<String>) -> String {
    match schedulable {
        Some(name) => format!(" (`{name}`)"),
        None => String::new(),
    }
}

/// Broad classes of [`Error`], matching the phases in which they are raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Catalog or registry is inconsistent.
    Configuration,
    /// A plan could not be built for a request.
    Plan,
    /// A schedulable broke its declared contract.
    Contract,
    /// A schedulable failed on an item.
    Item,
    /// The runtime environment failed.
    Runtime,
}

impl Error {
    /// The category of this error.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::CatalogFull { .. }
            | Error::DuplicateName { .. }
            | Error::DuplicateAlternatives { .. }
            | Error::UnknownSchedulable { .. }
            | Error::NotAProducer { .. }
            | Error::TagGroupOverlap { .. }
            | Error::ConflictingEffects { .. }
            | Error::AmbiguousProducer { .. }
            | Error::ExclusivityConflict { .. } => ErrorCategory::Configuration,
            Error::PlanUnsatisfiable { .. }
            | Error::PlanCycle { .. }
            | Error::InclusionRejected { .. }
            | Error::PlanUnsound { .. } => ErrorCategory::Plan,
            Error::ContractViolation(_) => ErrorCategory::Contract,
            Error::Aborted { .. } => ErrorCategory::Item,
            Error::ThreadPool(_) => ErrorCategory::Runtime,
        }
    }
}

/// How the executor must treat a [`PassError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    /// Abort the whole execution.
    Fatal,
    /// Mark the item as failed and continue with the others.
    Recoverable,
}

/// Error returned by [`crate::registry::Schedulable::run`].
///
/// The calling context decides whether a failure is fatal or recoverable; the engine
/// honors the classification (subject to [`crate::executor::FailurePolicy`]).
///
/// # Examples
///
/// ```rust
/// use passplan::{PassError, Severity};
///
/// let err = PassError::recoverable("method body too large");
/// assert_eq!(err.severity(), Severity::Recoverable);
/// assert_eq!(err.to_string(), "method body too large");
/// ```
#[derive(Error, Debug)]
#[error("{message}")]
pub struct PassError {
    severity: Severity,
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl PassError {
    /// Creates an error with an explicit severity.
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
            source: None,
        }
    }

    /// Creates an error that aborts the whole execution.
    pub fn fatal(message: impl Into<String>) -> Self {
        Self::new(Severity::Fatal, message)
    }

    /// Creates an error that only fails the current item.
    pub fn recoverable(message: impl Into<String>) -> Self {
        Self::new(Severity::Recoverable, message)
    }

    /// Attaches an underlying cause.
    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// The classification given by the schedulable.
    #[must_use]
    pub fn severity(&self) -> Severity {
        self.severity
    }

    /// The error message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns true for [`Severity::Fatal`].
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        self.severity == Severity::Fatal
    }

    pub(crate) fn reclassified(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }
}

impl From<ContractViolation> for PassError {
    fn from(violation: ContractViolation) -> Self {
        PassError::fatal(violation.to_string()).with_source(violation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categories() {
        assert_eq!(
            Error::UnknownSchedulable { name: "x".into() }.category(),
            ErrorCategory::Configuration
        );
        assert_eq!(
            Error::PlanUnsound {
                position: 0,
                schedulable: None,
                tag: "t".into()
            }
            .category(),
            ErrorCategory::Plan
        );
        assert_eq!(
            Error::ThreadPool("boom".into()).category(),
            ErrorCategory::Runtime
        );
    }

    #[test]
    fn test_pass_error_source() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
        let err = PassError::fatal("cannot write archive").with_source(io);
        assert!(err.is_fatal());
        assert_eq!(err.message(), "cannot write archive");
        let source = std::error::Error::source(&err).map(ToString::to_string);
        assert_eq!(source.as_deref(), Some("disk full"));
    }

    #[test]
    fn test_unsound_message() {
        let err = Error::PlanUnsound {
            position: 2,
            schedulable: Some("dce".into()),
            tag: "ssa".into(),
        };
        assert_eq!(
            err.to_string(),
            "Plan is unsound at position 2 (`dce`): tag `ssa` does not hold"
        );
    }
}
