//! Configuration for the plan executor.

use crate::Severity;

/// How the executor treats the severity a schedulable gives its failures.
///
/// Contract violations are fatal under every policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FailurePolicy {
    /// Honor the severity given by the schedulable (default).
    #[default]
    AsClassified,
    /// Treat every failure as fatal.
    FailFast,
    /// Treat every failure as recoverable.
    KeepGoing,
}

impl FailurePolicy {
    /// The effective severity of a failure classified as `severity`.
    #[must_use]
    pub fn classify(self, severity: Severity) -> Severity {
        match self {
            FailurePolicy::AsClassified => severity,
            FailurePolicy::FailFast => Severity::Fatal,
            FailurePolicy::KeepGoing => Severity::Recoverable,
        }
    }
}

/// Configuration for [`super::PlanExecutor`].
///
/// # Examples
///
/// ```rust
/// use passplan::executor::{ExecutorConfig, FailurePolicy};
///
/// let config = ExecutorConfig::validated()
///     .with_worker_threads(4)
///     .with_failure_policy(FailurePolicy::KeepGoing);
/// assert!(config.validate_contracts);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutorConfig {
    /// Worker threads for non-exclusive stages (default: 0, the rayon default).
    pub worker_threads: usize,

    /// Check every run against its declared contract (default: on in debug builds).
    pub validate_contracts: bool,

    /// Failure severity policy (default: [`FailurePolicy::AsClassified`]).
    pub failure_policy: FailurePolicy,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            worker_threads: 0,
            validate_contracts: cfg!(debug_assertions),
            failure_policy: FailurePolicy::AsClassified,
        }
    }
}

impl ExecutorConfig {
    /// Runs every stage on a single worker.
    #[must_use]
    pub fn sequential() -> Self {
        Self {
            worker_threads: 1,
            ..Self::default()
        }
    }

    /// Always checks contracts, regardless of build profile.
    #[must_use]
    pub fn validated() -> Self {
        Self {
            validate_contracts: true,
            ..Self::default()
        }
    }

    /// Aborts on the first failure of any item.
    #[must_use]
    pub fn fail_fast() -> Self {
        Self {
            failure_policy: FailurePolicy::FailFast,
            ..Self::default()
        }
    }

    /// Sets the number of worker threads (0 = rayon default).
    #[must_use]
    pub fn with_worker_threads(mut self, worker_threads: usize) -> Self {
        self.worker_threads = worker_threads;
        self
    }

    /// Enables or disables contract validation.
    #[must_use]
    pub fn with_validation(mut self, validate_contracts: bool) -> Self {
        self.validate_contracts = validate_contracts;
        self
    }

    /// Sets the failure policy.
    #[must_use]
    pub fn with_failure_policy(mut self, failure_policy: FailurePolicy) -> Self {
        self.failure_policy = failure_policy;
        self
    }
}
