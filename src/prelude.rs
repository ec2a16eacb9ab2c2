//! # passplan Prelude
//!
//! This module provides a convenient prelude for the most commonly used types and traits
//! of passplan. Import this module to get quick access to everything needed to declare
//! schedulables, build plans and execute them.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all passplan operations
pub use crate::Error;

/// The result type used throughout passplan
pub use crate::Result;

/// Errors reported by schedulables and their classification
pub use crate::{ErrorCategory, PassError, Severity};

// ================================================================================================
// Tag & Feature Model
// ================================================================================================

/// Tags, features and their catalog
pub use crate::model::{Catalog, Feature, FeatureSet, Granularity, GroupId, Tag, TagSet};

// ================================================================================================
// Registry
// ================================================================================================

/// Schedulable declarations and the registry
pub use crate::registry::{
    Descriptor, FnSchedulable, Registry, Schedulable, SchedulableRef, ValidatedRegistry,
};

// ================================================================================================
// Plans
// ================================================================================================

/// Plan construction
pub use crate::plan::{Plan, PlanBuilder, PlanEntry, PlanRequest};

// ================================================================================================
// Execution
// ================================================================================================

/// Plan execution
pub use crate::executor::{
    ExecutionReport, ExecutorConfig, FailurePolicy, Item, ItemOutcome, ItemRef, PlanExecutor,
    RunContext, WorkItem,
};

/// Contract-checked tag access
pub use crate::validator::{ContractViolation, TagAccess};
