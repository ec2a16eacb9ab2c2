// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![deny(unsafe_code)]

//! # passplan
//!
//! A generic pass-scheduling engine for batch compiler toolchains.
//!
//! Independently written compiler passes ("schedulables") declare, as data, which facts
//! about a compilation item ("tags") they need, produce and remove, which feature gates
//! them, whether they must run as a barrier and at which granularity they work.
//! `passplan` validates those declarations, computes a deterministic, dependency-correct
//! plan for a request and executes it over a batch of items.
//!
//! ## Features
//!
//! - **Declarative contracts** - passes describe their effects with a [`registry::Descriptor`]
//! - **Static validation** - ambiguous producers and exclusive-group conflicts are caught
//!   before any plan is built
//! - **Deterministic planning** - registration order is the only tie-break
//! - **Actionable diagnostics** - every error names the tags, passes and items involved
//! - **Parallel execution** - non-exclusive stages run on a bounded rayon pool
//! - **Exclusive barriers** - scoped guards for passes that touch shared output
//! - **Contract validation** - runs that touch undeclared tags are caught in debug builds
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use passplan::prelude::*;
//!
//! let mut catalog = Catalog::new();
//! let cfg = catalog.tag("cfg")?;
//! let ssa = catalog.tag("ssa")?;
//! let catalog = Arc::new(catalog);
//!
//! let mut registry = Registry::new(catalog);
//! registry.register(FnSchedulable::noop(
//!     Descriptor::builder("build-cfg").produces(cfg).build(),
//! ))?;
//! registry.register(FnSchedulable::new(
//!     Descriptor::builder("to-ssa").needs(cfg).produces(ssa).build(),
//!     move |cx| {
//!         assert!(cx.tags().has(cfg)?);
//!         Ok(())
//!     },
//! ))?;
//! let registry = registry.validate()?;
//!
//! let plan = registry.plan(&PlanRequest::new().target(ssa))?;
//! assert_eq!(plan.names(), vec!["build-cfg", "to-ssa"]);
//! # Ok::<(), passplan::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`model`] - tags, features, exclusive groups and granularities
//! - [`registry`] - schedulable descriptors and registry validation
//! - [`plan`] - plan requests, the plan builder and plans
//! - [`executor`] - staged execution over compilation items
//! - [`validator`] - contract checks during execution
//!
//! ## Error Handling
//!
//! All fallible operations return [`Result<T>`]. [`Error::category`] tells configuration,
//! plan, contract, item and runtime errors apart. Schedulables report failures through
//! [`PassError`], classified as [`Severity::Fatal`] or [`Severity::Recoverable`].
//!
//! ## Logging
//!
//! The crate logs through the [`log`] facade: registry and plan construction at `debug`
//! and `info`, recoverable item failures at `warn`, aborted executions at `error`.

pub(crate) mod error;

/// Shared functionality which is used in unit- and integration-tests
#[cfg(test)]
pub(crate) mod test;

/// Convenient re-exports of the most commonly used types and traits.
///
/// # Example
///
/// ```rust
/// use passplan::prelude::*;
///
/// let mut catalog = Catalog::new();
/// let tag = catalog.tag("parsed")?;
/// let request = PlanRequest::new().target(tag);
/// assert!(request.targets().contains(tag));
/// # Ok::<(), passplan::Error>(())
/// ```
pub mod prelude;

pub mod executor;
pub mod model;
pub mod plan;
pub mod registry;
pub mod validator;

/// `passplan` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type is always [`Error`].
/// This is used consistently throughout the crate for all fallible operations.
pub type Result<T> = std::result::Result<T, Error>;

/// `passplan` Error type
///
/// The main error type for all operations in this crate. Every variant carries the names
/// needed to render a precise diagnostic.
///
/// # Examples
///
/// ```rust
/// use passplan::{model::Catalog, plan::PlanRequest, registry::Registry, Error};
/// use std::sync::Arc;
///
/// let mut catalog = Catalog::new();
/// let dex = catalog.tag("dex")?;
/// let registry = Registry::new(Arc::new(catalog)).validate()?;
///
/// match registry.plan(&PlanRequest::new().target(dex)) {
///     Err(Error::PlanUnsatisfiable { tag, considered, .. }) => {
///         assert_eq!(tag, "dex");
///         assert!(considered.is_empty());
///     }
///     other => panic!("unexpected: {other:?}"),
/// }
/// # Ok::<(), passplan::Error>(())
/// ```
pub use error::Error;

pub use error::{ErrorCategory, PassError, Severity};
