//! The `Schedulable` trait implemented by every pass.

use std::fmt;

use crate::{executor::RunContext, registry::Descriptor, PassError};

/// A compiler pass with a declared tag/feature contract.
///
/// All schedulables must be thread-safe (`Send + Sync`): non-exclusive stages run the
/// same schedulable on many items concurrently. A schedulable only ever sees the item
/// it is given and the tag view of that item's enclosing compilation item; any state
/// shared between items must be protected by the schedulable itself, or touched only
/// from exclusive stages.
///
/// # Examples
///
/// ```rust
/// use passplan::{
///     executor::RunContext,
///     registry::{Descriptor, Schedulable},
///     PassError,
/// };
///
/// struct Verify {
///     descriptor: Descriptor,
/// }
///
/// impl Schedulable for Verify {
///     fn descriptor(&self) -> &Descriptor {
///         &self.descriptor
///     }
///
///     fn run(&self, cx: &mut RunContext<'_>) -> Result<(), PassError> {
///         if cx.item().label().is_empty() {
///             return Err(PassError::recoverable("anonymous item"));
///         }
///         Ok(())
///     }
/// }
/// ```
pub trait Schedulable: Send + Sync {
    /// The declared contract.
    fn descriptor(&self) -> &Descriptor;

    /// Processes one item of the declared granularity.
    ///
    /// # Errors
    ///
    /// Returns a [`PassError`] whose severity tells the executor whether to abort the
    /// whole execution or only the current item.
    fn run(&self, cx: &mut RunContext<'_>) -> Result<(), PassError>;

    /// Unique name, shorthand for `descriptor().name()`.
    fn name(&self) -> &str {
        self.descriptor().name()
    }
}

/// A [`Schedulable`] built from a descriptor and a closure.
///
/// # Examples
///
/// ```rust
/// use passplan::registry::{Descriptor, FnSchedulable, Schedulable};
///
/// let pass = FnSchedulable::new(Descriptor::builder("noop").build(), |_cx| Ok(()));
/// assert_eq!(pass.name(), "noop");
/// ```
pub struct FnSchedulable<F> {
    descriptor: Descriptor,
    run: F,
}

/// Function pointer type of [`FnSchedulable::noop`].
pub type NoopFn = fn(&mut RunContext<'_>) -> Result<(), PassError>;

impl<F> FnSchedulable<F>
where
    F: Fn(&mut RunContext<'_>) -> Result<(), PassError> + Send + Sync,
{
    /// Wraps `run` with `descriptor`.
    pub fn new(descriptor: Descriptor, run: F) -> Self {
        Self { descriptor, run }
    }
}

impl FnSchedulable<NoopFn> {
    /// A schedulable that only carries its contract.
    ///
    /// Useful for dry-run registries that are only used to build and render plans.
    #[must_use]
    pub fn noop(descriptor: Descriptor) -> Self {
        fn skip(_cx: &mut RunContext<'_>) -> Result<(), PassError> {
            Ok(())
        }
        Self {
            descriptor,
            run: skip,
        }
    }
}

impl<F> Schedulable for FnSchedulable<F>
where
    F: Fn(&mut RunContext<'_>) -> Result<(), PassError> + Send + Sync,
{
    fn descriptor(&self) -> &Descriptor {
        &self.descriptor
    }

    fn run(&self, cx: &mut RunContext<'_>) -> Result<(), PassError> {
        (self.run)(cx)
    }
}

impl<F> fmt::Debug for FnSchedulable<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnSchedulable")
            .field("descriptor", &self.descriptor)
            .finish_non_exhaustive()
    }
}
