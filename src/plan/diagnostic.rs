//! Structured context carried by plan errors.
//!
//! These values are the payload of [`crate::Error::PlanUnsatisfiable`],
//! [`crate::Error::PlanCycle`] and [`crate::Error::InclusionRejected`]. Their `Display`
//! implementations are part of the diagnostic text of those errors.

use std::fmt;

/// Why a registered schedulable is not a candidate for a request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Exclusion {
    /// Its required feature is not enabled.
    FeatureDisabled {
        /// Name of the disabled feature
        feature: String,
    },
    /// Its suppressing feature is enabled.
    FeatureSuppressed {
        /// Name of the enabled feature
        feature: String,
    },
    /// The request excludes it by name.
    Excluded,
    /// It needs the very tag it would have to produce.
    SelfDependent,
}

impl fmt::Display for Exclusion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Exclusion::FeatureDisabled { feature } => {
                write!(f, "requires disabled feature `{feature}`")
            }
            Exclusion::FeatureSuppressed { feature } => {
                write!(f, "is suppressed by enabled feature `{feature}`")
            }
            Exclusion::Excluded => f.write_str("is excluded by the request"),
            Exclusion::SelfDependent => f.write_str("needs the tag itself"),
        }
    }
}

/// A registered producer of a tag that could not be used.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConsideredProducer {
    /// Schedulable name
    pub name: String,
    /// Why it was not used
    pub reason: Exclusion,
}

impl fmt::Display for ConsideredProducer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "`{}` {}", self.name, self.reason)
    }
}

/// Every registered producer of an unsatisfiable tag, in registration order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ProducerList(pub Vec<ConsideredProducer>);

impl ProducerList {
    /// Returns true if no schedulable produces the tag at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of considered producers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterates over the considered producers.
    pub fn iter(&self) -> std::slice::Iter<'_, ConsideredProducer> {
        self.0.iter()
    }

    /// The entry for `name`, if it was considered.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<&ConsideredProducer> {
        self.0.iter().find(|p| p.name == name)
    }
}

impl fmt::Display for ProducerList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("no registered schedulable produces it");
        }
        f.write_str("considered ")?;
        for (i, producer) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{producer}")?;
        }
        Ok(())
    }
}

/// Members of a dependency cycle, each one required to run before the next.
///
/// The first member is the one registered first; the cycle closes back onto it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CycleMembers(pub Vec<String>);

impl CycleMembers {
    /// Member names in dependency order.
    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.0
    }

    /// Returns true if `name` is part of the cycle.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.0.iter().any(|member| member == name)
    }
}

impl fmt::Display for CycleMembers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for member in &self.0 {
            write!(f, "`{member}` -> ")?;
        }
        match self.0.first() {
            Some(first) => write!(f, "`{first}`"),
            None => Ok(()),
        }
    }
}

/// Why the plan builder went looking for a producer of a tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Demand {
    /// The tag is a request target.
    Target,
    /// A selected schedulable needs the tag.
    Need,
    /// A selected schedulable removes a target tag, which must be produced again.
    Restore,
}

impl fmt::Display for Demand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Demand::Target => "requested as a target",
            Demand::Need => "needed",
            Demand::Restore => "to restore after removal",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_producer_list_display() {
        assert_eq!(
            ProducerList::default().to_string(),
            "no registered schedulable produces it"
        );

        let list = ProducerList(vec![
            ConsideredProducer {
                name: "jit".into(),
                reason: Exclusion::FeatureDisabled {
                    feature: "fast".into(),
                },
            },
            ConsideredProducer {
                name: "interp".into(),
                reason: Exclusion::Excluded,
            },
        ]);
        assert_eq!(
            list.to_string(),
            "considered `jit` requires disabled feature `fast`, `interp` is excluded by the request"
        );
        assert!(list.find("interp").is_some());
    }

    #[test]
    fn test_cycle_display() {
        let cycle = CycleMembers(vec!["a".into(), "b".into(), "c".into()]);
        assert_eq!(cycle.to_string(), "`a` -> `b` -> `c` -> `a`");
        assert!(cycle.contains("b"));
        assert!(!cycle.contains("d"));
    }
}
