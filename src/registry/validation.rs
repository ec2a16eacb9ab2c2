//! Static consistency checks run by [`super::Registry::validate`].
//!
//! Each check returns the first violation it finds. Schedulables are always visited in
//! registration order and tags in ascending id order, so the reported error is stable
//! for a given registry.

use std::collections::HashMap;

use crate::{
    model::{Catalog, Tag},
    registry::SchedulableRef,
    Error, Result,
};

/// Rejects tags declared in more than one exclusive group.
pub(super) fn check_groups(catalog: &Catalog) -> Result<()> {
    if let Some((tag, first, second)) = catalog.find_overlap() {
        let group_name = |id| {
            catalog
                .group(id)
                .map(|g| g.name.clone())
                .unwrap_or_default()
        };
        return Err(Error::TagGroupOverlap {
            tag: catalog.tag_name(tag),
            first: group_name(first),
            second: group_name(second),
        });
    }
    Ok(())
}

/// Rejects descriptors that produce and remove the same tag.
pub(super) fn check_effects(catalog: &Catalog, entries: &[SchedulableRef]) -> Result<()> {
    for entry in entries {
        let descriptor = entry.descriptor();
        if let Some(tag) = descriptor
            .produces()
            .intersection(descriptor.removes())
            .first()
        {
            return Err(Error::ConflictingEffects {
                schedulable: descriptor.name().to_string(),
                tag: catalog.tag_name(tag),
            });
        }
    }
    Ok(())
}

/// Rejects descriptors that could leave two tags of one exclusive group on an item.
///
/// A producer of a grouped tag must produce no other tag of the group and must remove
/// every other member.
pub(super) fn check_exclusivity(catalog: &Catalog, entries: &[SchedulableRef]) -> Result<()> {
    for entry in entries {
        let descriptor = entry.descriptor();
        for group in catalog.groups() {
            let produced = descriptor.produces().intersection(&group.tags);
            let Some(tag) = produced.first() else {
                continue;
            };

            let conflict = produced
                .iter()
                .find(|other| *other != tag)
                .or_else(|| {
                    group
                        .tags
                        .difference(descriptor.removes())
                        .iter()
                        .find(|other| *other != tag)
                });

            if let Some(other) = conflict {
                return Err(Error::ExclusivityConflict {
                    schedulable: descriptor.name().to_string(),
                    tag: catalog.tag_name(tag),
                    other: catalog.tag_name(other),
                    group: group.name.clone(),
                });
            }
        }
    }
    Ok(())
}

/// Resolves declared alternative groups to registration indices.
pub(super) fn resolve_alternatives(
    catalog: &Catalog,
    entries: &[SchedulableRef],
    names: &HashMap<String, usize>,
    declared: Vec<(Tag, Vec<String>)>,
) -> Result<HashMap<Tag, Vec<usize>>> {
    let mut resolved = HashMap::with_capacity(declared.len());

    for (tag, members) in declared {
        let mut indices = Vec::with_capacity(members.len());
        for name in members {
            let Some(&index) = names.get(&name) else {
                return Err(Error::UnknownSchedulable { name });
            };
            if !entries[index].descriptor().produces().contains(tag) {
                return Err(Error::NotAProducer {
                    schedulable: name,
                    tag: catalog.tag_name(tag),
                });
            }
            if !indices.contains(&index) {
                indices.push(index);
            }
        }
        resolved.insert(tag, indices);
    }

    Ok(resolved)
}

/// Rejects pairs of producers of one tag that can be eligible in the same feature
/// configuration without being declared alternatives of each other.
pub(super) fn check_producers(
    catalog: &Catalog,
    entries: &[SchedulableRef],
    producers: &HashMap<Tag, Vec<usize>>,
    alternatives: &HashMap<Tag, Vec<usize>>,
) -> Result<()> {
    for (later, entry) in entries.iter().enumerate() {
        let descriptor = entry.descriptor();
        for tag in descriptor.produces() {
            let declared = alternatives.get(&tag);
            let earlier = producers
                .get(&tag)
                .into_iter()
                .flatten()
                .copied()
                .take_while(|index| *index < later);

            for index in earlier {
                let both_declared =
                    declared.is_some_and(|group| group.contains(&index) && group.contains(&later));
                if both_declared
                    || entries[index]
                        .descriptor()
                        .is_gated_apart_from(descriptor)
                {
                    continue;
                }

                return Err(Error::AmbiguousProducer {
                    tag: catalog.tag_name(tag),
                    first: entries[index].name().to_string(),
                    second: descriptor.name().to_string(),
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::{
        registry::{Descriptor, Registry},
        test::{noop, TestCatalog},
        Error, Result,
    };

    #[test]
    fn test_ambiguous_producer() -> Result<()> {
        let cat = TestCatalog::new(&["x"])?;
        let mut registry = Registry::new(cat.shared());
        registry.register(noop(Descriptor::builder("a").produces(cat.tag("x"))))?;
        registry.register(noop(Descriptor::builder("b").produces(cat.tag("x"))))?;

        let err = registry.validate().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Ambiguous producers for tag `x`: `a` and `b` can both be scheduled in the same \
             configuration; declare them as alternatives or gate them on opposite features"
        );
        Ok(())
    }

    #[test]
    fn test_declared_alternatives_resolve_ambiguity() -> Result<()> {
        let cat = TestCatalog::new(&["x"])?;
        let mut registry = Registry::new(cat.shared());
        registry.register(noop(Descriptor::builder("a").produces(cat.tag("x"))))?;
        registry.register(noop(Descriptor::builder("b").produces(cat.tag("x"))))?;
        registry.declare_alternatives(cat.tag("x"), ["b", "a"])?;

        let registry = registry.validate()?;
        assert_eq!(registry.alternatives_for(cat.tag("x")), Some(&[1, 0][..]));
        Ok(())
    }

    #[test]
    fn test_opposite_gates_resolve_ambiguity() -> Result<()> {
        let cat = TestCatalog::with_features(&["x"], &["fast"])?;
        let mut registry = Registry::new(cat.shared());
        registry.register(noop(
            Descriptor::builder("a")
                .produces(cat.tag("x"))
                .requires_feature(cat.feature("fast")),
        ))?;
        registry.register(noop(
            Descriptor::builder("b")
                .produces(cat.tag("x"))
                .unless_feature(cat.feature("fast")),
        ))?;

        assert!(registry.validate().is_ok());
        Ok(())
    }

    #[test]
    fn test_alternative_errors() -> Result<()> {
        let cat = TestCatalog::new(&["x", "y"])?;

        let mut registry = Registry::new(cat.shared());
        registry.register(noop(Descriptor::builder("a").produces(cat.tag("x"))))?;
        registry.declare_alternatives(cat.tag("x"), ["a", "ghost"])?;
        assert!(matches!(
            registry.validate(),
            Err(Error::UnknownSchedulable { ref name }) if name == "ghost"
        ));

        let mut registry = Registry::new(cat.shared());
        registry.register(noop(Descriptor::builder("a").produces(cat.tag("x"))))?;
        registry.register(noop(Descriptor::builder("b").produces(cat.tag("y"))))?;
        registry.declare_alternatives(cat.tag("x"), ["a", "b"])?;
        assert!(matches!(
            registry.validate(),
            Err(Error::NotAProducer { ref schedulable, .. }) if schedulable == "b"
        ));
        Ok(())
    }

    #[test]
    fn test_conflicting_effects() -> Result<()> {
        let cat = TestCatalog::new(&["x"])?;
        let mut registry = Registry::new(cat.shared());
        registry.register(noop(
            Descriptor::builder("flip")
                .produces(cat.tag("x"))
                .removes(cat.tag("x")),
        ))?;
        assert!(matches!(
            registry.validate(),
            Err(Error::ConflictingEffects { ref schedulable, ref tag })
                if schedulable == "flip" && tag == "x"
        ));
        Ok(())
    }

    #[test]
    fn test_exclusivity_conflict() -> Result<()> {
        let mut cat = TestCatalog::new(&["src", "opt"])?;
        cat.group("ir", &["src", "opt"]);

        let mut registry = Registry::new(cat.shared());
        registry.register(noop(Descriptor::builder("optimize").produces(cat.tag("opt"))))?;
        let err = registry.validate().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Schedulable `optimize` produces `opt` of exclusive group `ir` but does not supersede `src`"
        );

        let mut registry = Registry::new(cat.shared());
        registry.register(noop(
            Descriptor::builder("both").produces_all([cat.tag("src"), cat.tag("opt")]),
        ))?;
        assert!(matches!(
            registry.validate(),
            Err(Error::ExclusivityConflict { .. })
        ));

        let mut registry = Registry::new(cat.shared());
        registry.register(noop(
            Descriptor::builder("optimize")
                .produces(cat.tag("opt"))
                .supersedes(cat.tag("src")),
        ))?;
        assert!(registry.validate().is_ok());
        Ok(())
    }

    #[test]
    fn test_group_overlap() -> Result<()> {
        let mut cat = TestCatalog::new(&["a", "b", "c"])?;
        cat.group("first", &["a", "b"]);
        cat.group("second", &["b", "c"]);

        let registry = Registry::new(cat.shared());
        assert!(matches!(
            registry.validate(),
            Err(Error::TagGroupOverlap { ref tag, ref first, ref second })
                if tag == "b" && first == "first" && second == "second"
        ));
        Ok(())
    }
}
