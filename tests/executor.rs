//! End-to-end execution of plans over item trees.

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};

use passplan::{
    executor::{EventKind, StageBarrier, WithheldStage},
    model::{Catalog, Granularity},
    prelude::*,
};

/// A session, type or method of a toy program.
struct Node {
    label: String,
    granularity: Granularity,
    children: Vec<Arc<Node>>,
}

impl Node {
    fn leaf(label: String, granularity: Granularity) -> Arc<Node> {
        Node::branch(label, granularity, Vec::new())
    }

    fn branch(label: String, granularity: Granularity, children: Vec<Arc<Node>>) -> Arc<Node> {
        Arc::new(Node {
            label,
            granularity,
            children,
        })
    }

    /// `types` types of `methods` methods each.
    fn program(label: &str, types: usize, methods: usize) -> Arc<Node> {
        let children = (0..types)
            .map(|t| {
                let ty = format!("{label}.T{t}");
                Arc::new(Node {
                    children: (0..methods)
                        .map(|m| Node::leaf(format!("{ty}.m{m}"), Granularity::Method))
                        .collect(),
                    label: ty,
                    granularity: Granularity::Type,
                })
            })
            .collect();
        Arc::new(Node {
            label: label.to_string(),
            granularity: Granularity::Session,
            children,
        })
    }
}

impl Item for Node {
    fn label(&self) -> String {
        self.label.clone()
    }

    fn granularity(&self) -> Granularity {
        self.granularity
    }

    fn children(&self, granularity: Granularity) -> Vec<ItemRef> {
        let mut out: Vec<ItemRef> = Vec::new();
        for child in &self.children {
            if child.granularity == granularity {
                out.push(child.clone());
            } else if child.granularity.is_coarser_than(granularity) {
                out.extend(child.children(granularity));
            }
        }
        out
    }
}

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

struct Pipeline {
    registry: ValidatedRegistry,
    resolved: Tag,
    lowered: Tag,
    written: Tag,
    methods_seen: Arc<AtomicUsize>,
    written_by: Arc<Mutex<Vec<String>>>,
}

/// resolve (session) -> lower (method) -> write (session, exclusive).
fn pipeline(fail_on: Option<&'static str>) -> Result<Pipeline> {
    let mut catalog = Catalog::new();
    let resolved = catalog.tag("resolved")?;
    let lowered = catalog.tag("lowered")?;
    let written = catalog.tag("written")?;
    let methods_seen = Arc::new(AtomicUsize::new(0));
    let written_by = Arc::new(Mutex::new(Vec::new()));

    let mut registry = Registry::new(Arc::new(catalog));
    registry.register(FnSchedulable::noop(
        Descriptor::builder("resolve").produces(resolved).build(),
    ))?;
    {
        let seen = methods_seen.clone();
        registry.register(FnSchedulable::new(
            Descriptor::builder("lower")
                .needs(resolved)
                .produces(lowered)
                .granularity(Granularity::Method)
                .build(),
            move |cx| {
                assert!(cx.tags().has(resolved)?);
                if Some(cx.item().label().as_str()) == fail_on {
                    return Err(PassError::recoverable("unsupported opcode"));
                }
                seen.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
        ))?;
    }
    {
        let written_by = written_by.clone();
        registry.register(FnSchedulable::new(
            Descriptor::builder("write")
                .needs(lowered)
                .produces(written)
                .exclusive()
                .build(),
            move |cx| {
                assert!(cx.exclusive_guard().is_some());
                written_by.lock().unwrap().push(cx.item().label());
                Ok(())
            },
        ))?;
    }

    Ok(Pipeline {
        registry: registry.validate()?,
        resolved,
        lowered,
        written,
        methods_seen,
        written_by,
    })
}

fn roots(labels: &[&str]) -> Vec<WorkItem> {
    labels
        .iter()
        .map(|label| WorkItem::new(Node::program(label, 3, 4), TagSet::new()))
        .collect()
}

#[test]
fn test_pipeline_runs_every_unit() -> Result<()> {
    init_logging();
    let p = pipeline(None)?;
    let plan = p.registry.plan(&PlanRequest::new().target(p.written))?;
    assert_eq!(plan.names(), vec!["resolve", "lower", "write"]);

    let executor = PlanExecutor::new(ExecutorConfig::validated().with_worker_threads(4))?;
    let report = executor.execute(&plan, roots(&["app", "lib"]))?;

    assert!(report.is_success());
    assert_eq!(p.methods_seen.load(Ordering::SeqCst), 2 * 3 * 4);
    let units: Vec<usize> = report.stages.iter().map(|s| s.units).collect();
    assert_eq!(units, vec![2, 24, 2]);
    assert_eq!(
        *p.written_by.lock().unwrap(),
        vec!["app".to_string(), "lib".to_string()]
    );
    for item in &report.items {
        assert!(item.tags.contains(p.resolved));
        assert!(item.tags.contains(p.lowered));
        assert!(item.tags.contains(p.written));
    }
    assert_eq!(report.events.count_kind(EventKind::StageStarted), 3);
    assert_eq!(report.events.count_kind(EventKind::StageCompleted), 3);
    Ok(())
}

#[test]
fn test_method_failure_spares_healthy_items() -> Result<()> {
    init_logging();
    let p = pipeline(Some("lib.T1.m2"))?;
    let plan = p.registry.plan(&PlanRequest::new().target(p.written))?;

    let executor = PlanExecutor::new(ExecutorConfig::validated())?;
    let report = executor.execute(&plan, roots(&["app", "lib"]))?;

    // Every other method of `lib` is still lowered
    assert_eq!(p.methods_seen.load(Ordering::SeqCst), 2 * 3 * 4 - 1);
    assert_eq!(report.stages[1].failures, 1);

    // `lib` as a whole never became `lowered`, so it cannot be written
    assert_eq!(*p.written_by.lock().unwrap(), vec!["app".to_string()]);
    assert_eq!(report.completed(), 1);
    let lib = report.item("lib").unwrap();
    let failure = lib.outcome.failure().unwrap();
    assert_eq!(failure.schedulable, "write");
    assert_eq!(failure.stage, 2);
    assert_eq!(
        failure.withheld,
        Some(WithheldStage {
            stage: 1,
            schedulable: "lower".to_string(),
        })
    );
    assert!(lib.tags.contains(p.resolved));
    assert!(!lib.tags.contains(p.lowered));

    assert_eq!(lib.enclosed.len(), 1);
    assert_eq!(lib.enclosed[0].schedulable, "lower");
    assert_eq!(lib.enclosed[0].unit, "lib.T1.m2");
    assert_eq!(lib.enclosed[0].stage, 1);

    let failed: Vec<_> = report.events.failures().collect();
    assert_eq!(failed.len(), 2);
    assert!(report.summary().contains("1 failed"));
    Ok(())
}

#[test]
fn test_type_stage_runs_on_healthy_types() -> Result<()> {
    let mut catalog = Catalog::new();
    let lowered = catalog.tag("lowered")?;
    let emitted = catalog.tag("emitted")?;
    let emitted_on = Arc::new(Mutex::new(Vec::new()));

    let mut registry = Registry::new(Arc::new(catalog));
    registry.register(FnSchedulable::new(
        Descriptor::builder("lower")
            .produces(lowered)
            .granularity(Granularity::Method)
            .build(),
        |cx| {
            if cx.item().label() == "app.T0.m0" {
                return Err(PassError::recoverable("unsupported opcode"));
            }
            Ok(())
        },
    ))?;
    {
        let emitted_on = emitted_on.clone();
        registry.register(FnSchedulable::new(
            Descriptor::builder("emit")
                .needs(lowered)
                .produces(emitted)
                .granularity(Granularity::Type)
                .build(),
            move |cx| {
                emitted_on.lock().unwrap().push(cx.item().label());
                Ok(())
            },
        ))?;
    }
    let plan = registry
        .validate()?
        .plan(&PlanRequest::new().target(emitted))?;

    let report = PlanExecutor::new(ExecutorConfig::validated())?.execute(
        &plan,
        vec![WorkItem::new(Node::program("app", 2, 1), TagSet::new())],
    )?;

    assert_eq!(*emitted_on.lock().unwrap(), vec!["app.T1".to_string()]);
    let app = &report.items[0];
    let units: Vec<_> = app.failures().map(|f| f.unit.as_str()).collect();
    assert_eq!(units, ["app.T0", "app.T0.m0"]);
    assert!(!app.tags.contains(emitted));
    Ok(())
}

#[test]
fn test_fail_fast_aborts_execution() -> Result<()> {
    let p = pipeline(Some("app.T0.m0"))?;
    let plan = p.registry.plan(&PlanRequest::new().target(p.written))?;

    let executor = PlanExecutor::new(ExecutorConfig::fail_fast())?;
    let err = executor
        .execute(&plan, roots(&["app", "lib"]))
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Item);
    match err {
        Error::Aborted {
            stage,
            schedulable,
            item,
            source,
        } => {
            assert_eq!(stage, 1);
            assert_eq!(schedulable, "lower");
            assert_eq!(item, "app.T0.m0");
            assert!(source.is_fatal());
        }
        other => panic!("expected an aborted execution, got {other:?}"),
    }
    assert!(p.written_by.lock().unwrap().is_empty());
    Ok(())
}

#[test]
fn test_missing_precondition_is_a_violation() -> Result<()> {
    let p = pipeline(None)?;
    let plan = p.registry.plan(&PlanRequest::new().target(p.written).initial(p.resolved))?;
    assert_eq!(plan.names(), vec!["lower", "write"]);

    // The plan assumes `resolved` holds, the item does not carry it
    let err = PlanExecutor::new(ExecutorConfig::validated())?
        .execute(&plan, roots(&["app"]))
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Contract);
    assert!(err
        .to_string()
        .starts_with("Contract violation: schedulable `lower` attempted to require tag `resolved`"));

    let mut initial = TagSet::new();
    initial.insert(p.resolved);
    let report = PlanExecutor::new(ExecutorConfig::validated())?.execute(
        &plan,
        vec![WorkItem::new(Node::program("app", 1, 1), initial)],
    )?;
    assert!(report.is_success());
    Ok(())
}

#[test]
fn test_finer_roots_skip_coarser_stages() -> Result<()> {
    let p = pipeline(None)?;
    let plan = p.registry.plan(&PlanRequest::new().target(p.lowered))?;

    let method = Node::leaf("lonely".to_string(), Granularity::Method);
    let mut initial = TagSet::new();
    initial.insert(p.resolved);
    let report = PlanExecutor::new(ExecutorConfig::validated())?
        .execute(&plan, vec![WorkItem::new(method, initial)])?;

    assert_eq!(report.stages[0].units, 0);
    assert_eq!(report.stages[1].units, 1);
    assert!(report.items[0].tags.contains(p.lowered));
    Ok(())
}

#[test]
fn test_finer_root_missing_a_producer_fails_alone() -> Result<()> {
    let mut catalog = Catalog::new();
    let resolved = catalog.tag("resolved")?;
    let lowered = catalog.tag("lowered")?;
    let mut registry = Registry::new(Arc::new(catalog));
    registry.register(FnSchedulable::noop(
        Descriptor::builder("resolve")
            .produces(resolved)
            .granularity(Granularity::Type)
            .build(),
    ))?;
    registry.register(FnSchedulable::noop(
        Descriptor::builder("lower")
            .needs(resolved)
            .produces(lowered)
            .granularity(Granularity::Method)
            .build(),
    ))?;
    let plan = registry
        .validate()?
        .plan(&PlanRequest::new().target(lowered))?;

    for config in [
        ExecutorConfig::validated(),
        ExecutorConfig::sequential().with_validation(false),
    ] {
        let ty = Node::branch(
            "T".to_string(),
            Granularity::Type,
            vec![Node::leaf("T.m".to_string(), Granularity::Method)],
        );
        let lonely = Node::leaf("lonely".to_string(), Granularity::Method);
        let report = PlanExecutor::new(config)?.execute(
            &plan,
            vec![
                WorkItem::new(ty, TagSet::new()),
                WorkItem::new(lonely, TagSet::new()),
            ],
        )?;

        let ty = report.item("T").unwrap();
        assert!(ty.is_clean());
        assert!(ty.tags.contains(resolved) && ty.tags.contains(lowered));

        let lonely = report.item("lonely").unwrap();
        let failure = lonely.outcome.failure().unwrap();
        assert_eq!(failure.schedulable, "lower");
        assert_eq!(failure.stage, 1);
        assert_eq!(
            failure.withheld,
            Some(WithheldStage {
                stage: 0,
                schedulable: "resolve".to_string(),
            })
        );
        assert!(!failure.error.is_fatal());
        assert!(lonely.tags.is_empty());
        assert_eq!(report.completed(), 1);
    }
    Ok(())
}

#[test]
fn test_caller_guard_blocks_stages() -> Result<()> {
    let p = pipeline(None)?;
    let plan = p.registry.plan(&PlanRequest::new().target(p.written))?;
    let barrier = StageBarrier::new();
    let executor = PlanExecutor::with_barrier(ExecutorConfig::default(), barrier.clone())?;

    let guard = barrier.exclusive();
    let started = Arc::new(AtomicUsize::new(0));
    std::thread::scope(|scope| {
        let handle = scope.spawn(|| {
            let result = executor.execute(&plan, roots(&["app"]));
            started.fetch_add(1, Ordering::SeqCst);
            result
        });
        std::thread::sleep(std::time::Duration::from_millis(20));
        assert_eq!(started.load(Ordering::SeqCst), 0);
        drop(guard);
        handle.join().unwrap()
    })?;
    assert_eq!(started.load(Ordering::SeqCst), 1);
    Ok(())
}
