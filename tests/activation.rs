mod common;

use std::sync::{Arc, OnceLock};

use common::{Blank, blank, registry, scene, types};
use conduct_runtime::prelude::*;
use proptest::prelude::*;

struct Holder {
    props: Props,
    sibling: UnitId,
}
impl Behavior for Holder {}

fn holder_registry() -> Registry {
    let registry = registry();
    registry.register(blank("A", &[])).unwrap();
    registry
        .register(
            TypeDef::new("Holder", |deps| {
                Ok(Box::new(Holder {
                    props: deps.props(0)?,
                    sibling: deps.unit(1)?.id().clone(),
                }))
            })
            .depends_on([PROPS, "A"]),
        )
        .unwrap();
    registry
}

fn abc_registry() -> Registry {
    let registry = registry();
    registry.register(blank("A", &[])).unwrap();
    registry.register(blank("B", &["A"])).unwrap();
    registry.register(blank("C", &["A", "B"])).unwrap();
    registry
}

#[test]
fn attaching_twice_keeps_one_pending_slot() {
    let registry = registry();
    registry.register(blank("D", &["Z"])).unwrap();
    let (manager, root) = scene(registry);
    let root_id = root.id().as_str();

    let first = manager.attach("D", root_id).unwrap();
    let second = manager.attach("D", root_id).unwrap();
    assert!(!first.is_noop());
    assert!(second.is_noop());
    assert_eq!(manager.pending(root_id), vec![TypeName::from("D")]);

    // The no-op trigger does nothing, not even store props.
    let report = second.fire_with(Props::new().with("ignored", true)).unwrap();
    assert!(report.activated.is_empty());
    assert_eq!(manager.pending(root_id).len(), 1);
}

#[test]
fn attaching_an_active_type_again_is_a_noop() {
    let registry = registry();
    registry.register(blank("A", &[])).unwrap();
    let (manager, root) = scene(registry);
    let root_id = root.id().as_str();

    manager.attach("A", root_id).unwrap().activate().unwrap();
    let existing = manager.get("A", root_id).unwrap();

    assert!(manager.attach("A", root_id).unwrap().is_noop());
    assert_eq!(manager.children(root_id).len(), 1);
    assert_eq!(manager.get("A", root_id).unwrap().id(), existing.id());
}

#[test]
fn dependents_wait_for_their_siblings() {
    let (manager, root) = scene(abc_registry());
    let root_id = root.id().as_str();

    let report = manager.attach("C", root_id).unwrap().activate().unwrap();
    assert!(report.activated.is_empty());
    let report = manager.attach("B", root_id).unwrap().activate().unwrap();
    assert!(report.activated.is_empty());
    assert!(manager.get("B", root_id).is_none());

    let report = manager.attach("A", root_id).unwrap().activate().unwrap();
    assert!(report.is_clean());
    assert_eq!(report.activated.len(), 3);
    assert_eq!(types(&manager.children(root_id)), ["A", "B", "C"]);
    assert!(manager.pending(root_id).is_empty());
}

proptest! {
    #[test]
    fn any_attach_and_fire_order_activates_everything(
        attach_order in Just(vec!["A", "B", "C"]).prop_shuffle(),
        fire_order in Just(vec![0usize, 1, 2]).prop_shuffle(),
        interleave in any::<bool>(),
    ) {
        let (manager, root) = scene(abc_registry());
        let root_id = root.id().as_str();

        if interleave {
            for type_name in &attach_order {
                manager.attach(type_name, root_id).unwrap().activate().unwrap();
            }
        } else {
            let triggers: Vec<Trigger> = attach_order
                .iter()
                .map(|t| manager.attach(t, root_id).unwrap())
                .collect();
            for i in fire_order {
                triggers[i].activate().unwrap();
            }
        }

        for type_name in ["A", "B", "C"] {
            let unit = manager.get(type_name, root_id);
            prop_assert!(unit.is_some_and(|u| u.is_active()), "{} not active", type_name);
        }
        prop_assert!(manager.pending(root_id).is_empty());
        prop_assert_eq!(manager.len(), 4);
    }
}

#[test]
fn missing_dependency_stalls_quietly() {
    let registry = registry();
    registry.register(blank("D", &["Z"])).unwrap();
    registry.register(blank("Z", &[])).unwrap();
    let (manager, root) = scene(registry);
    let root_id = root.id().as_str();

    let report = manager.attach("D", root_id).unwrap().activate().unwrap();
    assert!(report.is_clean());
    assert!(report.activated.is_empty());
    assert!(manager.get("D", root_id).is_none());
    assert_eq!(
        manager.stalled(),
        vec![StalledChild {
            parent: root.id().clone(),
            type_name: "D".into(),
            missing: vec!["Z".into()],
        }]
    );
}

#[test]
fn dependency_cycles_never_activate() {
    let registry = registry();
    registry.register(blank("X", &["Y"])).unwrap();
    registry.register(blank("Y", &["X"])).unwrap();
    registry.register(blank("Free", &[])).unwrap();
    let (manager, root) = scene(registry);
    let root_id = root.id().as_str();

    let x = manager.attach("X", root_id).unwrap();
    let y = manager.attach("Y", root_id).unwrap();
    assert!(x.activate().unwrap().is_clean());
    assert!(y.activate().unwrap().is_clean());
    manager.attach("Free", root_id).unwrap().activate().unwrap();

    assert_eq!(types(&manager.children(root_id)), ["Free"]);
    assert_eq!(manager.pending(root_id).len(), 2);
    assert_eq!(manager.stalled().len(), 2);
}

#[test]
fn props_and_siblings_arrive_in_declared_order() {
    let (manager, root) = scene(holder_registry());
    let root_id = root.id().as_str();

    let holder = manager.attach("Holder", root_id).unwrap();
    holder.fire_with(Props::new().with("v", 1)).unwrap();
    holder.fire_with(Props::new().with("v", 2)).unwrap();
    assert!(manager.get("Holder", root_id).is_none());

    manager.attach("A", root_id).unwrap().activate().unwrap();

    let unit = manager.get("Holder", root_id).unwrap();
    let payload = unit.behavior::<Holder>().unwrap();
    assert_eq!(payload.props.get_as::<i32>("v").unwrap(), 2);
    assert_eq!(payload.props.parent_id(), Some(root_id));
    assert_eq!(&payload.sibling, manager.get("A", root_id).unwrap().id());
}

#[test]
fn unsupplied_props_resolve_to_an_empty_bag() {
    let (manager, root) = scene(holder_registry());
    let root_id = root.id().as_str();

    // Reserved but never fired; A's activation run builds it anyway.
    let _reserved = manager.attach("Holder", root_id).unwrap();
    manager.attach("A", root_id).unwrap().activate().unwrap();

    let unit = manager.get("Holder", root_id).unwrap();
    let payload = unit.behavior::<Holder>().unwrap();
    assert!(payload.props.is_empty());
    assert_eq!(payload.props.parent_id(), None);
}

struct Spawner;
impl Behavior for Spawner {
    fn on_awake(&self, ctx: &UnitContext<'_>) {
        // Reserved only; the running activation picks it up.
        let _ = ctx.attach("Leaf");
    }
}

struct Eager;
impl Behavior for Eager {
    fn on_awake(&self, ctx: &UnitContext<'_>) {
        let attached = ctx.attach("Leaf").and_then(|t| t.activate());
        assert!(attached.is_ok());
    }
}

#[test]
fn activation_recurses_into_new_units() {
    let registry = registry();
    registry.register(blank("Leaf", &[PROPS])).unwrap();
    registry
        .register(TypeDef::new("Spawner", |_| Ok(Box::new(Spawner))))
        .unwrap();
    let (manager, root) = scene(registry);

    let report = manager
        .attach("Spawner", root.id().as_str())
        .unwrap()
        .activate()
        .unwrap();
    let spawner = manager.get("Spawner", root.id().as_str()).unwrap();
    let leaf = manager.get("Leaf", spawner.id().as_str()).unwrap();
    assert_eq!(report.activated, vec![spawner.id().clone(), leaf.id().clone()]);
    assert_eq!(manager.parent(leaf.id().as_str()).unwrap().id(), spawner.id());
}

#[test]
fn hooks_can_fire_triggers_reentrantly() {
    let registry = registry();
    registry.register(blank("Leaf", &[])).unwrap();
    registry
        .register(TypeDef::new("Eager", |_| Ok(Box::new(Eager))))
        .unwrap();
    let (manager, root) = scene(registry);

    let report = manager
        .attach("Eager", root.id().as_str())
        .unwrap()
        .activate()
        .unwrap();
    let eager = manager.get("Eager", root.id().as_str()).unwrap();
    assert_eq!(report.activated, vec![eager.id().clone()]);
    assert!(manager.get("Leaf", eager.id().as_str()).is_some());
    assert_eq!(manager.len(), 3);
}

struct FlakyIds {
    inner: SequentialIds,
}

impl IdentityService for FlakyIds {
    fn generate_id(&self, type_hint: &str) -> Result<UnitId> {
        if type_hint == "Flaky" {
            return Err(RuntimeError::InvalidState {
                expected: "id".into(),
                found: "outage".into(),
            });
        }
        self.inner.generate_id(type_hint)
    }
}

#[test]
fn identity_failure_only_aborts_the_affected_unit() {
    let registry = registry();
    registry.register(blank("Flaky", &[])).unwrap();
    registry.register(blank("Good", &[])).unwrap();
    let manager = Manager::builder()
        .registry(Arc::new(registry))
        .identity(FlakyIds {
            inner: SequentialIds::new(),
        })
        .build();
    let root = manager.init_root().unwrap();
    let root_id = root.id().as_str();

    let _flaky = manager.attach("Flaky", root_id).unwrap();
    let report = manager.attach("Good", root_id).unwrap().activate().unwrap();

    assert_eq!(report.activated.len(), 1);
    assert_eq!(report.failures.len(), 1);
    assert!(matches!(
        &report.failures[0],
        RuntimeError::IntegrationFailure {
            collaborator: Collaborator::Identity,
            type_name,
            ..
        } if type_name == "Flaky"
    ));
    assert!(manager.get("Good", root_id).is_some());
    assert_eq!(manager.pending(root_id), vec![TypeName::from("Flaky")]);
}

struct BrokenEvents;

impl EventDirectory for BrokenEvents {
    fn registered_events(&self, _type_name: &str) -> Result<Vec<EventDescriptor>> {
        Ok(vec![EventDescriptor::new("tick")])
    }

    fn register_component(&self, _descriptor: &EventDescriptor, _unit: &Arc<Unit>) -> NResult {
        Err(RuntimeError::InvalidState {
            expected: "subscription".into(),
            found: "closed directory".into(),
        })
    }
}

#[test]
fn event_failures_do_not_roll_back_activation() {
    let registry = registry();
    registry.register(blank("A", &[])).unwrap();
    let manager = Manager::builder()
        .registry(Arc::new(registry))
        .events(BrokenEvents)
        .build();
    let root = manager.init_root().unwrap();

    let report = manager
        .attach("A", root.id().as_str())
        .unwrap()
        .activate()
        .unwrap();
    assert_eq!(report.activated.len(), 1);
    assert!(matches!(
        report.failures.as_slice(),
        [RuntimeError::IntegrationFailure {
            collaborator: Collaborator::Events,
            ..
        }]
    ));
    assert!(manager.get("A", root.id().as_str()).unwrap().is_active());
}

#[test]
fn activated_units_join_their_declared_events() {
    let registry = registry();
    registry.register(blank("A", &[])).unwrap();
    let events = Arc::new(InMemoryEvents::new());
    let tick = EventDescriptor::new("tick");
    events.declare("A", tick.clone());

    let manager = Manager::builder()
        .registry(Arc::new(registry))
        .events(events.clone())
        .build();
    let root = manager.init_root().unwrap();
    manager
        .attach("A", root.id().as_str())
        .unwrap()
        .activate()
        .unwrap();

    let a = manager.get("A", root.id().as_str()).unwrap();
    assert_eq!(events.subscribers(&tick), vec![a.id().clone()]);

    manager.destroy(a.id().as_str()).unwrap();
    assert!(events.subscribers(&tick).is_empty());
}

#[test]
fn factory_errors_leave_the_slot_pending() {
    let registry = registry();
    registry
        .register(
            TypeDef::new("Strict", |deps| {
                deps.props(0)?.get_as::<u32>("size")?;
                Ok(Box::new(Blank))
            })
            .depends_on([PROPS]),
        )
        .unwrap();
    let (manager, root) = scene(registry);
    let root_id = root.id().as_str();

    let trigger = manager.attach("Strict", root_id).unwrap();
    let report = trigger.activate().unwrap();
    assert!(matches!(
        report.failures.as_slice(),
        [RuntimeError::FactoryFailed { .. }]
    ));
    assert_eq!(manager.pending(root_id).len(), 1);

    let report = trigger.fire_with(Props::new().with("size", 3)).unwrap();
    assert!(report.is_clean());
    assert!(manager.get("Strict", root_id).is_some());
}

#[test]
fn attach_needs_a_known_parent_and_type() {
    let registry = registry();
    registry.register(blank("A", &[])).unwrap();
    let (manager, root) = scene(registry);

    assert!(matches!(
        manager.attach("A", "Nowhere-9"),
        Err(RuntimeError::UnknownParent { .. })
    ));
    assert!(matches!(
        manager.attach("Ghost", root.id().as_str()),
        Err(RuntimeError::UnknownType { .. })
    ));
    // A bad parent is reported before a bad type.
    assert!(matches!(
        manager.attach("Ghost", "Nowhere-9"),
        Err(RuntimeError::UnknownParent { .. })
    ));
}

#[test]
fn firing_after_the_parent_is_gone_fails() {
    let registry = registry();
    registry.register(blank("Host", &[])).unwrap();
    registry.register(blank("Guest", &[])).unwrap();
    let (manager, root) = scene(registry);

    manager
        .attach("Host", root.id().as_str())
        .unwrap()
        .activate()
        .unwrap();
    let host = manager.get("Host", root.id().as_str()).unwrap();
    let guest = manager.attach("Guest", host.id().as_str()).unwrap();
    manager.destroy(host.id().as_str()).unwrap();

    assert!(matches!(
        guest.activate(),
        Err(RuntimeError::UnknownParent { .. })
    ));
}

#[test]
fn roots_follow_config_and_only_take_props() {
    let registry = registry();
    registry.register(blank("World", &[PROPS])).unwrap();
    registry.register(blank("Needy", &["World"])).unwrap();
    let manager = Manager::builder()
        .registry(Arc::new(registry))
        .config(RuntimeConfig::default().with_root_type("World"))
        .build();

    let root = manager.init_root().unwrap();
    assert_eq!(root.type_name(), "World");
    assert!(manager.parent(root.id().as_str()).is_none());
    assert!(matches!(
        manager.init_root_as("Needy"),
        Err(RuntimeError::InvalidArgument { .. })
    ));
    assert!(matches!(
        manager.init_root_as("Missing"),
        Err(RuntimeError::UnknownType { .. })
    ));

    let second = manager.init_root_as("Scene").unwrap();
    assert_ne!(root.id(), second.id());
    assert_eq!(manager.len(), 2);
}

#[test]
fn read_operations_tolerate_unknown_ids() {
    let (manager, root) = scene(registry());

    assert!(manager.get("A", "Nowhere-9").is_none());
    assert!(manager.get("Unregistered", root.id().as_str()).is_none());
    assert!(manager.children("Nowhere-9").is_empty());
    assert!(manager.parent("Nowhere-9").is_none());
    assert!(manager.find("Nowhere-9").is_none());
    assert!(manager.pending("Nowhere-9").is_empty());
    assert!(manager.find(root.id().as_str()).is_some());
}

#[test]
fn root_event_failures_do_not_block_the_root() {
    let manager = Manager::builder()
        .registry(Arc::new(registry()))
        .events(BrokenEvents)
        .build();

    let root = manager.init_root().unwrap();
    assert!(root.is_active());
    assert_eq!(manager.find(root.id().as_str()).unwrap().id(), root.id());
}

#[test]
fn units_losing_a_dependency_mid_build_stay_pending() {
    // Set once the manager exists; the factory below reaches it through this.
    let handle: Arc<OnceLock<(Manager, UnitId)>> = Arc::new(OnceLock::new());
    let registry = registry();
    registry.register(blank("A", &[])).unwrap();
    let factory_handle = handle.clone();
    registry
        .register(
            TypeDef::new("B", move |_| {
                if let Some((manager, root)) = factory_handle.get() {
                    if let Some(a) = manager.get("A", root.as_str()) {
                        manager.destroy(a.id().as_str())?;
                    }
                }
                Ok(Box::new(Blank))
            })
            .depends_on(["A"]),
        )
        .unwrap();
    let (manager, root) = scene(registry);
    let root_id = root.id().as_str();
    assert!(handle.set((manager.clone(), root.id().clone())).is_ok());

    manager.attach("A", root_id).unwrap().activate().unwrap();
    let report = manager.attach("B", root_id).unwrap().activate().unwrap();

    assert!(report.activated.is_empty());
    assert!(manager.get("A", root_id).is_none());
    assert!(manager.get("B", root_id).is_none());
    assert_eq!(manager.pending(root_id), vec![TypeName::from("B")]);
    assert_eq!(manager.len(), 1);
}

/// Tears its sibling `Host` down on awake and reserves a `Good` slot in its place.
struct Wrecker;
impl Behavior for Wrecker {
    fn on_awake(&self, ctx: &UnitContext<'_>) {
        let Some(parent) = ctx.parent() else {
            return;
        };
        if let Some(host) = ctx.manager().get("Host", parent.id().as_str()) {
            assert!(ctx.manager().destroy(host.id().as_str()).is_ok());
        }
        let _ = ctx.manager().attach("Good", parent.id().as_str());
    }
}

#[derive(Default)]
struct Nest;
impl Behavior for Nest {
    fn on_awake(&self, ctx: &UnitContext<'_>) {
        let _ = ctx.attach("Flaky");
    }
}

#[test]
fn failed_slots_do_not_shadow_later_attachments() {
    let registry = registry();
    registry.register(TypeDef::of::<Nest>("Host")).unwrap();
    registry.register(blank("Flaky", &[])).unwrap();
    registry.register(blank("Good", &[])).unwrap();
    registry
        .register(TypeDef::new("Wrecker", |_| Ok(Box::new(Wrecker))).depends_on(["Host"]))
        .unwrap();
    let manager = Manager::builder()
        .registry(Arc::new(registry))
        .identity(FlakyIds {
            inner: SequentialIds::new(),
        })
        .build();
    let root = manager.init_root().unwrap();
    let root_id = root.id().as_str();

    // One run: Host builds and its Flaky child fails, then Wrecker removes
    // Host and reserves Good, whose node can reuse Flaky's freed slot.
    let _host = manager.attach("Host", root_id).unwrap();
    let report = manager.attach("Wrecker", root_id).unwrap().activate().unwrap();

    assert_eq!(report.failures.len(), 1);
    assert!(manager.get("Host", root_id).is_none());
    assert!(manager.get("Wrecker", root_id).is_some());
    assert!(manager.get("Good", root_id).is_some());
    assert!(manager.pending(root_id).is_empty());
}
