// SPDX-FileCopyrightText: 2026 Rescon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Container integration tests driven through scripted bundles.

use std::sync::Arc;
use std::time::{Duration, Instant};

use rescon_bundle::{BundleContext, ManagedActivator, ManagedBridge};
use rescon_container::BindingState;
use rescon_core::{
    Attributes, BundleKind, BundleState, ContainerError, EntryPointKind, InputBinding, Params,
    QueryParams, ResourceDescriptor, StatusCode,
};
use rescon_test_utils::{Behavior, MockBundle, MockResource, TestHarness, attrs};
use serde_json::json;

fn harness(bundles: Vec<(&str, Arc<MockBundle>)>) -> TestHarness {
    let mut builder = TestHarness::builder();
    for (path, bundle) in bundles {
        builder = builder.with_bundle(path, bundle);
    }
    builder.build().expect("harness should build")
}

async fn eventually(what: &str, mut check: impl FnMut() -> bool) {
    for _ in 0..400 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("timed out waiting for {what}");
}

fn params(pairs: &[(&str, &str)]) -> Params {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn bundle_lifecycle_scenario() {
    let b1 = Arc::new(MockBundle::new(attrs([("temperature", json!(21.5))])));
    let h = harness(vec![("./b1.so", b1.clone())]);
    let c = &h.container;

    c.add_bundle("b1", "./b1.so", "b1::Activator", Params::new())
        .unwrap();
    c.start_bundle("b1").unwrap();
    assert_eq!(b1.activated_with(), ["b1"]);

    c.add_resource("b1", "/res/temp", Params::new()).unwrap();
    assert_eq!(c.list_bundle_resources("b1"), ["/res/temp"]);

    let (attributes, status) = c.handle_get("/res/temp", QueryParams::new()).await;
    assert_eq!(status, StatusCode::Ok);
    assert_eq!(attributes, attrs([("temperature", json!(21.5))]));

    c.remove_bundle("b1").unwrap();
    assert!(c.list_bundle_resources("b1").is_empty());
    assert!(c.list_bundles().unwrap().is_empty());
    assert_eq!(h.loader.unloads(), 1);
    assert!(h.framework.attached_uris().is_empty());
    let (attributes, status) = c.handle_get("/res/temp", QueryParams::new()).await;
    assert_eq!(status, StatusCode::NotFound);
    assert!(attributes.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn add_bundle_twice_is_already_exists() {
    let b1 = Arc::new(MockBundle::new(Attributes::new()));
    let h = harness(vec![("./b1.so", b1)]);

    h.container
        .add_bundle("b1", "./b1.so", "b1::Activator", Params::new())
        .unwrap();
    let err = h
        .container
        .add_bundle("b1", "./b1.so", "b1::Activator", Params::new())
        .unwrap_err();
    assert!(err.is_already_exists());
    assert_eq!(h.container.list_bundles().unwrap().len(), 1);
    assert_eq!(h.loader.loads(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn duplicate_registration_keeps_original_handlers() {
    let b1 = Arc::new(MockBundle::new(Attributes::new()));
    let h = harness(vec![("./b1.so", b1)]);
    let c = &h.container;
    c.add_bundle("b1", "./b1.so", "", Params::new()).unwrap();

    let original = Arc::new(MockResource::new(attrs([("owner", json!("first"))])));
    let impostor = Arc::new(MockResource::new(attrs([("owner", json!("second"))])));
    c.register_resource(
        "b1",
        ResourceDescriptor::new("/light", "oic.r.light", "b1"),
        original.clone(),
    )
    .unwrap();
    let err = c
        .register_resource(
            "b1",
            ResourceDescriptor::new("/light", "oic.r.light", "b1"),
            impostor.clone(),
        )
        .unwrap_err();
    assert!(err.is_already_exists());
    assert_eq!(h.framework.attach_count(), 1);

    let handlers = h.framework.handlers("/light").expect("handlers attached");
    let (attributes, status) = handlers.get(QueryParams::new()).await;
    assert_eq!(status, StatusCode::Ok);
    assert_eq!(attributes["owner"], json!("first"));
    assert_eq!(impostor.get_count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn start_bundle_twice_activates_once() {
    let b1 = Arc::new(MockBundle::new(Attributes::new()));
    let h = harness(vec![("./b1.so", b1.clone())]);
    h.container
        .add_bundle("b1", "./b1.so", "", Params::new())
        .unwrap();

    h.container.start_bundle("b1").unwrap();
    let err = h.container.start_bundle("b1").unwrap_err();
    assert!(matches!(err, ContainerError::InvalidState { .. }));
    assert_eq!(b1.activations(), 1);

    h.container.stop_bundle("b1").unwrap();
    assert!(h.container.stop_bundle("b1").is_err());
    assert!(h.container.start_bundle("missing").unwrap_err().is_not_found());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_starts_activate_once() {
    let b1 = Arc::new(MockBundle::new(Attributes::new()));
    let h = harness(vec![("./b1.so", b1.clone())]);
    h.container
        .add_bundle("b1", "./b1.so", "", Params::new())
        .unwrap();

    let successes = std::thread::scope(|scope| {
        let workers: Vec<_> = (0..8)
            .map(|_| {
                let container = h.container.clone();
                scope.spawn(move || container.start_bundle("b1").is_ok())
            })
            .collect();
        workers
            .into_iter()
            .map(|w| w.join().unwrap_or(false))
            .filter(|ok| *ok)
            .count()
    });
    assert_eq!(successes, 1);
    assert_eq!(b1.activations(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unknown_uri_is_not_found_without_waiting() {
    let h = TestHarness::builder()
        .with_timeout_ms(5_000)
        .build()
        .unwrap();
    let started = Instant::now();
    let (attributes, status) = h
        .container
        .handle_set("/nowhere", QueryParams::new(), attrs([("x", json!(1))]))
        .await;
    assert_eq!(status, StatusCode::NotFound);
    assert_eq!(status.code(), 404);
    assert!(attributes.is_empty());
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn hung_handler_returns_empty_after_timeout() {
    let b1 = Arc::new(MockBundle::new(Attributes::new()));
    let h = TestHarness::builder()
        .with_bundle("./b1.so", b1)
        .with_timeout_ms(200)
        .build()
        .unwrap();
    let c = &h.container;
    c.add_bundle("b1", "./b1.so", "", Params::new()).unwrap();
    let stuck = Arc::new(
        MockResource::new(attrs([("value", json!(1))])).with_behavior(Behavior::HangUntilCancelled),
    );
    c.register_resource(
        "b1",
        ResourceDescriptor::new("/stuck", "oic.r.test", "b1"),
        stuck.clone(),
    )
    .unwrap();

    let started = Instant::now();
    let (attributes, status) = c.handle_get("/stuck", QueryParams::new()).await;
    let elapsed = started.elapsed();
    assert_eq!(status, StatusCode::Ok);
    assert!(attributes.is_empty());
    assert!(elapsed >= Duration::from_millis(200), "{elapsed:?}");
    assert!(elapsed < Duration::from_millis(1_200), "{elapsed:?}");
    assert_eq!(stuck.get_count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failing_and_panicking_handlers_degrade_to_empty_success() {
    let b1 = Arc::new(MockBundle::new(Attributes::new()));
    let h = harness(vec![("./b1.so", b1)]);
    let c = &h.container;
    c.add_bundle("b1", "./b1.so", "", Params::new()).unwrap();

    let failing = Arc::new(
        MockResource::new(attrs([("v", json!(1))])).with_behavior(Behavior::Fail("offline".into())),
    );
    let panicking =
        Arc::new(MockResource::new(attrs([("v", json!(1))])).with_behavior(Behavior::Panic));
    c.register_resource("b1", ResourceDescriptor::new("/fail", "t", "b1"), failing)
        .unwrap();
    c.register_resource("b1", ResourceDescriptor::new("/panic", "t", "b1"), panicking)
        .unwrap();

    for uri in ["/fail", "/panic"] {
        let (attributes, status) = c.handle_get(uri, QueryParams::new()).await;
        assert_eq!(status, StatusCode::Ok, "{uri}");
        assert!(attributes.is_empty(), "{uri}");
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn set_drops_unknown_attributes() {
    let b1 = Arc::new(MockBundle::new(Attributes::new()));
    let h = harness(vec![("./b1.so", b1)]);
    let c = &h.container;
    c.add_bundle("b1", "./b1.so", "", Params::new()).unwrap();
    let lamp = Arc::new(MockResource::new(attrs([
        ("power", json!(false)),
        ("level", json!(0)),
    ])));
    c.register_resource("b1", ResourceDescriptor::new("/lamp", "oic.r.light", "b1"), lamp.clone())
        .unwrap();

    let (attributes, status) = c
        .handle_set(
            "/lamp",
            QueryParams::new(),
            attrs([("power", json!(true)), ("colour", json!("red"))]),
        )
        .await;
    assert_eq!(status, StatusCode::Ok);
    assert_eq!(attributes, attrs([("level", json!(0)), ("power", json!(true))]));
    assert_eq!(lamp.received(), vec![attrs([("power", json!(true))])]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn declared_inputs_create_one_binding_each() {
    let b1 = Arc::new(MockBundle::new(Attributes::new()));
    let h = harness(vec![("./b1.so", b1)]);
    let c = &h.container;
    c.add_bundle("b1", "./b1.so", "", Params::new()).unwrap();

    let inputs = vec![
        InputBinding::new("/thermometer/*", "oic.r.temperature", "temperature"),
        InputBinding::new("/hygrometer/*", "oic.r.humidity", "humidity"),
        InputBinding::new("", "oic.r.wind", "speed"),
    ];
    let soft = Arc::new(MockResource::new(attrs([("discomfort", json!(0))])));
    c.register_resource(
        "b1",
        ResourceDescriptor::new("/soft/di", "oic.r.sensor", "b1").with_inputs(inputs),
        soft,
    )
    .unwrap();
    let plain = Arc::new(MockResource::new(Attributes::new()));
    c.register_resource("b1", ResourceDescriptor::new("/plain", "t", "b1"), plain)
        .unwrap();

    assert_eq!(c.subscription_count(), 1);
    let bindings = c.bindings("/soft/di");
    assert_eq!(bindings.len(), 3);
    assert!(bindings.iter().all(|b| b.state == BindingState::Searching));
    assert!(c.bindings("/plain").is_empty());

    c.unregister_resource("/soft/di").unwrap();
    assert_eq!(c.subscription_count(), 0);
    assert!(c.bindings("/soft/di").is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn racing_register_and_unregister_leave_no_orphan_subscriptions() {
    let b1 = Arc::new(MockBundle::new(Attributes::new()));
    let h = harness(vec![("./b1.so", b1)]);
    let c = &h.container;
    c.add_bundle("b1", "./b1.so", "", Params::new()).unwrap();

    let soft = || {
        ResourceDescriptor::new("/soft", "oic.r.sensor", "b1")
            .with_inputs(vec![InputBinding::new("/x/*", "", "v")])
    };

    for round in 0..300 {
        std::thread::scope(|scope| {
            let registering = c.clone();
            let unregistering = c.clone();
            scope.spawn(move || {
                let _ = registering.register_resource(
                    "b1",
                    soft(),
                    Arc::new(MockResource::new(attrs([("v", json!(0))]))),
                );
            });
            scope.spawn(move || {
                let _ = unregistering.unregister_resource("/soft");
            });
        });

        let registered = c.resource("/soft").is_some();
        assert_eq!(
            c.subscription_count(),
            usize::from(registered),
            "round {round}: subscriptions disagree with the registry"
        );
        if registered {
            assert_eq!(c.bindings("/soft").len(), 1, "round {round}");
            c.unregister_resource("/soft").unwrap();
        }
        assert_eq!(c.subscription_count(), 0, "round {round}");
    }

    c.register_resource(
        "b1",
        soft(),
        Arc::new(MockResource::new(attrs([("v", json!(0))]))),
    )
    .unwrap();
    assert_eq!(c.bindings("/soft").len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn discovered_inputs_flow_into_the_soft_sensor() {
    let b1 = Arc::new(MockBundle::new(Attributes::new()));
    let h = harness(vec![("./b1.so", b1)]);
    let c = &h.container;
    c.add_bundle("b1", "./b1.so", "", Params::new()).unwrap();

    let soft = Arc::new(MockResource::new(attrs([("temperature", json!(null))])));
    c.register_resource(
        "b1",
        ResourceDescriptor::new("/soft/di", "oic.r.sensor", "b1").with_inputs(vec![
            InputBinding::new("/thermometer/*", "oic.r.temperature", "temperature"),
        ]),
        soft.clone(),
    )
    .unwrap();

    // Wrong type: never bound.
    let hygro = Arc::new(MockResource::new(attrs([("temperature", json!(99))])));
    c.register_resource(
        "b1",
        ResourceDescriptor::new("/thermometer/fake", "oic.r.humidity", "b1"),
        hygro,
    )
    .unwrap();

    let thermo = Arc::new(MockResource::new(attrs([
        ("temperature", json!(20)),
        ("unit", json!("C")),
    ])));
    let notifier = c
        .register_resource(
            "b1",
            ResourceDescriptor::new("/thermometer/1", "oic.r.temperature", "b1"),
            thermo.clone(),
        )
        .unwrap();
    thermo.attach_notifier(notifier);

    eventually("binding to /thermometer/1", || {
        c.bindings("/soft/di")[0].bound_uri.as_deref() == Some("/thermometer/1")
    })
    .await;
    eventually("initial value", || {
        soft.received().contains(&attrs([("temperature", json!(20))]))
    })
    .await;

    thermo.publish(attrs([("temperature", json!(25)), ("unit", json!("C"))]));
    eventually("updated value", || {
        soft.attributes()["temperature"] == json!(25)
    })
    .await;
    assert!(
        soft.received()
            .iter()
            .all(|update| update.len() == 1 && update.contains_key("temperature"))
    );
    eventually("observer notification", || {
        h.framework.notifications("/thermometer/1") == 1
    })
    .await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn binding_searches_again_when_its_source_disappears() {
    let b1 = Arc::new(MockBundle::new(Attributes::new()));
    let h = harness(vec![("./b1.so", b1)]);
    let c = &h.container;
    c.add_bundle("b1", "./b1.so", "", Params::new()).unwrap();

    let first = Arc::new(MockResource::new(attrs([("temperature", json!(10))])));
    c.register_resource(
        "b1",
        ResourceDescriptor::new("/thermometer/a", "oic.r.temperature", "b1"),
        first,
    )
    .unwrap();

    let soft = Arc::new(MockResource::new(attrs([("temperature", json!(null))])));
    c.register_resource(
        "b1",
        ResourceDescriptor::new("/soft/x", "oic.r.sensor", "b1").with_inputs(vec![
            InputBinding::new("/thermometer/*", "", "temperature"),
        ]),
        soft.clone(),
    )
    .unwrap();
    eventually("initial bind", || {
        c.bindings("/soft/x")[0].state == BindingState::Bound
    })
    .await;

    c.unregister_resource("/thermometer/a").unwrap();
    eventually("searching", || {
        c.bindings("/soft/x")[0].state == BindingState::Searching
    })
    .await;

    let second = Arc::new(MockResource::new(attrs([("temperature", json!(30))])));
    c.register_resource(
        "b1",
        ResourceDescriptor::new("/thermometer/b", "oic.r.temperature", "b1"),
        second,
    )
    .unwrap();
    eventually("rebind", || {
        c.bindings("/soft/x")[0].bound_uri.as_deref() == Some("/thermometer/b")
    })
    .await;
    eventually("value from new source", || {
        soft.attributes()["temperature"] == json!(30)
    })
    .await;
}

const DESCRIPTORS: &str = r#"
[[bundle]]
id = "di"
path = "./libdi.so"
version = "1.0.0"
activator = "di::Activator"
[bundle.params]
region = "kitchen"

[[bundle.resource]]
uri = "/softsensor/di/1"
name = "DiscomfortIndex"
resource_type = "oic.r.sensor"

[[bundle.resource.input]]
uri = "/thermometer/*"
resource_type = "oic.r.temperature"
attribute_name = "temperature"

[[bundle.resource.input]]
uri = "/hygrometer/*"
resource_type = "oic.r.humidity"
attribute_name = "humidity"

[[bundle]]
id = "thermo"
path = "./libthermo.so"

[[bundle.resource]]
uri = "/thermometer/1"
resource_type = "oic.r.temperature"

[[bundle]]
id = "broken"
path = "./missing.so"
"#;

fn described_harness() -> (TestHarness, Arc<MockBundle>, Arc<MockBundle>) {
    let di = Arc::new(
        MockBundle::new(attrs([
            ("temperature", json!(null)),
            ("humidity", json!(null)),
            ("discomfort", json!(0)),
        ]))
        .creating_configured(),
    );
    let thermo =
        Arc::new(MockBundle::new(attrs([("temperature", json!(21))])).creating_configured());
    let h = TestHarness::builder()
        .with_bundle("./libdi.so", di.clone())
        .with_bundle("./libthermo.so", thermo.clone())
        .with_descriptors(DESCRIPTORS)
        .build()
        .unwrap();
    (h, di, thermo)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn start_activates_described_bundles_in_order() {
    let (h, di, thermo) = described_harness();
    h.start().unwrap();
    let c = &h.container;

    let bundles = c.list_bundles().unwrap();
    let ids: Vec<&str> = bundles.iter().map(|b| b.id()).collect();
    assert_eq!(ids, ["di", "thermo"]);
    assert!(bundles.iter().all(|b| b.state == BundleState::Activated));
    assert_eq!(di.activations(), 1);
    assert_eq!(thermo.activations(), 1);

    assert_eq!(c.bundle_configuration("di")["region"], "kitchen");
    assert_eq!(c.resource_configuration("di").len(), 1);
    assert_eq!(c.list_bundle_resources("thermo"), ["/thermometer/1"]);

    let bindings = c.bindings("/softsensor/di/1");
    assert_eq!(bindings.len(), 2);
    eventually("temperature bound", || {
        c.bindings("/softsensor/di/1")[0].state == BindingState::Bound
    })
    .await;
    assert_eq!(c.bindings("/softsensor/di/1")[1].state, BindingState::Searching);

    thermo.publish("/thermometer/1", attrs([("temperature", json!(30))]));
    let soft = di.resource("/softsensor/di/1").expect("soft sensor created");
    eventually("temperature forwarded", || {
        soft.attributes()["temperature"] == json!(30)
    })
    .await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stop_empties_both_registries_and_is_repeatable() {
    let (h, di, thermo) = described_harness();
    h.start().unwrap();
    let c = &h.container;
    assert_eq!(c.resource_count(), 2);

    c.stop();
    assert!(c.list_bundles().unwrap().is_empty());
    assert_eq!(c.resource_count(), 0);
    assert_eq!(c.subscription_count(), 0);
    assert!(c.resource_configuration("di").is_empty());
    assert_eq!(di.deactivations(), 1);
    assert_eq!(thermo.deactivations(), 1);
    assert_eq!(h.loader.unloads(), 2);
    assert!(h.framework.attached_uris().is_empty());

    c.stop();
    assert!(c.list_bundles().unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stop_evicts_bundles_that_refuse_to_leave() {
    let stubborn = Arc::new(MockBundle::new(attrs([("v", json!(1))])));
    let h = harness(vec![("./s.so", stubborn.clone())]);
    let c = &h.container;
    c.add_bundle("s", "./s.so", "", Params::new()).unwrap();
    c.start_bundle("s").unwrap();
    c.add_resource("s", "/s/1", Params::new()).unwrap();
    stubborn.fail_deactivate(true);
    stubborn.refuse_unload(true);

    assert!(c.remove_bundle("s").is_err());
    assert_eq!(c.bundle("s").unwrap().state, BundleState::Activated);

    c.stop();
    assert!(c.list_bundles().unwrap().is_empty());
    assert_eq!(c.resource_count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn add_resource_maps_params_and_remove_checks_ownership() {
    let b1 = Arc::new(MockBundle::new(attrs([("temperature", json!(0))])));
    let b2 = Arc::new(MockBundle::new(Attributes::new()));
    let h = harness(vec![("./b1.so", b1.clone()), ("./b2.so", b2)]);
    let c = &h.container;
    for (id, path) in [("b1", "./b1.so"), ("b2", "./b2.so")] {
        c.add_bundle(id, path, "", Params::new()).unwrap();
        c.start_bundle(id).unwrap();
    }

    c.add_resource(
        "b1",
        "/res/temp",
        params(&[("resourceType", "oic.r.temperature"), ("name", "Temp"), ("unit", "C")]),
    )
    .unwrap();
    let descriptor = c.resource("/res/temp").unwrap();
    assert_eq!(descriptor.resource_type, "oic.r.temperature");
    assert_eq!(descriptor.name, "Temp");
    assert_eq!(descriptor.bundle_id, "b1");
    assert_eq!(c.resource_configuration("b1")[0].properties["unit"], "C");

    assert!(c.remove_resource("b2", "/res/temp").unwrap_err().is_not_found());
    c.remove_resource("b1", "/res/temp").unwrap();
    assert_eq!(b1.destroys(), 1);
    assert!(c.list_bundle_resources("b1").is_empty());
    assert!(c.resource_configuration("b1").is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn missing_entry_point_is_unsupported() {
    let b1 = Arc::new(MockBundle::new(Attributes::new()).without(EntryPointKind::CreateResource));
    let h = harness(vec![("./b1.so", b1)]);
    let c = &h.container;
    c.add_bundle("b1", "./b1.so", "", Params::new()).unwrap();
    assert!(!c
        .bundle("b1")
        .unwrap()
        .capabilities
        .contains(&EntryPointKind::CreateResource));
    c.start_bundle("b1").unwrap();
    let err = c.add_resource("b1", "/x", Params::new()).unwrap_err();
    assert!(matches!(err, ContainerError::Unsupported { .. }));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failed_activation_leaves_bundle_loaded() {
    let b1 = Arc::new(MockBundle::new(Attributes::new()));
    b1.fail_activate(true);
    let h = harness(vec![("./b1.so", b1.clone())]);
    let c = &h.container;
    c.add_bundle("b1", "./b1.so", "", Params::new()).unwrap();
    assert!(matches!(c.start_bundle("b1"), Err(ContainerError::Plugin(_))));
    assert_eq!(c.bundle("b1").unwrap().state, BundleState::Loaded);

    b1.fail_activate(false);
    c.start_bundle("b1").unwrap();
    assert_eq!(b1.activations(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn library_path_param_marks_managed_layout() {
    let hue = Arc::new(MockBundle::new(Attributes::new()));
    let h = harness(vec![("./hue.so", hue)]);
    let info = h
        .container
        .add_bundle(
            "hue",
            "./hue.so",
            "org.rescon.hue.Activator",
            params(&[("libraryPath", "/opt/hue/lib")]),
        )
        .unwrap();
    assert_eq!(info.descriptor.activator, "org/rescon/hue/Activator");
    assert_eq!(info.descriptor.library_path.as_deref(), Some("/opt/hue/lib"));
    assert_eq!(h.container.bundle_configuration("hue")["libraryPath"], "/opt/hue/lib");
}

#[derive(Default)]
struct RecordingBridge {
    activators: std::sync::Mutex<Vec<String>>,
}

struct Idle;

impl ManagedActivator for Idle {
    fn activate(&self, _ctx: &BundleContext) -> Result<(), ContainerError> {
        Ok(())
    }

    fn deactivate(&self) -> Result<(), ContainerError> {
        Ok(())
    }
}

impl ManagedBridge for RecordingBridge {
    fn instantiate(
        &self,
        descriptor: &rescon_core::BundleDescriptor,
    ) -> Result<Arc<dyn ManagedActivator>, ContainerError> {
        self.activators
            .lock()
            .unwrap()
            .push(descriptor.activator.clone());
        Ok(Arc::new(Idle))
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn managed_activators_reach_the_bridge_in_class_path_form() {
    let bridge = Arc::new(RecordingBridge::default());
    let h = TestHarness::builder()
        .with_managed_bridge(bridge.clone())
        .with_descriptors(
            r#"
[[bundle]]
id = "hue"
path = "./hue.jar"
activator = "org.rescon.hue.Activator"
library_path = "/opt/hue/lib"
"#,
        )
        .build()
        .unwrap();
    h.start().unwrap();
    h.container
        .add_bundle(
            "lamp",
            "./lamp.jar",
            "org.rescon.lamp.Activator",
            params(&[("libraryPath", "/opt/lamp/lib")]),
        )
        .unwrap();

    assert_eq!(
        *bridge.activators.lock().unwrap(),
        ["org/rescon/hue/Activator", "org/rescon/lamp/Activator"]
    );
    let hue = h.container.bundle("hue").unwrap();
    assert_eq!(hue.descriptor.kind, BundleKind::Managed);
    assert_eq!(hue.state, BundleState::Activated);
    assert_eq!(hue.descriptor.library_path.as_deref(), Some("/opt/hue/lib"));
    assert_eq!(
        h.container.bundle("lamp").unwrap().state,
        BundleState::Loaded
    );
    h.container.stop();
    assert!(h.container.list_bundles().unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn external_and_unbridged_bundles_are_only_installed() {
    let h = TestHarness::builder().build().unwrap();
    let c = &h.container;
    let ext = c
        .add_bundle("ext", "./bundle.apk", "", Params::new())
        .unwrap();
    assert_eq!(ext.state, BundleState::Installed);
    let jar = c
        .add_bundle("hue", "./hue.jar", "org.rescon.Hue", Params::new())
        .unwrap();
    assert_eq!(jar.descriptor.kind, BundleKind::External);
    assert!(matches!(
        c.start_bundle("ext"),
        Err(ContainerError::InvalidState { .. })
    ));
    c.remove_bundle("ext").unwrap();
    c.remove_bundle("hue").unwrap();
    assert!(c.list_bundles().unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn load_failure_leaves_no_bundle() {
    let h = TestHarness::builder().build().unwrap();
    let err = h
        .container
        .add_bundle("ghost", "./ghost.so", "", Params::new())
        .unwrap_err();
    assert!(matches!(err, ContainerError::LoadFailure { .. }));
    assert!(h.container.list_bundles().unwrap().is_empty());
}
