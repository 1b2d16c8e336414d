use std::fs;
use std::path::PathBuf;

use propsheet::construct::{Document, GLOBAL_SCOPE};
use propsheet::datatype::{SemanticType, Value};
use propsheet::evaluate::Engine;
use propsheet::persist::{self, SNAPSHOT_VERSION, Snapshot};
use propsheet::transforms::TransformName;

fn scratch_file(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("propsheet-{}-{}.json", std::process::id(), name))
}

fn setup() -> Document {
    let document = Document::with_defaults();
    let stars = document.create_property(GLOBAL_SCOPE, "stars", SemanticType::Number, Value::from(2.0));
    document.add_transform(&stars, TransformName::Add).unwrap();
    let amount = document.create_variable(GLOBAL_SCOPE, "Amount", SemanticType::Number, Value::from(5.0));
    let linked = document.create_property(GLOBAL_SCOPE, "linked", SemanticType::Number, Value::from(0.0));
    document.set_initial_variable(&linked, Some(amount)).unwrap();
    document.select(Some(stars));
    document
}

#[test]
fn snapshots_round_trip_through_disk() {
    let document = setup();
    let path = scratch_file("roundtrip");
    persist::save(&document, &path).expect("saves");

    let restored = persist::load(&path).expect("loads");
    fs::remove_file(&path).ok();

    assert_eq!(restored.selection(), document.selection());
    let originals = document.properties_in(GLOBAL_SCOPE);
    let engine = Engine::new(&document);
    let restored_engine = Engine::new(&restored);
    for (original, returned) in originals.iter().zip(restored.properties_in(GLOBAL_SCOPE)) {
        assert_eq!(original.id, returned.id);
        assert_eq!(original.name, returned.name);
        let reference = propsheet::construct::ScopedReference::property(&original.scope, original.id);
        assert_eq!(
            engine.evaluate(&reference).unwrap(),
            restored_engine.evaluate(&reference).unwrap(),
            "{} evaluates identically after the round trip",
            original.name
        );
    }
}

#[test]
fn restored_transforms_are_rebound_to_live_functions() {
    let document = setup();
    let snapshot = Snapshot::take(&document);
    let restored = snapshot.restore().expect("restores");

    let stars = restored
        .properties_in(GLOBAL_SCOPE)
        .into_iter()
        .find(|p| p.name == "stars")
        .expect("persisted");
    let reference = propsheet::construct::ScopedReference::property(&stars.scope, stars.id);
    // 2 + 10 only works if Add was re-bound by name
    let value = Engine::new(&restored).evaluate(&reference).unwrap();
    assert_eq!(value, Value::Number(12.0));
}

#[test]
fn restored_documents_never_reissue_persisted_ids() {
    let document = setup();
    let restored = Snapshot::take(&document).restore().expect("restores");

    let highest = document.properties_in(GLOBAL_SCOPE).iter().map(|p| p.id).max().unwrap();
    let fresh = restored.create_property(GLOBAL_SCOPE, "fresh", SemanticType::Text, Value::from(""));
    assert!(fresh.id > highest, "fresh ids start above every persisted id");
}

#[test]
fn version_mismatch_discards_the_snapshot() {
    let document = setup();
    let mut snapshot = Snapshot::take(&document);
    snapshot.version = SNAPSHOT_VERSION + 1;
    assert!(snapshot.restore().is_err(), "no partial or migrated load");
}

#[test]
fn unknown_transform_names_are_rejected_at_load() {
    let document = setup();
    let path = scratch_file("corrupt");
    persist::save(&document, &path).expect("saves");
    let json = fs::read_to_string(&path).unwrap().replace("\"Add\"", "\"Frobnicate\"");
    fs::write(&path, json).unwrap();

    assert!(persist::load(&path).is_err());
    fs::remove_file(&path).ok();
}

#[test]
fn variable_links_survive_the_round_trip() {
    let document = setup();
    let restored = Snapshot::take(&document).restore().expect("restores");

    let linked = restored
        .properties_in(GLOBAL_SCOPE)
        .into_iter()
        .find(|p| p.name == "linked")
        .expect("persisted");
    assert!(linked.initial.variable.is_some());
    let reference = propsheet::construct::ScopedReference::property(&linked.scope, linked.id);
    assert_eq!(Engine::new(&restored).evaluate(&reference).unwrap(), Value::Number(5.0));

    let amount = restored
        .variables_in(GLOBAL_SCOPE)
        .into_iter()
        .find(|v| v.name == "Amount")
        .expect("persisted");
    assert!(amount.assignments.contains_key(&linked.id), "back-references persisted");
}
