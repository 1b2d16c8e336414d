use propsheet::construct::{Argument, Document, ErrorKind, GLOBAL_SCOPE, ScopedReference};
use propsheet::datatype::{SemanticType, Value};
use propsheet::evaluate::Engine;
use propsheet::transforms::TransformName;

fn setup() -> Document {
    Document::new()
}

#[test]
fn linked_initial_resolves_through_the_variable() {
    let document = setup();
    let name = document.create_variable(GLOBAL_SCOPE, "Name", SemanticType::Text, Value::from("Miranda"));
    let greeting = document.create_property(GLOBAL_SCOPE, "Greeting", SemanticType::Text, Value::from(""));
    document.set_initial_variable(&greeting, Some(name.clone())).unwrap();

    let value = Engine::new(&document).evaluate(&greeting).unwrap();
    assert_eq!(value, Value::from("Miranda"));

    let variable = document.variable(&name).unwrap();
    assert!(variable.assignments.contains_key(&greeting.id), "back-reference registered");
}

#[test]
fn deleting_a_variable_detaches_its_assignees() {
    let document = setup();
    let name = document.create_variable(GLOBAL_SCOPE, "Name", SemanticType::Text, Value::from("Miranda"));
    let greeting = document.create_property(GLOBAL_SCOPE, "Greeting", SemanticType::Text, Value::from(""));
    document.set_initial_variable(&greeting, Some(name.clone())).unwrap();

    document.delete_variable(&name).unwrap();

    let greeting = document.property(&greeting).unwrap();
    assert!(greeting.initial.variable.is_none(), "reference cleared");
    assert_eq!(greeting.initial.values.text, "Miranda", "last value snapshotted");
    assert!(document.variable(&name).is_err(), "variable is gone");
    assert!(document.variables_in(GLOBAL_SCOPE).is_empty());
}

#[test]
fn detaching_snapshots_the_transformed_value_and_type() {
    // the variable's chain turns its text into a number; a detached assignee
    // keeps that number as its own literal
    let document = setup();
    let length = document.create_variable(GLOBAL_SCOPE, "Length", SemanticType::Text, Value::from("Miranda"));
    document.add_transform(&length, TransformName::Length).unwrap();
    let assignee = document.create_property(GLOBAL_SCOPE, "Letters", SemanticType::Number, Value::from(0.0));
    document.set_initial_variable(&assignee, Some(length.clone())).unwrap();

    document.detach_variable(&assignee).unwrap();

    let assignee_state = document.property(&assignee).unwrap();
    assert!(assignee_state.initial.variable.is_none());
    assert_eq!(assignee_state.initial.semantic_type, SemanticType::Number);
    assert_eq!(assignee_state.initial.values.number, 7.0);
    let variable = document.variable(&length).unwrap();
    assert!(variable.assignments.is_empty(), "back-reference dropped");
}

#[test]
fn relinking_moves_the_back_reference() {
    let document = setup();
    let first = document.create_variable(GLOBAL_SCOPE, "First", SemanticType::Text, Value::from("a"));
    let second = document.create_variable(GLOBAL_SCOPE, "Second", SemanticType::Text, Value::from("b"));
    let target = document.create_property(GLOBAL_SCOPE, "Target", SemanticType::Text, Value::from(""));

    document.set_initial_variable(&target, Some(first.clone())).unwrap();
    document.set_initial_variable(&target, Some(second.clone())).unwrap();

    assert!(document.variable(&first).unwrap().assignments.is_empty(), "old link unregistered");
    assert!(document.variable(&second).unwrap().assignments.contains_key(&target.id));

    document.set_initial_variable(&target, None).unwrap();
    assert!(document.variable(&second).unwrap().assignments.is_empty(), "cleared link unregistered");
}

#[test]
fn mutual_references_terminate_with_a_loop_error() {
    let document = setup();
    let a = document.create_variable(GLOBAL_SCOPE, "A", SemanticType::Text, Value::from("alpha"));
    let b = document.create_variable(GLOBAL_SCOPE, "B", SemanticType::Text, Value::from("beta"));
    document.set_initial_variable(&a, Some(b.clone())).unwrap();
    document.set_initial_variable(&b, Some(a.clone())).unwrap();

    let engine = Engine::new(&document);
    let value = engine.evaluate(&a).unwrap();
    assert_eq!(value, Value::from("alpha"), "falls back to its own literal");
    let state = document.variable(&a).unwrap();
    let error = state.error.expect("loop reported");
    assert_eq!(error.kind, ErrorKind::ReferenceLoop);
    assert_eq!(error.index, -1);

    // evaluating the other end reports the loop there as well
    let value = engine.evaluate(&b).unwrap();
    assert_eq!(value, Value::from("beta"));
    assert_eq!(document.variable(&b).unwrap().error.expect("loop reported").kind, ErrorKind::ReferenceLoop);
}

#[test]
fn self_reference_terminates_with_a_loop_error() {
    let document = setup();
    let narcissus = document.create_variable(GLOBAL_SCOPE, "N", SemanticType::Number, Value::from(1.0));
    document.set_initial_variable(&narcissus, Some(narcissus.clone())).unwrap();

    let value = Engine::new(&document).evaluate(&narcissus).unwrap();
    assert_eq!(value, Value::Number(1.0));
    assert_eq!(
        document.variable(&narcissus).unwrap().error.expect("loop reported").kind,
        ErrorKind::ReferenceLoop
    );
}

#[test]
fn cycles_through_transform_arguments_are_caught() {
    // a variable whose own transform argument points back at it: the
    // argument reports the loop and falls back, the variable still evaluates
    let document = setup();
    let counter = document.create_variable(GLOBAL_SCOPE, "Counter", SemanticType::Number, Value::from(1.0));
    document.add_transform(&counter, TransformName::Add).unwrap();
    let amount = {
        let state = document.variable(&counter).unwrap();
        match &state.transforms[0].args[0] {
            Argument::Property(reference) => reference.clone(),
            Argument::Enumerated(_) => panic!("expected a property argument"),
        }
    };
    document.set_initial_variable(&amount, Some(counter.clone())).unwrap();

    let value = Engine::new(&document).evaluate(&counter).unwrap();
    // the argument fell back to its default literal of 10
    assert_eq!(value, Value::Number(11.0));
    let argument = document.property(&amount).unwrap();
    assert_eq!(argument.error.expect("loop reported on the argument").kind, ErrorKind::ReferenceLoop);
    assert!(document.variable(&counter).unwrap().error.is_none(), "the owner itself is clean");
}
