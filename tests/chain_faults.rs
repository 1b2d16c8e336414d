use propsheet::construct::{Argument, Document, ErrorKind, GLOBAL_SCOPE, ScopedReference};
use propsheet::datatype::{SemanticType, Value};
use propsheet::evaluate::Engine;
use propsheet::transforms::TransformName;

fn setup() -> Document {
    Document::new()
}

fn property_arg(document: &Document, owner: &ScopedReference, transform: usize, arg: usize) -> ScopedReference {
    let owner = document.property(owner).expect("owner exists");
    match &owner.transforms[transform].args[arg] {
        Argument::Property(reference) => reference.clone(),
        Argument::Enumerated(_) => panic!("expected a property argument"),
    }
}

#[test]
fn division_by_zero_is_captured_and_falls_back() {
    // 10 / 0 is non-finite: error at the transform's index, value falls back
    // to the initial literal
    let document = setup();
    let ratio = document.create_property(GLOBAL_SCOPE, "ratio", SemanticType::Number, Value::from(10.0));
    document.add_transform(&ratio, TransformName::Divide).unwrap();
    let divisor = property_arg(&document, &ratio, 0, 0);
    document.set_initial_value(&divisor, Value::from(0.0)).unwrap();

    let value = Engine::new(&document).evaluate(&ratio).unwrap();
    assert_eq!(value, Value::Number(10.0));
    let ratio = document.property(&ratio).unwrap();
    let error = ratio.error.expect("captured error");
    assert_eq!(error.kind, ErrorKind::TransformRuntime);
    assert_eq!(error.index, 0);
}

#[test]
fn chain_halts_on_first_error() {
    // [ok, fail, ok]: the failure at index 1 wins and the third transform
    // never runs
    let document = setup();
    let chained = document.create_property(GLOBAL_SCOPE, "chained", SemanticType::Number, Value::from(8.0));
    document.add_transform(&chained, TransformName::Add).unwrap();
    document.add_transform(&chained, TransformName::Divide).unwrap();
    document.add_transform(&chained, TransformName::Subtract).unwrap();
    let divisor = property_arg(&document, &chained, 1, 0);
    document.set_initial_value(&divisor, Value::from(0.0)).unwrap();

    let value = Engine::new(&document).evaluate(&chained).unwrap();
    assert_eq!(value, Value::Number(8.0), "falls back to the initial literal");
    let chained = document.property(&chained).unwrap();
    let error = chained.error.expect("captured error");
    assert_eq!(error.index, 1);
    assert!(chained.transforms[0].returned_value.is_some(), "first transform ran");
    assert!(chained.transforms[2].returned_value.is_none(), "third transform never ran");
}

#[test]
fn out_of_domain_math_is_a_transform_error() {
    // sqrt of a negative number is NaN
    let document = setup();
    let rooted = document.create_property(GLOBAL_SCOPE, "rooted", SemanticType::Number, Value::from(-4.0));
    document.add_transform(&rooted, TransformName::Math).unwrap();

    let value = Engine::new(&document).evaluate(&rooted).unwrap();
    assert_eq!(value, Value::Number(-4.0));
    let rooted = document.property(&rooted).unwrap();
    assert_eq!(rooted.error.expect("captured error").kind, ErrorKind::TransformRuntime);
}

#[test]
fn unparseable_final_coercion_falls_back_to_declared_slot() {
    // a Number property whose initial was switched to Text: the final
    // coercion of "abc" fails, so the Number slot literal comes back
    let document = setup();
    let switched = document.create_property(GLOBAL_SCOPE, "switched", SemanticType::Number, Value::from(3.0));
    document.set_initial_type(&switched, SemanticType::Text).unwrap();
    document.set_initial_value(&switched, Value::from("abc")).unwrap();

    let value = Engine::new(&document).evaluate(&switched).unwrap();
    assert_eq!(value, Value::Number(3.0), "the Number slot survived the type switch");
    let switched = document.property(&switched).unwrap();
    let error = switched.error.expect("captured error");
    assert_eq!(error.kind, ErrorKind::FinalTypeCoercion);
    assert_eq!(error.index, -1, "no transform to blame");
}

#[test]
fn final_coercion_of_parseable_text_only_warns() {
    let document = setup();
    let switched = document.create_property(GLOBAL_SCOPE, "switched", SemanticType::Number, Value::from(3.0));
    document.set_initial_type(&switched, SemanticType::Text).unwrap();
    document.set_initial_value(&switched, Value::from("12.5")).unwrap();

    let value = Engine::new(&document).evaluate(&switched).unwrap();
    assert_eq!(value, Value::Number(12.5));
    let switched = document.property(&switched).unwrap();
    assert!(switched.error.is_none());
    assert_eq!(switched.warning.expect("warning").index, -1);
}

#[test]
fn only_the_most_recent_warning_survives() {
    // two mismatching transforms in a row: the later coercion overwrites the
    // earlier warning
    let document = setup();
    let noisy = document.create_property(GLOBAL_SCOPE, "noisy", SemanticType::Boolean, Value::from(true));
    document.add_transform(&noisy, TransformName::Reverse).unwrap(); // wants Text
    document.add_transform(&noisy, TransformName::Flip).unwrap(); // wants Boolean

    Engine::new(&document).evaluate(&noisy).unwrap();
    let noisy = document.property(&noisy).unwrap();
    let warning = noisy.warning.expect("warning");
    assert_eq!(warning.index, 1, "the Flip coercion is the one that stands");
}
