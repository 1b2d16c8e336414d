//! The transform registry: a closed catalog of named, pure, typed functions
//! from (input value, argument values) to an output value. Each entry also
//! knows how to build its argument sub-properties, which live in the scope
//! tables like any other property and may themselves be variable-linked.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::construct::{Argument, Document, Enumerated, Transform, TransformFn};
use crate::datatype::{SemanticType, Value, parse_number_prefix};
use crate::error::PropsheetError;

// ------------- Names -------------
#[derive(PartialEq, Eq, Hash, Clone, Copy, Debug, Serialize, Deserialize)]
pub enum TransformName {
    #[serde(rename = "Join")]
    Join,
    #[serde(rename = "Change Case")]
    ChangeCase,
    #[serde(rename = "Slice")]
    Slice,
    #[serde(rename = "Side")]
    Side,
    #[serde(rename = "Reverse")]
    Reverse,
    #[serde(rename = "Text to Number")]
    TextToNumber,
    #[serde(rename = "Length")]
    Length,
    #[serde(rename = "Contains")]
    Contains,
    #[serde(rename = "Matches")]
    Matches,
    #[serde(rename = "Add")]
    Add,
    #[serde(rename = "Subtract")]
    Subtract,
    #[serde(rename = "Multiply")]
    Multiply,
    #[serde(rename = "Divide")]
    Divide,
    #[serde(rename = "Round")]
    Round,
    #[serde(rename = "Clamp")]
    Clamp,
    #[serde(rename = "Change Sign")]
    ChangeSign,
    #[serde(rename = "Math")]
    Math,
    #[serde(rename = "Compare")]
    Compare,
    #[serde(rename = "Number to Text")]
    NumberToText,
    #[serde(rename = "Flip")]
    Flip,
    #[serde(rename = "And")]
    And,
    #[serde(rename = "Or")]
    Or,
    #[serde(rename = "Nor")]
    Nor,
    #[serde(rename = "Boolean to Text")]
    BooleanToText,
    #[serde(rename = "Boolean to Number")]
    BooleanToNumber,
}

pub const TRANSFORM_NAMES: [TransformName; 25] = [
    TransformName::Join,
    TransformName::ChangeCase,
    TransformName::Slice,
    TransformName::Side,
    TransformName::Reverse,
    TransformName::TextToNumber,
    TransformName::Length,
    TransformName::Contains,
    TransformName::Matches,
    TransformName::Add,
    TransformName::Subtract,
    TransformName::Multiply,
    TransformName::Divide,
    TransformName::Round,
    TransformName::Clamp,
    TransformName::ChangeSign,
    TransformName::Math,
    TransformName::Compare,
    TransformName::NumberToText,
    TransformName::Flip,
    TransformName::And,
    TransformName::Or,
    TransformName::Nor,
    TransformName::BooleanToText,
    TransformName::BooleanToNumber,
];

impl TransformName {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransformName::Join => "Join",
            TransformName::ChangeCase => "Change Case",
            TransformName::Slice => "Slice",
            TransformName::Side => "Side",
            TransformName::Reverse => "Reverse",
            TransformName::TextToNumber => "Text to Number",
            TransformName::Length => "Length",
            TransformName::Contains => "Contains",
            TransformName::Matches => "Matches",
            TransformName::Add => "Add",
            TransformName::Subtract => "Subtract",
            TransformName::Multiply => "Multiply",
            TransformName::Divide => "Divide",
            TransformName::Round => "Round",
            TransformName::Clamp => "Clamp",
            TransformName::ChangeSign => "Change Sign",
            TransformName::Math => "Math",
            TransformName::Compare => "Compare",
            TransformName::NumberToText => "Number to Text",
            TransformName::Flip => "Flip",
            TransformName::And => "And",
            TransformName::Or => "Or",
            TransformName::Nor => "Nor",
            TransformName::BooleanToText => "Boolean to Text",
            TransformName::BooleanToNumber => "Boolean to Number",
        }
    }
}

impl fmt::Display for TransformName {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TransformName {
    type Err = PropsheetError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TRANSFORM_NAMES
            .iter()
            .find(|name| name.as_str() == s)
            .copied()
            .ok_or_else(|| PropsheetError::UnknownTransform(s.to_owned()))
    }
}

// ------------- Catalog -------------
/// The input -> output grouping used to filter "add transform" choices by an
/// entity's current effective type.
pub fn catalog(input: SemanticType, output: SemanticType) -> &'static [TransformName] {
    use SemanticType::*;
    use TransformName::*;
    match (input, output) {
        (Text, Text) => &[Join, ChangeCase, Slice, Side, Reverse],
        (Text, Number) => &[TextToNumber, Length],
        (Text, Boolean) => &[Contains, Matches],
        (Number, Number) => &[Add, Subtract, Multiply, Divide, Round, Clamp, ChangeSign, Math],
        (Number, Boolean) => &[Compare],
        (Number, Text) => &[NumberToText],
        (Boolean, Boolean) => &[Flip, And, Or, Nor],
        (Boolean, Text) => &[BooleanToText],
        (Boolean, Number) => &[BooleanToNumber],
    }
}

/// Input and output types of a catalog entry.
pub fn signature(name: TransformName) -> (SemanticType, SemanticType) {
    use SemanticType::*;
    use TransformName::*;
    match name {
        Join | ChangeCase | Slice | Side | Reverse => (Text, Text),
        TextToNumber | Length => (Text, Number),
        Contains | Matches => (Text, Boolean),
        Add | Subtract | Multiply | Divide | Round | Clamp | ChangeSign | Math => (Number, Number),
        Compare => (Number, Boolean),
        NumberToText => (Number, Text),
        Flip | And | Or | Nor => (Boolean, Boolean),
        BooleanToText => (Boolean, Text),
        BooleanToNumber => (Boolean, Number),
    }
}

/// The pure function behind a catalog entry. Used at instantiation and when
/// re-binding deserialized transforms.
pub fn function_of(name: TransformName) -> TransformFn {
    match name {
        TransformName::Join => join,
        TransformName::ChangeCase => change_case,
        TransformName::Slice => slice,
        TransformName::Side => side,
        TransformName::Reverse => reverse,
        TransformName::TextToNumber => text_to_number,
        TransformName::Length => length,
        TransformName::Contains => contains,
        TransformName::Matches => matches_text,
        TransformName::Add => add,
        TransformName::Subtract => subtract,
        TransformName::Multiply => multiply,
        TransformName::Divide => divide,
        TransformName::Round => round,
        TransformName::Clamp => clamp,
        TransformName::ChangeSign => change_sign,
        TransformName::Math => math,
        TransformName::Compare => compare,
        TransformName::NumberToText => number_to_text,
        TransformName::Flip => flip,
        TransformName::And => and,
        TransformName::Or => or,
        TransformName::Nor => nor,
        TransformName::BooleanToText => boolean_to_text,
        TransformName::BooleanToNumber => boolean_to_number,
    }
}

// ------------- Instantiation -------------

/// Builds a fresh transform with freshly created argument sub-properties,
/// inserted into the document under the given scope (the owning entity's id).
pub fn instantiate(name: TransformName, scope: &str, document: &Document) -> Transform {
    let (input_type, output_type) = signature(name);
    let args = build_args(name, scope, document);
    Transform {
        id: document.generate_id(),
        name,
        scope: scope.to_owned(),
        input_type,
        output_type,
        function: function_of(name),
        args,
        returned_value: None,
    }
}

fn property_arg(
    document: &Document,
    scope: &str,
    name: &str,
    semantic_type: SemanticType,
    value: Value,
) -> Argument {
    Argument::Property(document.create_property(scope, name, semantic_type, value))
}

fn enum_arg(document: &Document, name: &str, value: &str, options: &[&str]) -> Argument {
    Argument::Enumerated(Enumerated::new(document.generate_id(), name, value, options))
}

fn build_args(name: TransformName, scope: &str, document: &Document) -> Vec<Argument> {
    use SemanticType::*;
    match name {
        TransformName::Join => vec![
            property_arg(document, scope, "Text", Text, Value::from("Text")),
            property_arg(document, scope, "Separator", Text, Value::from(" ")),
        ],
        TransformName::ChangeCase => vec![enum_arg(
            document,
            "Case",
            "uppercase",
            &["uppercase", "lowercase", "headline", "sentence"],
        )],
        TransformName::Slice => vec![
            property_arg(document, scope, "Start", Number, Value::from(0.0)),
            property_arg(document, scope, "End", Number, Value::from(10.0)),
        ],
        TransformName::Side => vec![
            enum_arg(document, "Side", "start", &["start", "end"]),
            property_arg(document, scope, "Length", Number, Value::from(3.0)),
        ],
        TransformName::Reverse => Vec::new(),
        TransformName::TextToNumber => Vec::new(),
        TransformName::Length => vec![enum_arg(
            document,
            "Count",
            "characters",
            &["characters", "words"],
        )],
        TransformName::Contains => vec![
            property_arg(document, scope, "Text", Text, Value::from("Text")),
            enum_arg(document, "Place", "anywhere", &["start", "end", "anywhere"]),
        ],
        TransformName::Matches => vec![property_arg(
            document, scope, "Text", Text, Value::from("Text"),
        )],
        TransformName::Add
        | TransformName::Subtract
        | TransformName::Multiply
        | TransformName::Divide => vec![property_arg(
            document, scope, "Number", Number, Value::from(10.0),
        )],
        TransformName::Round => vec![enum_arg(
            document,
            "Direction",
            "nearest",
            &["nearest", "down", "up", "truncate"],
        )],
        TransformName::Clamp => vec![
            property_arg(document, scope, "Min", Number, Value::from(10.0)),
            property_arg(document, scope, "Max", Number, Value::from(10.0)),
        ],
        TransformName::ChangeSign => vec![enum_arg(
            document,
            "Operation",
            "invert",
            &["invert", "absolute", "negate"],
        )],
        TransformName::Math => vec![enum_arg(
            document,
            "Operation",
            "square",
            &["square", "log", "sin", "cos", "tan", "asin", "atan", "acos"],
        )],
        TransformName::Compare => vec![
            enum_arg(
                document,
                "Operation",
                "equals",
                &["less than", "at most", "equals", "at least", "more than"],
            ),
            property_arg(document, scope, "Number", Number, Value::from(10.0)),
        ],
        TransformName::NumberToText => vec![property_arg(
            document, scope, "Decimal", Number, Value::from(0.0),
        )],
        TransformName::Flip => Vec::new(),
        TransformName::And | TransformName::Or | TransformName::Nor => vec![property_arg(
            document, scope, "Boolean", Boolean, Value::from(true),
        )],
        TransformName::BooleanToText => Vec::new(),
        TransformName::BooleanToNumber => Vec::new(),
    }
}

// ------------- Functions -------------
// Pure and total on valid input; an argument of an unexpected shape (only
// reachable through a corrupt snapshot) yields None.

/// Slicing with sign-wrapping bounds: a negative bound counts from the end,
/// everything is clamped into the text.
fn slice_chars(text: &str, start: f64, end: f64) -> String {
    let chars: Vec<char> = text.chars().collect();
    let len = chars.len() as f64;
    let normalize = |bound: f64| -> usize {
        let wrapped = if bound < 0.0 { len + bound } else { bound };
        if wrapped.is_nan() { 0 } else { wrapped.clamp(0.0, len) as usize }
    };
    let from = normalize(start);
    let to = normalize(end);
    if from >= to {
        return String::new();
    }
    chars[from..to].iter().collect()
}

fn join(value: &Value, args: &[Value]) -> Option<Value> {
    let value = value.as_text()?;
    let text = args.first()?.as_text()?;
    let separator = args.get(1)?.as_text()?;
    Some(Value::Text(format!("{}{}{}", value, separator, text)))
}

fn change_case(value: &Value, args: &[Value]) -> Option<Value> {
    let value = value.as_text()?;
    let case = args.first()?.as_text()?;
    let result = match case {
        "uppercase" => value.to_uppercase(),
        "lowercase" => value.to_lowercase(),
        "headline" => value
            .split(' ')
            .map(capitalize)
            .collect::<Vec<_>>()
            .join(" "),
        "sentence" => capitalize(value),
        _ => return None,
    };
    Some(Value::Text(result))
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn slice(value: &Value, args: &[Value]) -> Option<Value> {
    let value = value.as_text()?;
    let a = args.first()?.as_number()?;
    let b = args.get(1)?.as_number()?;
    // an absent end bound slices to the end of the text; otherwise bound
    // order doesn't matter
    let result = if b.is_nan() {
        slice_chars(value, a, value.chars().count() as f64)
    } else {
        slice_chars(value, a.min(b), a.max(b))
    };
    Some(Value::Text(result))
}

fn side(value: &Value, args: &[Value]) -> Option<Value> {
    let value = value.as_text()?;
    let side = args.first()?.as_text()?;
    let count = args.get(1)?.as_number()?;
    let len = value.chars().count() as f64;
    let result = match side {
        "start" => slice_chars(value, 0.0, count),
        "end" => slice_chars(value, -count, len),
        _ => return None,
    };
    Some(Value::Text(result))
}

fn reverse(value: &Value, _args: &[Value]) -> Option<Value> {
    let value = value.as_text()?;
    Some(Value::Text(value.chars().rev().collect()))
}

fn text_to_number(value: &Value, _args: &[Value]) -> Option<Value> {
    let value = value.as_text()?;
    Some(Value::Number(parse_number_prefix(value)))
}

fn length(value: &Value, args: &[Value]) -> Option<Value> {
    let value = value.as_text()?;
    let count = args.first()?.as_text()?;
    let result = match count {
        "characters" => value.chars().count(),
        "words" => value.split(' ').count(),
        _ => return None,
    };
    Some(Value::Number(result as f64))
}

fn contains(value: &Value, args: &[Value]) -> Option<Value> {
    let value = value.as_text()?;
    let text = args.first()?.as_text()?;
    let place = args.get(1)?.as_text()?;
    let result = match place {
        "start" => value.starts_with(text),
        "end" => value.ends_with(text),
        "anywhere" => value.contains(text),
        _ => return None,
    };
    Some(Value::Boolean(result))
}

fn matches_text(value: &Value, args: &[Value]) -> Option<Value> {
    let value = value.as_text()?;
    let text = args.first()?.as_text()?;
    Some(Value::Boolean(value == text))
}

fn add(value: &Value, args: &[Value]) -> Option<Value> {
    Some(Value::Number(value.as_number()? + args.first()?.as_number()?))
}

fn subtract(value: &Value, args: &[Value]) -> Option<Value> {
    Some(Value::Number(value.as_number()? - args.first()?.as_number()?))
}

fn multiply(value: &Value, args: &[Value]) -> Option<Value> {
    Some(Value::Number(value.as_number()? * args.first()?.as_number()?))
}

fn divide(value: &Value, args: &[Value]) -> Option<Value> {
    // division by zero yields a non-finite number, which the engine reports
    Some(Value::Number(value.as_number()? / args.first()?.as_number()?))
}

fn round(value: &Value, args: &[Value]) -> Option<Value> {
    let value = value.as_number()?;
    let direction = args.first()?.as_text()?;
    let result = match direction {
        // half-way cases round toward positive
        "nearest" => (value + 0.5).floor(),
        "down" => value.floor(),
        "up" => value.ceil(),
        "truncate" => value.trunc(),
        _ => return None,
    };
    Some(Value::Number(result))
}

fn clamp(value: &Value, args: &[Value]) -> Option<Value> {
    let mut value = value.as_number()?;
    let min = args.first()?.as_number()?;
    let max = args.get(1)?.as_number()?;
    // a NaN bound means no bound on that side
    if !min.is_nan() {
        value = value.max(min);
    }
    if !max.is_nan() {
        value = value.min(max);
    }
    Some(Value::Number(value))
}

fn change_sign(value: &Value, args: &[Value]) -> Option<Value> {
    let value = value.as_number()?;
    let operation = args.first()?.as_text()?;
    let result = match operation {
        "invert" => -value,
        "absolute" => value.abs(),
        "negate" => {
            if value > 0.0 {
                -value
            } else {
                value
            }
        }
        _ => return None,
    };
    Some(Value::Number(result))
}

fn math(value: &Value, args: &[Value]) -> Option<Value> {
    let value = value.as_number()?;
    let operation = args.first()?.as_text()?;
    let result = match operation {
        // "square" maps to the square root
        "square" => value.sqrt(),
        "log" => value.ln(),
        "sin" => value.sin(),
        "cos" => value.cos(),
        "tan" => value.tan(),
        "asin" => value.asin(),
        "atan" => value.atan(),
        "acos" => value.acos(),
        _ => return None,
    };
    Some(Value::Number(result))
}

fn compare(value: &Value, args: &[Value]) -> Option<Value> {
    let value = value.as_number()?;
    let operation = args.first()?.as_text()?;
    let number = args.get(1)?.as_number()?;
    let result = match operation {
        "less than" => value < number,
        "at most" => value <= number,
        "equals" => value == number,
        "at least" => value >= number,
        "more than" => value > number,
        _ => return None,
    };
    Some(Value::Boolean(result))
}

fn number_to_text(value: &Value, args: &[Value]) -> Option<Value> {
    let value = value.as_number()?;
    let decimals = args.first()?.as_number()?;
    if decimals.is_nan() || !(0.0..=100.0).contains(&decimals) {
        return None;
    }
    Some(Value::Text(format!("{:.*}", decimals as usize, value)))
}

fn flip(value: &Value, _args: &[Value]) -> Option<Value> {
    Some(Value::Boolean(!value.as_boolean()?))
}

fn and(value: &Value, args: &[Value]) -> Option<Value> {
    Some(Value::Boolean(value.as_boolean()? && args.first()?.as_boolean()?))
}

fn or(value: &Value, args: &[Value]) -> Option<Value> {
    Some(Value::Boolean(value.as_boolean()? || args.first()?.as_boolean()?))
}

fn nor(value: &Value, args: &[Value]) -> Option<Value> {
    Some(Value::Boolean(!(value.as_boolean()? || args.first()?.as_boolean()?)))
}

fn boolean_to_text(value: &Value, _args: &[Value]) -> Option<Value> {
    Some(Value::Text(
        if value.as_boolean()? { "True" } else { "False" }.to_owned(),
    ))
}

fn boolean_to_number(value: &Value, _args: &[Value]) -> Option<Value> {
    Some(Value::Number(if value.as_boolean()? { 1.0 } else { 0.0 }))
}
