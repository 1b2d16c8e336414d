//! The evaluation engine. Evaluation is pull-based and stateless across
//! calls: every read resolves the initial value (following variable
//! references with an explicit visited path for cycle detection), threads
//! the value through the transform chain with coercion on type mismatches,
//! and reconciles the final type against a property's declared type. Faults
//! are captured on the evaluated entity; the public calls only return `Err`
//! for references that are not in the tables at all.

use tracing::{debug, warn};

use crate::construct::{
    Argument, Document, EntityKind, ErrorKind, EvalError, EvalWarning, Id, Initial,
    ScopedReference, Transform, WarningKind,
};
use crate::datatype::{SemanticType, Value, coerce};
use crate::error::Result;

// A copy of the evaluable parts of a property or variable, taken under the
// keeper lock and worked on with no lock held. Variables have no declared
// type and skip the final reconciliation.
struct Shell {
    id: Id,
    initial: Initial,
    transforms: Vec<Transform>,
    declared: Option<SemanticType>,
}

struct Outcome {
    value: Value,
    error: Option<EvalError>,
    warning: Option<EvalWarning>,
    // per-transform diagnostic outputs; None for transforms never reached
    returned: Vec<Option<Value>>,
}

impl Outcome {
    fn looped(&self) -> bool {
        matches!(self.error, Some(EvalError { kind: ErrorKind::ReferenceLoop, .. }))
    }
}

pub struct Engine<'en> {
    document: &'en Document,
}

impl<'en> Engine<'en> {
    pub fn new(document: &'en Document) -> Self {
        Self { document }
    }

    /// Computes the entity's final value. Errors and warnings captured along
    /// the way are written onto the entity (and transitively onto referenced
    /// entities); the returned value is always valid and, for properties,
    /// always of the declared type.
    pub fn evaluate(&self, target: &ScopedReference) -> Result<Value> {
        let mut path = Vec::new();
        Ok(self.evaluate_guarded(target, &mut path)?.value)
    }

    /// The static post-chain type, without evaluating anything: the last
    /// transform's output type, else the referenced variable's effective
    /// type, else the declared initial type. Used to filter the catalog of
    /// applicable transforms.
    pub fn effective_type(&self, target: &ScopedReference) -> Result<SemanticType> {
        let mut path = Vec::new();
        self.effective_type_guarded(target, &mut path)
    }

    fn effective_type_guarded(
        &self,
        target: &ScopedReference,
        path: &mut Vec<Id>,
    ) -> Result<SemanticType> {
        let (id, last_output, initial_type, variable) = match target.kind {
            EntityKind::Property => self.document.with_property(target, |p| {
                (
                    p.id,
                    p.transforms.last().map(|t| t.output_type),
                    p.initial.semantic_type,
                    p.initial.variable.clone(),
                )
            })?,
            EntityKind::Variable => self.document.with_variable(target, |v| {
                (
                    v.id,
                    v.transforms.last().map(|t| t.output_type),
                    v.initial.semantic_type,
                    v.initial.variable.clone(),
                )
            })?,
        };
        if let Some(output) = last_output {
            return Ok(output);
        }
        match variable {
            Some(ref linked) if !path.contains(&linked.id) => {
                path.push(id);
                let resolved = self.effective_type_guarded(linked, path);
                path.pop();
                resolved
            }
            // unlinked, or a loop: the local declared type stands
            _ => Ok(initial_type),
        }
    }

    fn evaluate_guarded(&self, target: &ScopedReference, path: &mut Vec<Id>) -> Result<Outcome> {
        let shell = match target.kind {
            EntityKind::Property => self.document.with_property(target, |p| Shell {
                id: p.id,
                initial: p.initial.clone(),
                transforms: p.transforms.clone(),
                declared: Some(p.semantic_type),
            })?,
            EntityKind::Variable => self.document.with_variable(target, |v| Shell {
                id: v.id,
                initial: v.initial.clone(),
                transforms: v.transforms.clone(),
                declared: None,
            })?,
        };
        debug!(%target, "evaluating");
        path.push(shell.id);
        let result = self.evaluate_shell(&shell, path);
        path.pop();
        let outcome = result?;
        self.store_outcome(target, &outcome)?;
        Ok(outcome)
    }

    fn evaluate_shell(&self, shell: &Shell, path: &mut Vec<Id>) -> Result<Outcome> {
        let mut error: Option<EvalError> = None;
        let mut warning: Option<EvalWarning> = None;
        let mut returned: Vec<Option<Value>> = vec![None; shell.transforms.len()];

        // natural (pre-transform) type and value, possibly delegated
        let (mut current_type, mut current_value) = match shell.initial.variable {
            None => (shell.initial.semantic_type, shell.initial.literal()),
            Some(ref linked) => {
                if path.contains(&linked.id) {
                    error = Some(reference_loop());
                    (shell.initial.semantic_type, shell.initial.literal())
                } else {
                    let resolved = self.evaluate_guarded(linked, path)?;
                    if resolved.looped() {
                        // the referenced chain crossed back into this path;
                        // both ends report the loop
                        error = Some(reference_loop());
                        (shell.initial.semantic_type, shell.initial.literal())
                    } else {
                        (resolved.value.semantic_type(), resolved.value)
                    }
                }
            }
        };

        // a reference loop takes precedence over all transform processing
        if error.is_none() {
            for (index, transform) in shell.transforms.iter().enumerate() {
                if current_type != transform.input_type {
                    warning = Some(EvalWarning {
                        kind: WarningKind::TypeMismatch,
                        message: format!(
                            "expected a {} value but received a {} value; coerced",
                            transform.input_type, current_type
                        ),
                        index: index as i32,
                    });
                    current_value = coerce(transform.input_type, &current_value);
                    current_type = transform.input_type;
                }

                let mut arg_values = Vec::with_capacity(transform.args.len());
                for arg in &transform.args {
                    match arg {
                        Argument::Enumerated(enumerated) => {
                            arg_values.push(Value::Text(enumerated.value.clone()));
                        }
                        Argument::Property(reference) => {
                            arg_values.push(self.evaluate_guarded(reference, path)?.value);
                        }
                    }
                }

                let output = (transform.function)(&current_value, &arg_values);
                returned[index] = output.clone();
                match output {
                    None => {
                        error = Some(EvalError {
                            kind: ErrorKind::TransformRuntime,
                            message: "no output value".to_owned(),
                            index: index as i32,
                        });
                    }
                    Some(value) if value.is_invalid() => {
                        error = Some(EvalError {
                            kind: ErrorKind::TransformRuntime,
                            message: format!("invalid number: {}", value),
                            index: index as i32,
                        });
                    }
                    Some(value) => {
                        current_type = transform.output_type;
                        current_value = value;
                    }
                }

                // first failure wins: fall back to the initial literal and
                // leave the remaining transforms untouched
                if error.is_some() {
                    current_type = shell.initial.semantic_type;
                    current_value = shell.initial.literal();
                    break;
                }
            }
        }

        // reconcile against the declared type; variables accept whatever
        // type emerged from the chain
        if let Some(declared) = shell.declared {
            if current_type != declared {
                let coerced = coerce(declared, &current_value);
                if coerced.is_invalid() {
                    error = Some(EvalError {
                        kind: ErrorKind::FinalTypeCoercion,
                        message: "the transformed value is invalid".to_owned(),
                        index: shell.transforms.len() as i32 - 1,
                    });
                    current_value = shell.initial.values.get(declared);
                } else {
                    warning = Some(EvalWarning {
                        kind: WarningKind::FinalTypeMismatch,
                        message: format!(
                            "transforms produced a {} instead of a {}; converted to the declared type",
                            current_type, declared
                        ),
                        index: -1,
                    });
                    current_value = coerced;
                }
            }
        }

        if let Some(ref e) = error {
            warn!(id = shell.id, index = e.index, message = %e.message, "evaluation error");
        }

        Ok(Outcome { value: current_value, error, warning, returned })
    }

    // Errors and warnings are out-parameters for the caller to read off the
    // entity; recomputed in full on every evaluation, so stale state never
    // survives a read.
    fn store_outcome(&self, target: &ScopedReference, outcome: &Outcome) -> Result<()> {
        match target.kind {
            EntityKind::Property => self.document.with_property_mut(target, |p| {
                p.error = outcome.error.clone();
                p.warning = outcome.warning.clone();
                cache_returned(&mut p.transforms, &outcome.returned);
            }),
            EntityKind::Variable => self.document.with_variable_mut(target, |v| {
                v.error = outcome.error.clone();
                v.warning = outcome.warning.clone();
                cache_returned(&mut v.transforms, &outcome.returned);
            }),
        }
    }
}

fn cache_returned(transforms: &mut [Transform], returned: &[Option<Value>]) {
    for (transform, value) in transforms.iter_mut().zip(returned) {
        if value.is_some() {
            transform.returned_value = value.clone();
        }
    }
}

fn reference_loop() -> EvalError {
    EvalError {
        kind: ErrorKind::ReferenceLoop,
        message: "reference loop".to_owned(),
        index: -1,
    }
}
