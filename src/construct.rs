use std::sync::{Arc, Mutex};

// keepers use HashMaps with a fast hasher, keyed by id or by scope name
use core::hash::BuildHasherDefault;
use std::collections::HashMap;
use seahash::SeaHasher;

// used to print out readable forms of a construct
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::datatype::{SemanticType, Value, ValueSlots, coerce};
use crate::error::{PropsheetError, Result};
use crate::evaluate::Engine;
use crate::transforms::{self, TransformName};

// ------------- Id -------------
pub type Id = u64;

pub type IdHasher = BuildHasherDefault<SeaHasher>;
pub type ScopeHasher = BuildHasherDefault<SeaHasher>;

pub const GENESIS: Id = 0;

/// The root scope name. Argument sub-properties live in scopes named after
/// their owning entity's id.
pub const GLOBAL_SCOPE: &str = "global";

#[derive(Debug)]
pub struct IdGenerator {
    lower_bound: Id,
    released: Vec<Id>,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self {
            lower_bound: GENESIS,
            released: Vec::new(),
        }
    }
    // Restoring a persisted document hands back ids that must never be
    // generated again.
    pub fn retain(&mut self, id: Id) {
        if id > self.lower_bound {
            self.lower_bound = id;
        }
    }
    pub fn release(&mut self, id: Id) {
        self.released.push(id);
    }
    pub fn generate(&mut self) -> Id {
        self.released.pop().unwrap_or_else(|| {
            self.lower_bound += 1;
            self.lower_bound
        })
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

// ------------- Scoped Reference -------------
#[derive(PartialEq, Eq, Hash, Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Property,
    Variable,
}

impl EntityKind {
    pub fn label(&self) -> &'static str {
        match self {
            EntityKind::Property => "property",
            EntityKind::Variable => "variable",
        }
    }
}

/// Addresses a property or variable in the scope tables.
#[derive(PartialEq, Eq, Hash, Clone, Debug, Serialize, Deserialize)]
pub struct ScopedReference {
    pub kind: EntityKind,
    pub scope: String,
    pub id: Id,
}

impl ScopedReference {
    pub fn property(scope: &str, id: Id) -> Self {
        Self { kind: EntityKind::Property, scope: scope.to_owned(), id }
    }
    pub fn variable(scope: &str, id: Id) -> Self {
        Self { kind: EntityKind::Variable, scope: scope.to_owned(), id }
    }
}

impl fmt::Display for ScopedReference {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} {}/{}", self.kind.label(), self.scope, self.id)
    }
}

// ------------- Evaluation Faults -------------
// Recorded on the evaluated entity, recomputed from scratch on every read.
// An index of -1 marks faults not tied to any particular transform.

#[derive(PartialEq, Eq, Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ReferenceLoop,
    TransformRuntime,
    FinalTypeCoercion,
}

#[derive(PartialEq, Clone, Debug, Serialize, Deserialize)]
pub struct EvalError {
    pub kind: ErrorKind,
    pub message: String,
    pub index: i32,
}

#[derive(PartialEq, Eq, Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    TypeMismatch,
    FinalTypeMismatch,
}

#[derive(PartialEq, Clone, Debug, Serialize, Deserialize)]
pub struct EvalWarning {
    pub kind: WarningKind,
    pub message: String,
    pub index: i32,
}

// ------------- Initial Value -------------
/// The pre-transform input: a literal slot per type, or a delegation to a
/// variable. When `variable` is set, reads resolve through the variable and
/// the local slots only serve as the fallback literal.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Initial {
    pub id: Id,
    #[serde(rename = "type")]
    pub semantic_type: SemanticType,
    pub values: ValueSlots,
    pub variable: Option<ScopedReference>,
}

impl Initial {
    pub fn new(id: Id, semantic_type: SemanticType, value: Value) -> Self {
        let mut values = ValueSlots::default();
        let coerced = coerce(semantic_type, &value);
        // stored literals back every fallback path and the snapshot format;
        // a non-finite number never gets in, the per-type default stands
        if !coerced.is_invalid() {
            values.set(coerced);
        }
        Self { id, semantic_type, values, variable: None }
    }
    /// The locally stored literal for the declared type, ignoring any
    /// variable delegation. This is what every fallback path returns.
    pub fn literal(&self) -> Value {
        self.values.get(self.semantic_type)
    }
}

// ------------- Enumerated Argument -------------
/// A closed-choice argument: its value is always one of its options. No
/// transform chain, no variable delegation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Enumerated {
    pub id: Id,
    pub name: String,
    pub value: String,
    pub options: Vec<String>,
}

impl Enumerated {
    pub fn new(id: Id, name: &str, value: &str, options: &[&str]) -> Self {
        Self {
            id,
            name: name.to_owned(),
            value: value.to_owned(),
            options: options.iter().map(|o| (*o).to_owned()).collect(),
        }
    }
    pub fn set_value(&mut self, value: &str) -> Result<()> {
        if !self.options.iter().any(|o| o == value) {
            return Err(PropsheetError::InvalidOption {
                argument: self.name.clone(),
                option: value.to_owned(),
            });
        }
        self.value = value.to_owned();
        Ok(())
    }
}

// ------------- Transform -------------
/// The pure function behind a transform. `None` means the transform produced
/// no output (wrong argument shape or an out-of-range argument).
pub type TransformFn = fn(&Value, &[Value]) -> Option<Value>;

// Deserialized transforms start out unbound; the persistor re-binds them by
// name before the document is handed out.
pub(crate) fn unbound_transform() -> TransformFn {
    |_, _| None
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "arg", rename_all = "lowercase")]
pub enum Argument {
    Enumerated(Enumerated),
    Property(ScopedReference),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Transform {
    pub id: Id,
    pub name: TransformName,
    pub scope: String,
    pub input_type: SemanticType,
    pub output_type: SemanticType,
    #[serde(skip, default = "unbound_transform")]
    pub function: TransformFn,
    pub args: Vec<Argument>,
    /// Last computed output. Diagnostic only, never authoritative.
    pub returned_value: Option<Value>,
}

// ------------- Property -------------
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Property {
    pub id: Id,
    pub name: String,
    pub scope: String,
    /// The declared output contract: evaluation always returns this type.
    #[serde(rename = "type")]
    pub semantic_type: SemanticType,
    pub initial: Initial,
    pub transforms: Vec<Transform>,
    pub error: Option<EvalError>,
    pub warning: Option<EvalWarning>,
}

// ------------- Variable -------------
/// Like a property, but the output type floats with the chain, and other
/// entities may point their initial at it. `assignments` is a derived weak
/// reverse-index of those entities, kept only so deletion can cascade a
/// detach; it owns nothing and could be rebuilt by a full scan.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Variable {
    pub id: Id,
    pub name: String,
    pub scope: String,
    pub initial: Initial,
    pub transforms: Vec<Transform>,
    pub assignments: HashMap<Id, ScopedReference, IdHasher>,
    pub error: Option<EvalError>,
    pub warning: Option<EvalWarning>,
}

// ------------- Keepers -------------
/// A scope-keyed table: scope name -> id -> entity.
#[derive(Debug)]
pub struct Keeper<T> {
    kept: HashMap<String, HashMap<Id, T, IdHasher>, ScopeHasher>,
}

pub type PropertyKeeper = Keeper<Property>;
pub type VariableKeeper = Keeper<Variable>;

impl<T> Keeper<T> {
    pub fn new() -> Self {
        Self { kept: HashMap::default() }
    }
    pub fn keep(&mut self, scope: &str, id: Id, entity: T) {
        self.kept.entry(scope.to_owned()).or_default().insert(id, entity);
    }
    pub fn get(&self, scope: &str, id: Id) -> Option<&T> {
        self.kept.get(scope).and_then(|members| members.get(&id))
    }
    pub fn get_mut(&mut self, scope: &str, id: Id) -> Option<&mut T> {
        self.kept.get_mut(scope).and_then(|members| members.get_mut(&id))
    }
    pub fn remove(&mut self, scope: &str, id: Id) -> Option<T> {
        let members = self.kept.get_mut(scope)?;
        let removed = members.remove(&id);
        if members.is_empty() && scope != GLOBAL_SCOPE {
            self.kept.remove(scope);
        }
        removed
    }
    pub fn scopes(&self) -> impl Iterator<Item = (&String, &HashMap<Id, T, IdHasher>)> {
        self.kept.iter()
    }
    pub fn members(&self, scope: &str) -> Vec<&T> {
        self.kept
            .get(scope)
            .map(|members| members.values().collect())
            .unwrap_or_default()
    }
    pub fn len(&self) -> usize {
        self.kept.values().map(|members| members.len()).sum()
    }
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
    // snapshot plumbing: the whole table in and out
    pub fn from_map(kept: HashMap<String, HashMap<Id, T, IdHasher>, ScopeHasher>) -> Self {
        Self { kept }
    }
}

impl<T: Clone> Keeper<T> {
    pub fn to_map(&self) -> HashMap<String, HashMap<Id, T, IdHasher>, ScopeHasher> {
        self.kept.clone()
    }
}

impl<T> Default for Keeper<T> {
    fn default() -> Self {
        Self::new()
    }
}

// ------------- Document -------------
// This sets up the document store with the necessary structures. One per
// session; the engine and every mutation call borrow it explicitly, so there
// is no ambient module state.
pub struct Document {
    // owns an id generator
    pub id_generator: Arc<Mutex<IdGenerator>>,
    // owns the scope tables
    pub properties: Arc<Mutex<PropertyKeeper>>,
    pub variables: Arc<Mutex<VariableKeeper>>,
    // selection tracking for the external caller
    pub selected: Arc<Mutex<Option<ScopedReference>>>,
}

impl Document {
    pub fn new() -> Self {
        Self {
            id_generator: Arc::new(Mutex::new(IdGenerator::new())),
            properties: Arc::new(Mutex::new(PropertyKeeper::new())),
            variables: Arc::new(Mutex::new(VariableKeeper::new())),
            selected: Arc::new(Mutex::new(None)),
        }
    }

    /// The document every fresh session starts from.
    pub fn with_defaults() -> Self {
        let document = Self::new();
        document.create_property(GLOBAL_SCOPE, "Title", SemanticType::Text,
            Value::from("Six Headlines to Read in 2021"));
        document.create_property(GLOBAL_SCOPE, "Author", SemanticType::Text,
            Value::from("Anonymous"));
        document.create_property(GLOBAL_SCOPE, "Stars", SemanticType::Number,
            Value::from(0.0));
        document.create_property(GLOBAL_SCOPE, "Starred", SemanticType::Boolean,
            Value::from(false));
        document
    }

    // functions to access the owned generator and keepers
    pub fn id_generator(&self) -> Arc<Mutex<IdGenerator>> {
        Arc::clone(&self.id_generator)
    }
    pub fn properties(&self) -> Arc<Mutex<PropertyKeeper>> {
        Arc::clone(&self.properties)
    }
    pub fn variables(&self) -> Arc<Mutex<VariableKeeper>> {
        Arc::clone(&self.variables)
    }
    pub fn generate_id(&self) -> Id {
        self.id_generator.lock().unwrap().generate()
    }

    // scoped access helpers; every mutation below funnels through these so
    // no lock is ever held across a recursive evaluation
    pub(crate) fn with_property<R>(
        &self,
        target: &ScopedReference,
        f: impl FnOnce(&Property) -> R,
    ) -> Result<R> {
        let keeper = self.properties.lock().unwrap();
        let property = keeper
            .get(&target.scope, target.id)
            .ok_or_else(|| unknown(EntityKind::Property, target))?;
        Ok(f(property))
    }
    pub(crate) fn with_property_mut<R>(
        &self,
        target: &ScopedReference,
        f: impl FnOnce(&mut Property) -> R,
    ) -> Result<R> {
        let mut keeper = self.properties.lock().unwrap();
        let property = keeper
            .get_mut(&target.scope, target.id)
            .ok_or_else(|| unknown(EntityKind::Property, target))?;
        Ok(f(property))
    }
    pub(crate) fn with_variable<R>(
        &self,
        target: &ScopedReference,
        f: impl FnOnce(&Variable) -> R,
    ) -> Result<R> {
        let keeper = self.variables.lock().unwrap();
        let variable = keeper
            .get(&target.scope, target.id)
            .ok_or_else(|| unknown(EntityKind::Variable, target))?;
        Ok(f(variable))
    }
    pub(crate) fn with_variable_mut<R>(
        &self,
        target: &ScopedReference,
        f: impl FnOnce(&mut Variable) -> R,
    ) -> Result<R> {
        let mut keeper = self.variables.lock().unwrap();
        let variable = keeper
            .get_mut(&target.scope, target.id)
            .ok_or_else(|| unknown(EntityKind::Variable, target))?;
        Ok(f(variable))
    }
    fn with_initial<R>(
        &self,
        target: &ScopedReference,
        f: impl FnOnce(&Initial) -> R,
    ) -> Result<R> {
        match target.kind {
            EntityKind::Property => self.with_property(target, |p| f(&p.initial)),
            EntityKind::Variable => self.with_variable(target, |v| f(&v.initial)),
        }
    }
    fn with_initial_mut<R>(
        &self,
        target: &ScopedReference,
        f: impl FnOnce(&mut Initial) -> R,
    ) -> Result<R> {
        match target.kind {
            EntityKind::Property => self.with_property_mut(target, |p| f(&mut p.initial)),
            EntityKind::Variable => self.with_variable_mut(target, |v| f(&mut v.initial)),
        }
    }
    fn with_transforms_mut<R>(
        &self,
        target: &ScopedReference,
        f: impl FnOnce(&mut Vec<Transform>) -> R,
    ) -> Result<R> {
        match target.kind {
            EntityKind::Property => self.with_property_mut(target, |p| f(&mut p.transforms)),
            EntityKind::Variable => self.with_variable_mut(target, |v| f(&mut v.transforms)),
        }
    }

    /// Clones a property out of the table.
    pub fn property(&self, target: &ScopedReference) -> Result<Property> {
        self.with_property(target, |p| p.clone())
    }
    /// Clones a variable out of the table.
    pub fn variable(&self, target: &ScopedReference) -> Result<Variable> {
        self.with_variable(target, |v| v.clone())
    }
    /// All properties in a scope, in creation order.
    pub fn properties_in(&self, scope: &str) -> Vec<Property> {
        let keeper = self.properties.lock().unwrap();
        let mut members: Vec<Property> = keeper.members(scope).into_iter().cloned().collect();
        members.sort_by_key(|p| p.id);
        members
    }
    /// All variables in a scope, in creation order.
    pub fn variables_in(&self, scope: &str) -> Vec<Variable> {
        let keeper = self.variables.lock().unwrap();
        let mut members: Vec<Variable> = keeper.members(scope).into_iter().cloned().collect();
        members.sort_by_key(|v| v.id);
        members
    }

    // ------------- creation -------------
    pub fn create_property(
        &self,
        scope: &str,
        name: &str,
        semantic_type: SemanticType,
        value: Value,
    ) -> ScopedReference {
        let id = self.generate_id();
        let initial = Initial::new(self.generate_id(), semantic_type, value);
        let property = Property {
            id,
            name: name.to_owned(),
            scope: scope.to_owned(),
            semantic_type,
            initial,
            transforms: Vec::new(),
            error: None,
            warning: None,
        };
        self.properties.lock().unwrap().keep(scope, id, property);
        debug!(scope, id, name, "created property");
        ScopedReference::property(scope, id)
    }

    pub fn create_variable(
        &self,
        scope: &str,
        name: &str,
        semantic_type: SemanticType,
        value: Value,
    ) -> ScopedReference {
        let id = self.generate_id();
        let initial = Initial::new(self.generate_id(), semantic_type, value);
        let variable = Variable {
            id,
            name: name.to_owned(),
            scope: scope.to_owned(),
            initial,
            transforms: Vec::new(),
            assignments: HashMap::default(),
            error: None,
            warning: None,
        };
        self.variables.lock().unwrap().keep(scope, id, variable);
        debug!(scope, id, name, "created variable");
        ScopedReference::variable(scope, id)
    }

    // ------------- entity mutation -------------
    pub fn rename(&self, target: &ScopedReference, name: &str) -> Result<()> {
        match target.kind {
            EntityKind::Property => self.with_property_mut(target, |p| p.name = name.to_owned()),
            EntityKind::Variable => self.with_variable_mut(target, |v| v.name = name.to_owned()),
        }
    }

    /// Switches the declared initial type. The other slots keep whatever was
    /// entered before, so switching back restores the previous literal.
    pub fn set_initial_type(
        &self,
        target: &ScopedReference,
        semantic_type: SemanticType,
    ) -> Result<()> {
        self.with_initial_mut(target, |initial| initial.semantic_type = semantic_type)
    }

    /// Coerces the value into the current initial type and stores it in that
    /// slot. A value that coerces into a non-finite number is rejected, so
    /// stored literals stay valid as fallbacks.
    pub fn set_initial_value(&self, target: &ScopedReference, value: Value) -> Result<()> {
        let semantic_type = self.with_initial(target, |initial| initial.semantic_type)?;
        let coerced = coerce(semantic_type, &value);
        if coerced.is_invalid() {
            return Err(PropsheetError::InvalidValue(format!(
                "{} is not storable as a {}",
                value, semantic_type
            )));
        }
        self.with_initial_mut(target, |initial| initial.values.set(coerced))
    }

    /// Points the target's initial at a variable (or clears the link). The
    /// back-reference on the previously linked variable, if any, is dropped
    /// first. Reference cycles are not checked here; evaluation catches them.
    pub fn set_initial_variable(
        &self,
        target: &ScopedReference,
        variable: Option<ScopedReference>,
    ) -> Result<()> {
        if let Some(ref var) = variable {
            if var.kind != EntityKind::Variable {
                return Err(PropsheetError::InvalidValue(format!(
                    "{} cannot back an initial value",
                    var
                )));
            }
        }
        let previous = self.with_initial(target, |initial| initial.variable.clone())?;
        if let Some(ref old) = previous {
            self.unregister_assignment(old, target.id);
        }
        if let Some(ref var) = variable {
            self.with_variable_mut(var, |v| {
                v.assignments.insert(target.id, target.clone());
            })?;
        }
        self.with_initial_mut(target, |initial| initial.variable = variable)
    }

    /// Converts a variable-backed initial back into a literal: the variable's
    /// current resolved value and type are snapshotted into the local slots
    /// before the link and its back-reference are dropped.
    pub fn detach_variable(&self, target: &ScopedReference) -> Result<()> {
        let linked = self.with_initial(target, |initial| initial.variable.clone())?;
        let Some(var) = linked else {
            return Err(PropsheetError::InvalidValue(format!(
                "{} has no variable attached",
                target
            )));
        };
        let value = Engine::new(self).evaluate(&var)?;
        let semantic_type = value.semantic_type();
        self.with_initial_mut(target, |initial| {
            initial.semantic_type = semantic_type;
            initial.values.set(value);
            initial.variable = None;
        })?;
        self.unregister_assignment(&var, target.id);
        debug!(%target, %var, "detached variable");
        Ok(())
    }

    pub fn set_enumerated_value(
        &self,
        owner: &ScopedReference,
        transform_id: Id,
        argument_id: Id,
        option: &str,
    ) -> Result<()> {
        self.with_transforms_mut(owner, |transforms| {
            let Some(transform) = transforms.iter_mut().find(|t| t.id == transform_id) else {
                return Err(unknown_transform(owner, transform_id));
            };
            for arg in transform.args.iter_mut() {
                if let Argument::Enumerated(enumerated) = arg {
                    if enumerated.id == argument_id {
                        return enumerated.set_value(option);
                    }
                }
            }
            Err(PropsheetError::InvalidOption {
                argument: format!("argument {} of transform {}", argument_id, transform_id),
                option: option.to_owned(),
            })
        })?
    }

    // ------------- transform lifecycle -------------
    /// Instantiates a transform from the registry and appends it. The
    /// transform's argument sub-properties are scoped under the owner's id.
    pub fn add_transform(&self, target: &ScopedReference, name: TransformName) -> Result<Id> {
        let scope = target.id.to_string();
        let transform = transforms::instantiate(name, &scope, self);
        let id = transform.id;
        self.with_transforms_mut(target, |transforms| transforms.push(transform))?;
        debug!(%target, %name, id, "added transform");
        Ok(id)
    }

    pub fn insert_transform(
        &self,
        target: &ScopedReference,
        transform: Transform,
        index: usize,
    ) -> Result<()> {
        self.with_transforms_mut(target, |transforms| {
            if index > transforms.len() {
                return Err(PropsheetError::InvalidValue(format!(
                    "transform index {} out of bounds",
                    index
                )));
            }
            transforms.insert(index, transform);
            Ok(())
        })?
    }

    /// Removes a transform and discards its owned argument sub-properties
    /// from the scope table, recursively.
    pub fn remove_transform(&self, target: &ScopedReference, transform_id: Id) -> Result<()> {
        let removed = self.with_transforms_mut(target, |transforms| {
            let position = transforms.iter().position(|t| t.id == transform_id);
            position.map(|p| transforms.remove(p))
        })?;
        let Some(transform) = removed else {
            return Err(unknown_transform(target, transform_id));
        };
        self.discard_transform(transform);
        Ok(())
    }

    /// Removes and reinserts at the index, clamped to the remaining length.
    pub fn move_transform(
        &self,
        target: &ScopedReference,
        transform_id: Id,
        index: usize,
    ) -> Result<()> {
        self.with_transforms_mut(target, |transforms| {
            let Some(position) = transforms.iter().position(|t| t.id == transform_id) else {
                return Err(unknown_transform(target, transform_id));
            };
            let transform = transforms.remove(position);
            transforms.insert(index.min(transforms.len()), transform);
            Ok(())
        })?
    }

    /// Clones a transform (fresh ids throughout, argument sub-properties
    /// copied by value) and inserts the copy right after the given index.
    pub fn duplicate_transform(
        &self,
        target: &ScopedReference,
        transform_id: Id,
        index: usize,
    ) -> Result<Id> {
        let source = self.with_transforms_mut(target, |transforms| {
            transforms.iter().find(|t| t.id == transform_id).cloned()
        })?;
        let Some(source) = source else {
            return Err(unknown_transform(target, transform_id));
        };
        let copy = self.clone_transform(&source, &source.scope)?;
        let copy_id = copy.id;
        self.with_transforms_mut(target, |transforms| {
            let at = (index + 1).min(transforms.len());
            transforms.insert(at, copy);
        })?;
        Ok(copy_id)
    }

    // ------------- variable lifecycle -------------
    /// Deletes a variable. Every entity whose initial points at it is
    /// detached first, so each of them keeps a literal snapshot of the
    /// variable's last resolved value.
    pub fn delete_variable(&self, target: &ScopedReference) -> Result<()> {
        let assignees: Vec<ScopedReference> =
            self.with_variable(target, |v| v.assignments.values().cloned().collect())?;
        for assignee in assignees {
            match self.detach_variable(&assignee) {
                Ok(()) => (),
                // the reverse-index is derived; a stale entry is dropped, not fatal
                Err(PropsheetError::UnknownEntity { .. }) => (),
                Err(e) => return Err(e),
            }
        }
        let removed = self.variables.lock().unwrap().remove(&target.scope, target.id);
        let Some(variable) = removed else {
            return Err(unknown(EntityKind::Variable, target));
        };
        if let Some(ref linked) = variable.initial.variable {
            self.unregister_assignment(linked, variable.id);
        }
        {
            let mut generator = self.id_generator.lock().unwrap();
            generator.release(variable.id);
            generator.release(variable.initial.id);
        }
        for transform in variable.transforms {
            self.discard_transform(transform);
        }
        debug!(%target, "deleted variable");
        Ok(())
    }

    // ------------- selection -------------
    pub fn select(&self, selection: Option<ScopedReference>) {
        *self.selected.lock().unwrap() = selection;
    }
    pub fn selection(&self) -> Option<ScopedReference> {
        self.selected.lock().unwrap().clone()
    }

    // ------------- internal plumbing -------------
    // Dropping a back-reference must tolerate a missing variable: the
    // reverse-index is derived and a stale link is simply gone already.
    fn unregister_assignment(&self, variable: &ScopedReference, assignee: Id) {
        let mut keeper = self.variables.lock().unwrap();
        if let Some(v) = keeper.get_mut(&variable.scope, variable.id) {
            v.assignments.remove(&assignee);
        }
    }

    fn discard_transform(&self, transform: Transform) {
        self.id_generator.lock().unwrap().release(transform.id);
        for arg in transform.args {
            match arg {
                Argument::Enumerated(enumerated) => {
                    self.id_generator.lock().unwrap().release(enumerated.id);
                }
                Argument::Property(reference) => self.discard_property_tree(&reference),
            }
        }
    }

    fn discard_property_tree(&self, target: &ScopedReference) {
        let removed = self.properties.lock().unwrap().remove(&target.scope, target.id);
        let Some(property) = removed else { return };
        if let Some(ref linked) = property.initial.variable {
            self.unregister_assignment(linked, property.id);
        }
        {
            let mut generator = self.id_generator.lock().unwrap();
            generator.release(property.id);
            generator.release(property.initial.id);
        }
        for transform in property.transforms {
            self.discard_transform(transform);
        }
    }

    fn clone_transform(&self, source: &Transform, scope: &str) -> Result<Transform> {
        let mut args = Vec::with_capacity(source.args.len());
        for arg in &source.args {
            args.push(match arg {
                Argument::Enumerated(enumerated) => {
                    let mut copy = enumerated.clone();
                    copy.id = self.generate_id();
                    Argument::Enumerated(copy)
                }
                Argument::Property(reference) => {
                    Argument::Property(self.clone_property_tree(reference, scope)?)
                }
            });
        }
        Ok(Transform {
            id: self.generate_id(),
            name: source.name,
            scope: scope.to_owned(),
            input_type: source.input_type,
            output_type: source.output_type,
            function: source.function,
            args,
            returned_value: None,
        })
    }

    fn clone_property_tree(
        &self,
        source_ref: &ScopedReference,
        scope: &str,
    ) -> Result<ScopedReference> {
        let source = self.property(source_ref)?;
        let id = self.generate_id();
        let mut initial = source.initial.clone();
        initial.id = self.generate_id();
        // a copied variable link is a fresh assignment on that variable
        if let Some(ref linked) = initial.variable {
            let copy_ref = ScopedReference::property(scope, id);
            self.with_variable_mut(linked, |v| {
                v.assignments.insert(id, copy_ref.clone());
            })?;
        }
        let child_scope = id.to_string();
        let mut transforms = Vec::with_capacity(source.transforms.len());
        for transform in &source.transforms {
            transforms.push(self.clone_transform(transform, &child_scope)?);
        }
        let copy = Property {
            id,
            name: source.name.clone(),
            scope: scope.to_owned(),
            semantic_type: source.semantic_type,
            initial,
            transforms,
            error: None,
            warning: None,
        };
        self.properties.lock().unwrap().keep(scope, id, copy);
        Ok(ScopedReference::property(scope, id))
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

fn unknown(kind: EntityKind, target: &ScopedReference) -> PropsheetError {
    PropsheetError::UnknownEntity {
        kind: kind.label(),
        id: target.id,
        scope: target.scope.clone(),
    }
}

fn unknown_transform(target: &ScopedReference, transform_id: Id) -> PropsheetError {
    PropsheetError::UnknownEntity {
        kind: "transform",
        id: transform_id,
        scope: target.scope.clone(),
    }
}
