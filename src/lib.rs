//! Propsheet – an interactive document-property model.
//!
//! Propsheet centers on two constructs and the engine that ties them together:
//! * A [`construct::Property`] is a named, typed value slot: an initial value
//!   plus an ordered chain of transforms deriving a final value of the
//!   property's declared type.
//! * A [`construct::Variable`] is the same thing with a floating output type;
//!   other entities may point their initial value at it.
//! * An [`construct::Initial`] supplies the pre-transform value: either a
//!   literal (one slot per semantic type, so switching types loses nothing)
//!   or a delegation to a variable.
//! * A [`construct::Transform`] pairs a pure registry function with its own
//!   argument sub-properties, which are full properties in their own right —
//!   transform chains, variable links and all.
//!
//! Entities live in scope-keyed "keeper" tables owned by a
//! [`construct::Document`], the store object every engine and mutation call
//! borrows explicitly. `"global"` is the root scope; a property's transforms
//! keep their argument sub-properties in a scope named after the owning
//! property's id, which is what makes drill-down editing work.
//!
//! ## Modules
//! * [`construct`] – Entities, keepers, the `Document` store and its
//!   command surface (create, rename, transform lifecycle, variable
//!   attach/detach/delete with cascading detachment).
//! * [`datatype`] – The three semantic types, the `Value` union and the
//!   total coercion rules between them.
//! * [`transforms`] – The closed 25-entry transform registry: catalog,
//!   instantiation and the pure functions themselves.
//! * [`evaluate`] – The pull-based evaluation engine with reference-cycle
//!   detection and fault capture.
//! * [`persist`] – JSON snapshot save/load with registry re-binding.
//!
//! ## Evaluation
//! Evaluation is synchronous, single-threaded and recomputed on every read.
//! Faults never escape as panics or `Err`: reference loops, failing
//! transforms and final-type mismatches are captured on the evaluated entity
//! as `error`/`warning` records while the call returns a valid, typed
//! fallback value.
//!
//! ## Quick Start
//! ```
//! use propsheet::construct::{Document, GLOBAL_SCOPE};
//! use propsheet::datatype::{SemanticType, Value};
//! use propsheet::evaluate::Engine;
//! use propsheet::transforms::TransformName;
//!
//! let document = Document::new();
//! let stars = document.create_property(
//!     GLOBAL_SCOPE, "Stars", SemanticType::Number, Value::from(0.0));
//! document.add_transform(&stars, TransformName::Add).unwrap();
//! let value = Engine::new(&document).evaluate(&stars).unwrap();
//! assert_eq!(value, Value::Number(10.0));
//! ```

pub mod construct;
pub mod datatype;
pub mod error;
pub mod evaluate;
pub mod persist;
pub mod transforms;
