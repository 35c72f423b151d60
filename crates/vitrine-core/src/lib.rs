//! # vitrine-core
//!
//! Foundation types for the Vitrine session state engine.
//!
//! This crate provides the shared vocabulary the engine and its callers speak:
//!
//! - **Entities**: [`Product`], [`Service`] and [`EntityRef`] as held in the Data zone
//! - **Formations**: the rendering instruction tree stored in the Template zone
//! - **Zones**: [`SessionState`] with its Data, Template and View zones plus the view stack
//! - **Deltas**: immutable change records ([`Delta`]) and the caller-facing [`DeltaInfo`]
//! - **Injection seams**: [`Clock`] and [`IdGenerator`] replace ambient time and randomness
//! - **Logging**: `tracing` subscriber setup and in-memory capture for tests

#![deny(unsafe_code)]

#[macro_use]
mod macros;

pub mod clock;
pub mod delta;
pub mod entities;
pub mod errors;
pub mod formation;
pub mod ids;
pub mod logging;
pub mod zones;

pub use clock::{Clock, ManualClock, SystemClock};
pub use delta::{
    Action, ActionType, DataSnapshot, Delta, DeltaInfo, DeltaSource, DeltaType, ResultMeta,
    TriggerType, ViewChange,
};
pub use entities::{EntityRef, EntityType, Product, Service};
pub use errors::{CoreError, Result};
pub use formation::{
    Atom, AtomSlot, AtomType, FieldSpec, Formation, FormationMode, GridConfig, RenderConfig,
    Widget, WidgetSize,
};
pub use ids::{IdGenerator, SequentialIds, UuidIds};
pub use zones::{
    DataPayload, SessionState, StateCurrent, StateData, StateMeta, ViewMode, ViewSnapshot,
    ViewState,
};
