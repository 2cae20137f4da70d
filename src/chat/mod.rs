//! Screening dialog: stages, rules, the controller, and its HTTP surface.

pub mod controller;
pub mod options;
pub mod qualification;
pub mod registry;
pub mod routes;
pub mod session;
pub mod stage;
pub mod validation;
pub mod ws;

pub use controller::{ControllerDeps, DialogAction, DialogController, StageView, Step};
pub use options::ChatOptions;
pub use registry::SessionRegistry;
pub use stage::ChatStage;
