//! Core of the ApRES survey console.
//!
//! A [`SessionController`] owns the link to one instrument and drives the
//! configuration model, the housekeeping poller, the acquisition workflows
//! and the local burst catalog. Results are published as
//! [`ConsoleEvent`]s; front-ends issue intents through a
//! [`ConsoleHandle`] or, in scripts, a [`BlockingSession`].

pub mod control;
pub mod instrument;
pub mod math;
pub mod prelude;
pub mod processing;
pub mod settings;
pub mod telemetry;
pub mod transport;

pub use control::{
    spawn_dispatcher, BlockingSession, ConsoleEvent, ConsoleHandle, Session, SessionController,
};
pub use prelude::{ConsoleError, ConsoleResult};
pub use settings::ControllerSettings;
