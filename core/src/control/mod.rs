//! Session & acquisition control.

pub mod acquisition;
pub mod blocking;
pub mod catalog;
pub mod config_model;
pub mod dispatch;
pub mod events;
pub mod session;

pub use acquisition::{
    AcquisitionHandle, AcquisitionState, AcquisitionTimeouts, AcquisitionWorkflow, BurstOutcome,
};
pub use blocking::BlockingSession;
pub use catalog::{BurstCatalog, CatalogEntry};
pub use config_model::ConfigModel;
pub use dispatch::{spawn_dispatcher, Command, ConsoleHandle};
pub use events::{ConsoleEvent, EventBus, Operation};
pub use session::{Session, SessionController};
