pub mod config;
pub mod error;
pub mod gate;
pub mod index;
pub mod io;
pub mod lock;
pub mod manifest;
pub mod migrations;
pub mod notes;
pub mod paths;
pub mod plan;
pub mod state_manager;
pub mod sync;
pub mod types;

pub use error::{Result, SessionError};
pub use state_manager::StateManager;
