//! Process wiring: builds every subsystem from the configuration and runs them until a
//! shutdown signal.

pub mod controller_handler;

pub use controller_handler::Controller;
