// Web Interface module root
pub mod connection_hub;
pub mod protocol;
pub mod routes;
pub mod types;
pub mod web_server;
pub mod websocket;

// Re-export commonly used items
pub use connection_hub::{ConnectionHub, LivenessHandle, Outbound};
pub use protocol::{ClientMessage, ServerMessage};
pub use web_server::WebServer;
