pub mod configuration;
pub mod controller;
pub mod error_handling;
pub mod session_management;
pub mod storage;
pub mod transcoder_management;
pub mod web_interface;

#[cfg(test)]
mod test_support;
