pub mod constants;
pub mod core;
pub mod helper;
pub mod telemetry;
