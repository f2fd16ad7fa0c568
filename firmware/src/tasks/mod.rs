pub mod acquisition;
pub mod telemetry;
