pub mod telemetry_listener;
