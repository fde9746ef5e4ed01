pub mod request_telemetry;
