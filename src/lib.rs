pub mod config;
pub mod error;
pub mod k8s;
pub mod report;
pub mod telemetry;
