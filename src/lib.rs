//! Shared glue for the `export_model` and `classify` binaries.

pub mod telemetry;
