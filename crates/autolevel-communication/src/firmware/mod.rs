//! Firmware implementations
//!
//! Supported controllers:
//! - Marlin: 3D printer firmware commonly used on small CNC routers

pub mod marlin;
