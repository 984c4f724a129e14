pub mod consolidate;
pub mod ports;
