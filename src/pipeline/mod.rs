pub mod monotonic;
pub mod reconcile;
pub mod stage;
pub mod table;
pub mod timeline;
