pub mod csv;
pub mod dates;
pub mod error;
