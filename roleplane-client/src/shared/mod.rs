pub mod error;
pub mod wait;
