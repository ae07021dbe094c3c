pub mod config;
pub mod estimate;
pub mod history;
pub mod providers;
pub mod send;
