pub mod config;
pub mod controller;

pub use config::Outpost;
pub use controller::ProcessMode;
