pub mod expiry_sweeper;

pub use expiry_sweeper::{spawn_expiry_sweeper, spawn_from_config, sweep_once};
