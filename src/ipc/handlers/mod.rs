pub mod activity;
pub mod associations;
pub mod core;
pub mod tags;
