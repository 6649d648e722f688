//! RoboFleet - Warehouse robot fleet simulation and dispatch engine

pub mod core;
pub mod events;
pub mod grid;
pub mod llm;
pub mod robot;
pub mod sim;
pub mod tasks;
pub mod workflow;
