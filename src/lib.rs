// Keyboard teleoperation for an AirSim multirotor

pub mod airsim;
pub mod commander;
pub mod config;
pub mod input;
pub mod messages;
pub mod rpc;
pub mod simulator;
pub mod teleop;
