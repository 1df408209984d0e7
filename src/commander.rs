// Relative motion commands for the vehicle
//
// Every command re-reads the current pose and offsets it by a fixed step,
// so repeated presses compound real displacement rather than computed deltas.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::MotionConfig;
use crate::messages::{DrivetrainType, MotionCommand, Pose, Vector3r};
use crate::rpc::CallHandle;
use crate::simulator::{Result, Simulator};

/// Distance and speed of one translation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Step {
    /// Meters along the chosen axis
    pub distance: f32,
    /// Meters per second
    pub velocity: f32,
}

impl Step {
    /// Default for horizontal moves and climbing
    pub const DEFAULT: Step = Step::new(2.0, 3.0);
    /// Default for descending
    pub const DESCEND: Step = Step::new(20.0, 5.0);

    pub const fn new(distance: f32, velocity: f32) -> Self {
        Self { distance, velocity }
    }
}

/// Axis and sense of a translation in the NED frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    North,
    South,
    East,
    West,
    Up,
    Down,
}

impl Direction {
    /// Unit offset in NED coordinates (up is negative down)
    pub fn unit(self) -> Vector3r {
        match self {
            Direction::North => Vector3r::new(1.0, 0.0, 0.0),
            Direction::South => Vector3r::new(-1.0, 0.0, 0.0),
            Direction::East => Vector3r::new(0.0, 1.0, 0.0),
            Direction::West => Vector3r::new(0.0, -1.0, 0.0),
            Direction::Up => Vector3r::new(0.0, 0.0, -1.0),
            Direction::Down => Vector3r::new(0.0, 0.0, 1.0),
        }
    }

    /// Vertical moves keep the current heading
    pub fn drivetrain(self) -> DrivetrainType {
        match self {
            Direction::Up | Direction::Down => DrivetrainType::MaxDegreeOfFreedom,
            _ => DrivetrainType::ForwardOnly,
        }
    }

    /// Step used when the caller does not pick one
    pub fn default_step(self) -> Step {
        match self {
            Direction::Down => Step::DESCEND,
            _ => Step::DEFAULT,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Direction::North => "north",
            Direction::South => "south",
            Direction::East => "east",
            Direction::West => "west",
            Direction::Up => "up",
            Direction::Down => "down",
        };
        f.write_str(name)
    }
}

/// Turns directional intents into simulator requests
pub struct Commander<S> {
    sim: S,
    motion: MotionConfig,
}

impl<S: Simulator> Commander<S> {
    pub fn new(sim: S, motion: MotionConfig) -> Self {
        Self { sim, motion }
    }

    pub fn simulator(&self) -> &S {
        &self.sim
    }

    pub fn motion(&self) -> &MotionConfig {
        &self.motion
    }

    /// Position from a fresh state query
    pub async fn current_position(&self) -> Result<Vector3r> {
        Ok(self.sim.get_multirotor_state().await?.pose().position)
    }

    /// Submit a move `step.distance` meters along `direction` from the current position
    ///
    /// Returns as soon as the request is sent. Drop the handle to leave the
    /// move running, or join it to wait for arrival.
    pub async fn translate(&self, direction: Direction, step: Step) -> Result<CallHandle> {
        let position = self.current_position().await?;
        let command = MotionCommand::new(
            position + direction.unit() * step.distance,
            step.velocity,
            direction.drivetrain(),
            self.motion.move_timeout_sec,
        );
        debug!("Moving {} to {:?}", direction, command.target);
        self.sim.move_to_position(&command).await
    }

    pub async fn move_north(&self, step: Step) -> Result<CallHandle> {
        self.translate(Direction::North, step).await
    }

    pub async fn move_south(&self, step: Step) -> Result<CallHandle> {
        self.translate(Direction::South, step).await
    }

    pub async fn move_east(&self, step: Step) -> Result<CallHandle> {
        self.translate(Direction::East, step).await
    }

    pub async fn move_west(&self, step: Step) -> Result<CallHandle> {
        self.translate(Direction::West, step).await
    }

    pub async fn move_up(&self, step: Step) -> Result<CallHandle> {
        self.translate(Direction::Up, step).await
    }

    pub async fn move_down(&self, step: Step) -> Result<CallHandle> {
        self.translate(Direction::Down, step).await
    }

    /// Rotate to the configured absolute yaw (+90° by default), wait, then print the pose
    ///
    /// `_degrees` is accepted for interface compatibility; the target is
    /// absolute, not relative to the current heading.
    pub async fn turn_right(&self, _degrees: f32) -> Result<Pose> {
        self.rotate_and_report(self.motion.turn_yaw_deg).await
    }

    /// Rotate to the negated configured yaw (-90° by default), wait, then print the pose
    pub async fn turn_left(&self, _degrees: f32) -> Result<Pose> {
        self.rotate_and_report(-self.motion.turn_yaw_deg).await
    }

    async fn rotate_and_report(&self, yaw_deg: f32) -> Result<Pose> {
        self.sim.rotate_to_yaw(yaw_deg).await?.join().await?;
        self.print_pose().await
    }

    /// Log the current position and yaw, returning the pose shown
    pub async fn print_pose(&self) -> Result<Pose> {
        let pose = self.sim.get_multirotor_state().await?.pose();
        info!("{}", pose);
        Ok(pose)
    }

    /// Hold position, waiting until the simulator acknowledges
    pub async fn hover(&self) -> Result<()> {
        self.sim.hover().await?.join().await?;
        Ok(())
    }
}
