// Define data types exchanged with the simulator
//
// Coordinates are NED (north, east, down) in the simulator's local frame.

use std::fmt;
use std::ops::{Add, Mul};
use std::str::FromStr;

use rmpv::Value;
use serde::{Deserialize, Serialize};

/// 3D vector as AirSim sends it (`x_val` = north, `y_val` = east, `z_val` = down)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Vector3r {
    pub x_val: f32,
    pub y_val: f32,
    pub z_val: f32,
}

impl Vector3r {
    pub const fn new(north: f32, east: f32, down: f32) -> Self {
        Self {
            x_val: north,
            y_val: east,
            z_val: down,
        }
    }

    pub fn north(&self) -> f32 {
        self.x_val
    }

    pub fn east(&self) -> f32 {
        self.y_val
    }

    pub fn down(&self) -> f32 {
        self.z_val
    }
}

impl Add for Vector3r {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::new(
            self.x_val + rhs.x_val,
            self.y_val + rhs.y_val,
            self.z_val + rhs.z_val,
        )
    }
}

impl Mul<f32> for Vector3r {
    type Output = Self;

    fn mul(self, rhs: f32) -> Self {
        Self::new(self.x_val * rhs, self.y_val * rhs, self.z_val * rhs)
    }
}

/// Orientation quaternion
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Quaternionr {
    pub w_val: f32,
    pub x_val: f32,
    pub y_val: f32,
    pub z_val: f32,
}

impl Default for Quaternionr {
    fn default() -> Self {
        Self {
            w_val: 1.0,
            x_val: 0.0,
            y_val: 0.0,
            z_val: 0.0,
        }
    }
}

impl Quaternionr {
    /// Quaternion for a pure rotation about the down axis
    pub fn from_yaw_degrees(yaw: f32) -> Self {
        let half = yaw.to_radians() / 2.0;
        Self {
            w_val: half.cos(),
            x_val: 0.0,
            y_val: 0.0,
            z_val: half.sin(),
        }
    }

    /// Yaw (rotation about the down axis) in degrees, in [-180, 180]
    pub fn yaw_degrees(&self) -> f32 {
        let Self {
            w_val: w,
            x_val: x,
            y_val: y,
            z_val: z,
        } = *self;
        let siny_cosp = 2.0 * (w * z + x * y);
        let cosy_cosp = 1.0 - 2.0 * (y * y + z * z);
        siny_cosp.atan2(cosy_cosp).to_degrees()
    }
}

/// Estimated kinematics; only the pose is read by the teleop core
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct KinematicsState {
    pub position: Vector3r,
    pub orientation: Quaternionr,
    pub linear_velocity: Vector3r,
    pub angular_velocity: Vector3r,
}

/// Whether the vehicle rests on the ground
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(try_from = "u8")]
pub enum LandedState {
    #[default]
    Landed = 0,
    Flying = 1,
}

impl TryFrom<u8> for LandedState {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Landed),
            1 => Ok(Self::Flying),
            other => Err(format!("unknown landed state {}", other)),
        }
    }
}

/// Subset of AirSim's `MultirotorState` used here. Unknown fields are ignored.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct MultirotorState {
    pub kinematics_estimated: KinematicsState,
    pub landed_state: LandedState,
    pub timestamp: u64,
}

impl MultirotorState {
    pub fn pose(&self) -> Pose {
        Pose {
            position: self.kinematics_estimated.position,
            orientation: self.kinematics_estimated.orientation,
        }
    }
}

/// Snapshot of position + orientation
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Pose {
    pub position: Vector3r,
    pub orientation: Quaternionr,
}

impl fmt::Display for Pose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[Position(n: {:.2}, e: {:.2}, d: {:.2}, yaw: {:.1})]",
            self.position.north(),
            self.position.east(),
            self.position.down(),
            self.orientation.yaw_degrees()
        )
    }
}

/// Heading behaviour while moving
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrivetrainType {
    /// Heading stays independently controllable
    MaxDegreeOfFreedom = 0,
    /// Vehicle turns to face its direction of travel
    ForwardOnly = 1,
}

impl From<DrivetrainType> for Value {
    fn from(drivetrain: DrivetrainType) -> Self {
        Value::from(drivetrain as u8)
    }
}

/// Yaw target used during a move
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct YawMode {
    pub is_rate: bool,
    pub yaw_or_rate: f32,
}

// AirSim expects a map keyed by field name
impl From<YawMode> for Value {
    fn from(mode: YawMode) -> Self {
        Value::Map(vec![
            (Value::from("is_rate"), Value::from(mode.is_rate)),
            (Value::from("yaw_or_rate"), Value::from(mode.yaw_or_rate)),
        ])
    }
}

/// Weather effects the simulator can render
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeatherParameter {
    Rain = 0,
    Roadwetness = 1,
    Snow = 2,
    RoadSnow = 3,
    MapleLeaf = 4,
    RoadLeaf = 5,
    Dust = 6,
    Fog = 7,
}

impl FromStr for WeatherParameter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "rain" => Ok(Self::Rain),
            "roadwetness" => Ok(Self::Roadwetness),
            "snow" => Ok(Self::Snow),
            "roadsnow" => Ok(Self::RoadSnow),
            "mapleleaf" => Ok(Self::MapleLeaf),
            "roadleaf" => Ok(Self::RoadLeaf),
            "dust" => Ok(Self::Dust),
            "fog" => Ok(Self::Fog),
            other => Err(format!("unknown weather parameter '{}'", other)),
        }
    }
}

/// A fully specified move-to-position request
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionCommand {
    pub target: Vector3r,
    pub velocity: f32,
    pub timeout_sec: f32,
    pub drivetrain: DrivetrainType,
    pub yaw_mode: YawMode,
    pub lookahead: f32,
    pub adaptive_lookahead: f32,
}

impl MotionCommand {
    pub fn new(target: Vector3r, velocity: f32, drivetrain: DrivetrainType, timeout_sec: f32) -> Self {
        Self {
            target,
            velocity,
            timeout_sec,
            drivetrain,
            yaw_mode: YawMode::default(),
            lookahead: -1.0,
            adaptive_lookahead: 1.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_value(landed: u8) -> Value {
        let vector = |x: f32, y: f32, z: f32| {
            Value::Map(vec![
                (Value::from("x_val"), Value::from(x)),
                (Value::from("y_val"), Value::from(y)),
                (Value::from("z_val"), Value::from(z)),
            ])
        };
        let orientation = Value::Map(vec![
            (Value::from("w_val"), Value::from(1.0f32)),
            (Value::from("x_val"), Value::from(0.0f32)),
            (Value::from("y_val"), Value::from(0.0f32)),
            (Value::from("z_val"), Value::from(0.0f32)),
        ]);
        Value::Map(vec![
            (
                Value::from("kinematics_estimated"),
                Value::Map(vec![
                    (Value::from("position"), vector(1.0, -2.0, -3.5)),
                    (Value::from("orientation"), orientation),
                    (Value::from("linear_velocity"), vector(0.0, 0.0, 0.0)),
                    (Value::from("angular_velocity"), vector(0.0, 0.0, 0.0)),
                ]),
            ),
            (Value::from("landed_state"), Value::from(landed)),
            (Value::from("timestamp"), Value::from(12345u64)),
            (Value::from("ready"), Value::from(true)),
            (Value::from("ready_message"), Value::from("")),
        ])
    }

    #[test]
    fn test_multirotor_state_from_msgpack() {
        let state: MultirotorState = rmpv::ext::from_value(state_value(1)).unwrap();
        assert_eq!(state.landed_state, LandedState::Flying);
        assert_eq!(state.timestamp, 12345);
        assert_eq!(
            state.kinematics_estimated.position,
            Vector3r::new(1.0, -2.0, -3.5)
        );
    }

    #[test]
    fn test_unknown_landed_state_rejected() {
        let result: Result<MultirotorState, _> = rmpv::ext::from_value(state_value(7));
        assert!(result.is_err());
    }

    #[test]
    fn test_yaw_from_quaternion() {
        assert!(Quaternionr::default().yaw_degrees().abs() < 1e-4);
        assert!((Quaternionr::from_yaw_degrees(90.0).yaw_degrees() - 90.0).abs() < 1e-3);
        assert!((Quaternionr::from_yaw_degrees(-90.0).yaw_degrees() + 90.0).abs() < 1e-3);
    }

    #[test]
    fn test_pose_display() {
        let pose = Pose {
            position: Vector3r::new(2.0, -1.5, -10.0),
            orientation: Quaternionr::from_yaw_degrees(90.0),
        };
        assert_eq!(
            pose.to_string(),
            "[Position(n: 2.00, e: -1.50, d: -10.00, yaw: 90.0)]"
        );
    }

    #[test]
    fn test_yaw_mode_encodes_as_map() {
        let value = Value::from(YawMode::default());
        let map = value.as_map().unwrap();
        assert_eq!(map[0].0.as_str(), Some("is_rate"));
        assert_eq!(map[0].1.as_bool(), Some(false));
        assert_eq!(map[1].0.as_str(), Some("yaw_or_rate"));
    }

    #[test]
    fn test_weather_parameter_names() {
        assert_eq!("rain".parse::<WeatherParameter>(), Ok(WeatherParameter::Rain));
        assert_eq!("Fog".parse::<WeatherParameter>(), Ok(WeatherParameter::Fog));
        assert!("hail".parse::<WeatherParameter>().is_err());
    }
}
