// Operations the teleop core consumes from the simulator
//
// `airsim::MultirotorClient` implements this over the network; tests use
// `testing::FakeSimulator`.

use crate::messages::{MotionCommand, MultirotorState, WeatherParameter};
use crate::rpc::{CallHandle, RpcError};

pub type Result<T> = std::result::Result<T, RpcError>;

/// Remote control surface of a simulated multirotor
///
/// Methods returning a [`CallHandle`] only submit the operation; the caller
/// decides whether to `join` it.
#[allow(async_fn_in_trait)]
pub trait Simulator {
    /// Check the connection and report client/server versions
    async fn confirm_connection(&self) -> Result<()>;

    async fn enable_api_control(&self, enabled: bool) -> Result<()>;

    /// Arm or disarm the motors; returns whether the simulator accepted it
    async fn arm_disarm(&self, arm: bool) -> Result<bool>;

    async fn enable_weather(&self, enabled: bool) -> Result<()>;

    /// Set one weather effect, `value` in [0, 1]
    async fn set_weather_parameter(&self, parameter: WeatherParameter, value: f32) -> Result<()>;

    /// Fresh state snapshot
    async fn get_multirotor_state(&self) -> Result<MultirotorState>;

    async fn takeoff(&self, timeout_sec: f32) -> Result<CallHandle>;

    async fn hover(&self) -> Result<CallHandle>;

    async fn move_to_position(&self, command: &MotionCommand) -> Result<CallHandle>;

    /// Rotate to an absolute yaw in degrees
    async fn rotate_to_yaw(&self, yaw_deg: f32) -> Result<CallHandle>;
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use rmpv::Value;
    use tokio::sync::oneshot;

    use super::*;
    use crate::messages::{LandedState, Quaternionr, Vector3r};
    use crate::rpc::Reply;

    /// Every call the fake has received, in order
    #[derive(Debug, Clone, PartialEq)]
    pub(crate) enum SimCall {
        ConfirmConnection,
        EnableApiControl(bool),
        ArmDisarm(bool),
        EnableWeather(bool),
        SetWeather(WeatherParameter, f32),
        GetState,
        Takeoff,
        Hover,
        Move(MotionCommand),
        Rotate(f32),
    }

    /// In-memory simulator with a single vehicle
    pub(crate) struct FakeSimulator {
        state: Mutex<MultirotorState>,
        calls: Mutex<Vec<SimCall>>,
        takeoff_lifts: bool,
        apply_moves: bool,
        hold_rotations: bool,
        held_rotation: Mutex<Option<(f32, oneshot::Sender<Reply>)>>,
        moves_in_flight: Mutex<Vec<oneshot::Sender<Reply>>>,
    }

    impl FakeSimulator {
        /// Vehicle on the ground at the origin
        pub(crate) fn landed() -> Self {
            Self {
                state: Mutex::new(MultirotorState::default()),
                calls: Mutex::new(Vec::new()),
                takeoff_lifts: true,
                apply_moves: false,
                hold_rotations: false,
                held_rotation: Mutex::new(None),
                moves_in_flight: Mutex::new(Vec::new()),
            }
        }

        /// Vehicle airborne at `position`
        pub(crate) fn flying_at(position: Vector3r) -> Self {
            let fake = Self::landed();
            {
                let mut state = fake.state.lock().unwrap();
                state.landed_state = LandedState::Flying;
                state.kinematics_estimated.position = position;
            }
            fake
        }

        /// Takeoff completes but the vehicle stays landed
        pub(crate) fn failing_takeoff(mut self) -> Self {
            self.takeoff_lifts = false;
            self
        }

        /// Moves finish instantly, teleporting the vehicle to the target
        pub(crate) fn with_applied_moves(mut self) -> Self {
            self.apply_moves = true;
            self
        }

        /// Rotations stay in flight until `finish_rotation`
        pub(crate) fn with_held_rotations(mut self) -> Self {
            self.hold_rotations = true;
            self
        }

        pub(crate) fn calls(&self) -> Vec<SimCall> {
            self.calls.lock().unwrap().clone()
        }

        pub(crate) fn moves(&self) -> Vec<MotionCommand> {
            self.calls()
                .into_iter()
                .filter_map(|call| match call {
                    SimCall::Move(command) => Some(command),
                    _ => None,
                })
                .collect()
        }

        pub(crate) fn rotations(&self) -> Vec<f32> {
            self.calls()
                .into_iter()
                .filter_map(|call| match call {
                    SimCall::Rotate(yaw) => Some(yaw),
                    _ => None,
                })
                .collect()
        }

        pub(crate) fn set_position(&self, position: Vector3r) {
            self.state.lock().unwrap().kinematics_estimated.position = position;
        }

        pub(crate) fn yaw_degrees(&self) -> f32 {
            self.state
                .lock()
                .unwrap()
                .kinematics_estimated
                .orientation
                .yaw_degrees()
        }

        /// Complete a held rotation; false if none was pending
        pub(crate) fn finish_rotation(&self) -> bool {
            let Some((yaw, tx)) = self.held_rotation.lock().unwrap().take() else {
                return false;
            };
            self.set_yaw(yaw);
            let _ = tx.send(Ok(Value::from(true)));
            true
        }

        fn set_yaw(&self, yaw: f32) {
            self.state.lock().unwrap().kinematics_estimated.orientation =
                Quaternionr::from_yaw_degrees(yaw);
        }

        fn record(&self, call: SimCall) {
            self.calls.lock().unwrap().push(call);
        }
    }

    impl Simulator for FakeSimulator {
        async fn confirm_connection(&self) -> Result<()> {
            self.record(SimCall::ConfirmConnection);
            Ok(())
        }

        async fn enable_api_control(&self, enabled: bool) -> Result<()> {
            self.record(SimCall::EnableApiControl(enabled));
            Ok(())
        }

        async fn arm_disarm(&self, arm: bool) -> Result<bool> {
            self.record(SimCall::ArmDisarm(arm));
            Ok(true)
        }

        async fn enable_weather(&self, enabled: bool) -> Result<()> {
            self.record(SimCall::EnableWeather(enabled));
            Ok(())
        }

        async fn set_weather_parameter(&self, parameter: WeatherParameter, value: f32) -> Result<()> {
            self.record(SimCall::SetWeather(parameter, value));
            Ok(())
        }

        async fn get_multirotor_state(&self) -> Result<MultirotorState> {
            self.record(SimCall::GetState);
            Ok(self.state.lock().unwrap().clone())
        }

        async fn takeoff(&self, _timeout_sec: f32) -> Result<CallHandle> {
            self.record(SimCall::Takeoff);
            if self.takeoff_lifts {
                let mut state = self.state.lock().unwrap();
                state.landed_state = LandedState::Flying;
                state.kinematics_estimated.position.z_val -= 1.6;
            }
            Ok(CallHandle::completed("takeoff", Ok(Value::from(true))))
        }

        async fn hover(&self) -> Result<CallHandle> {
            self.record(SimCall::Hover);
            Ok(CallHandle::completed("hover", Ok(Value::from(true))))
        }

        async fn move_to_position(&self, command: &MotionCommand) -> Result<CallHandle> {
            self.record(SimCall::Move(*command));
            if self.apply_moves {
                self.set_position(command.target);
                return Ok(CallHandle::completed("moveToPosition", Ok(Value::from(true))));
            }
            // Stays in flight for the life of the fake
            let (tx, handle) = CallHandle::channel("moveToPosition");
            self.moves_in_flight.lock().unwrap().push(tx);
            Ok(handle)
        }

        async fn rotate_to_yaw(&self, yaw_deg: f32) -> Result<CallHandle> {
            self.record(SimCall::Rotate(yaw_deg));
            if self.hold_rotations {
                let (tx, handle) = CallHandle::channel("rotateToYaw");
                *self.held_rotation.lock().unwrap() = Some((yaw_deg, tx));
                return Ok(handle);
            }
            self.set_yaw(yaw_deg);
            Ok(CallHandle::completed("rotateToYaw", Ok(Value::from(true))))
        }
    }
}
