// Flight bootstrap and keyboard teleop loop
//
// The loop has no fixed rate: each iteration waits only as long as the
// keyboard takes to deliver input. Translations are fire-and-forget; turns
// block the loop until the rotation finishes.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::airsim::MultirotorClient;
use crate::commander::Commander;
use crate::config::{Args, ConfigError, SHUTDOWN_HOVER_TIMEOUT, TAKEOFF_TIMEOUT_SEC, WeatherSetting};
use crate::input::{Action, Keyboard, TerminalKeyboard, select_actions};
use crate::messages::LandedState;
use crate::rpc::RpcError;
use crate::simulator::Simulator;

#[derive(Debug, thiserror::Error)]
pub enum TeleopError {
    #[error("Simulator error: {0}")]
    Rpc(#[from] RpcError),

    #[error("{0}")]
    Config(#[from] ConfigError),

    #[error("Terminal error: {0}")]
    Terminal(#[from] std::io::Error),

    #[error("Take off failed: vehicle still landed {0:?} after takeoff")]
    TakeoffFailed(Duration),
}

/// Settings for getting the vehicle airborne
#[derive(Debug, Clone)]
pub struct FlightConfig {
    pub weather: Vec<WeatherSetting>,
    pub takeoff_timeout_sec: f32,
    pub settle: Duration,
}

impl From<&Args> for FlightConfig {
    fn from(args: &Args) -> Self {
        Self {
            weather: args.weather_settings(),
            takeoff_timeout_sec: TAKEOFF_TIMEOUT_SEC,
            settle: Duration::from_millis(args.settle_ms),
        }
    }
}

/// Take control of the vehicle and get it hovering
///
/// Fails with [`TeleopError::TakeoffFailed`] if the vehicle is still landed
/// once `settle` has passed.
pub async fn prepare_flight<S: Simulator>(sim: &S, flight: &FlightConfig) -> Result<(), TeleopError> {
    sim.confirm_connection().await?;
    sim.enable_api_control(true).await?;
    if !sim.arm_disarm(true).await? {
        warn!("Simulator refused to arm");
    }

    if !flight.weather.is_empty() {
        sim.enable_weather(true).await?;
        for setting in &flight.weather {
            info!("Weather {:?} = {}", setting.parameter, setting.value);
            sim.set_weather_parameter(setting.parameter, setting.value).await?;
        }
    }

    let state = sim.get_multirotor_state().await?;
    if state.landed_state == LandedState::Landed {
        info!("Taking off");
        sim.takeoff(flight.takeoff_timeout_sec).await?.join().await?;
    } else {
        sim.hover().await?.join().await?;
    }

    tokio::time::sleep(flight.settle).await;

    let state = sim.get_multirotor_state().await?;
    if state.landed_state == LandedState::Landed {
        return Err(TeleopError::TakeoffFailed(flight.settle));
    }
    Ok(())
}

/// Poll the keyboard and dispatch commands until `cancel` fires
///
/// Returns the number of completed iterations.
pub async fn input_loop<S, K>(
    commander: &Commander<S>,
    keyboard: &mut K,
    cancel: &CancellationToken,
) -> Result<u64, TeleopError>
where
    S: Simulator,
    K: Keyboard,
{
    let mut iterations = 0;

    while !cancel.is_cancelled() {
        keyboard.refresh()?;
        if cancel.is_cancelled() {
            break;
        }

        for action in select_actions(&*keyboard) {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(iterations),
                result = dispatch(commander, action) => result?,
            }
        }

        iterations += 1;
        tokio::task::yield_now().await;
    }

    Ok(iterations)
}

async fn dispatch<S: Simulator>(commander: &Commander<S>, action: Action) -> Result<(), RpcError> {
    info!("{}", action);
    let motion = commander.motion();
    match action {
        Action::Move(direction) => {
            // Not awaited: the simulator replaces or queues in-flight moves
            let _handle = commander.translate(direction, motion.loop_step).await?;
        }
        Action::TurnRight => {
            commander.turn_right(motion.turn_degrees).await?;
        }
        Action::TurnLeft => {
            commander.turn_left(motion.turn_degrees).await?;
        }
    }
    Ok(())
}

/// Connect, take off, and fly from the keyboard until `cancel` fires
pub async fn run(args: Args, cancel: CancellationToken) -> Result<(), TeleopError> {
    let motion = args.motion_config()?;

    let setup = async {
        info!("Connecting to AirSim at {}:{}...", args.host, args.port);
        let client = MultirotorClient::connect((args.host.as_str(), args.port), &args.vehicle).await?;
        prepare_flight(&client, &FlightConfig::from(&args)).await?;
        Ok::<_, TeleopError>(client)
    };
    let client = tokio::select! {
        _ = cancel.cancelled() => {
            info!("Cancelled during startup");
            return Ok(());
        }
        client = setup => client?,
    };

    let commander = Commander::new(client, motion);
    commander.print_pose().await?;

    info!("Controls: arrows=north/south/east/west, W/S=up/down, A/D=turn, Q/Esc=quit");
    let mut keyboard = TerminalKeyboard::open(
        Duration::from_millis(args.hold_ms),
        Duration::from_millis(args.repeat_delay_ms),
        Duration::from_millis(args.poll_ms),
        &cancel,
    )?;

    let result = input_loop(&commander, &mut keyboard, &cancel).await;
    // Restore the terminal before any further output
    drop(keyboard);

    info!("Teleop stopped, hovering");
    match tokio::time::timeout(SHUTDOWN_HOVER_TIMEOUT, commander.hover()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!("Hover on shutdown failed: {}", e),
        Err(_) => warn!("Hover on shutdown timed out"),
    }

    result.map(|iterations| info!("Input loop ran {} iterations", iterations))
}
