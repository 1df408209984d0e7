// AirSim multirotor client
//
// Maps the `Simulator` operations onto AirSim's RPC method names and
// argument order.

use rmpv::Value;
use tokio::net::ToSocketAddrs;
use tracing::{info, warn};

use crate::config::{
    CLIENT_VERSION, MIN_REQUIRED_SERVER_VERSION, ROTATE_MARGIN_DEG, ROTATE_TIMEOUT_SEC,
};
use crate::messages::{MotionCommand, MultirotorState, WeatherParameter};
use crate::rpc::{CallHandle, RpcClient};
use crate::simulator::{Result, Simulator};

/// Client for one AirSim multirotor
pub struct MultirotorClient {
    rpc: RpcClient,
    vehicle_name: String,
}

impl MultirotorClient {
    /// Connect to the simulator's RPC port
    ///
    /// An empty `vehicle_name` addresses the simulator's default vehicle.
    pub async fn connect(addr: impl ToSocketAddrs, vehicle_name: &str) -> Result<Self> {
        let rpc = RpcClient::connect(addr).await?;
        Ok(Self::with_rpc(rpc, vehicle_name))
    }

    pub fn with_rpc(rpc: RpcClient, vehicle_name: &str) -> Self {
        Self {
            rpc,
            vehicle_name: vehicle_name.to_string(),
        }
    }

    fn vehicle(&self) -> Value {
        Value::from(self.vehicle_name.as_str())
    }

    pub async fn ping(&self) -> Result<bool> {
        self.rpc.call_as("ping", vec![]).await
    }

    pub async fn server_version(&self) -> Result<i64> {
        self.rpc.call_as("getServerVersion", vec![]).await
    }

    pub async fn min_required_client_version(&self) -> Result<i64> {
        self.rpc.call_as("getMinRequiredClientVersion", vec![]).await
    }
}

impl Simulator for MultirotorClient {
    async fn confirm_connection(&self) -> Result<()> {
        if self.ping().await? {
            info!("Connected!");
        } else {
            warn!("Ping returned false!");
        }

        let server_ver = self.server_version().await?;
        let client_min_ver = self.min_required_client_version().await?;
        let ver_info = format!(
            "Client Ver:{} (Min Req: {}), Server Ver:{} (Min Req: {})",
            CLIENT_VERSION, client_min_ver, server_ver, MIN_REQUIRED_SERVER_VERSION
        );

        if server_ver < MIN_REQUIRED_SERVER_VERSION {
            warn!("{} AirSim server is of older version and not supported by this client", ver_info);
        } else if CLIENT_VERSION < client_min_ver {
            warn!("{} AirSim client is of older version and not supported by this server", ver_info);
        } else {
            info!("{}", ver_info);
        }
        Ok(())
    }

    async fn enable_api_control(&self, enabled: bool) -> Result<()> {
        self.rpc
            .call("enableApiControl", vec![Value::from(enabled), self.vehicle()])
            .await?;
        Ok(())
    }

    async fn arm_disarm(&self, arm: bool) -> Result<bool> {
        self.rpc
            .call_as("armDisarm", vec![Value::from(arm), self.vehicle()])
            .await
    }

    async fn enable_weather(&self, enabled: bool) -> Result<()> {
        self.rpc
            .call("simEnableWeather", vec![Value::from(enabled)])
            .await?;
        Ok(())
    }

    async fn set_weather_parameter(&self, parameter: WeatherParameter, value: f32) -> Result<()> {
        self.rpc
            .call(
                "simSetWeatherParameter",
                vec![Value::from(parameter as u8), Value::from(value)],
            )
            .await?;
        Ok(())
    }

    async fn get_multirotor_state(&self) -> Result<MultirotorState> {
        self.rpc
            .call_as("getMultirotorState", vec![self.vehicle()])
            .await
    }

    async fn takeoff(&self, timeout_sec: f32) -> Result<CallHandle> {
        self.rpc
            .call_async("takeoff", vec![Value::from(timeout_sec), self.vehicle()])
            .await
    }

    async fn hover(&self) -> Result<CallHandle> {
        self.rpc.call_async("hover", vec![self.vehicle()]).await
    }

    async fn move_to_position(&self, command: &MotionCommand) -> Result<CallHandle> {
        let params = vec![
            Value::from(command.target.x_val),
            Value::from(command.target.y_val),
            Value::from(command.target.z_val),
            Value::from(command.velocity),
            Value::from(command.timeout_sec),
            Value::from(command.drivetrain),
            Value::from(command.yaw_mode),
            Value::from(command.lookahead),
            Value::from(command.adaptive_lookahead),
            self.vehicle(),
        ];
        self.rpc.call_async("moveToPosition", params).await
    }

    async fn rotate_to_yaw(&self, yaw_deg: f32) -> Result<CallHandle> {
        let params = vec![
            Value::from(yaw_deg),
            Value::from(ROTATE_TIMEOUT_SEC),
            Value::from(ROTATE_MARGIN_DEG),
            self.vehicle(),
        ];
        self.rpc.call_async("rotateToYaw", params).await
    }
}
