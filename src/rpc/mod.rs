// msgpack-rpc transport used to reach the simulator
//
// Provides:
// - Frame codec for requests, responses and notifications
// - Async client that matches responses to callers by message id

pub mod client;
pub mod codec;

#[cfg(test)]
pub(crate) mod testing;

pub use client::{CallHandle, Reply, RpcClient};
pub use codec::{Message, MsgpackRpcCodec, RpcError};
