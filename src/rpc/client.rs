// Async msgpack-rpc client
//
// One TCP connection, one reader task. Each call registers a oneshot channel
// under its msgid; the reader task completes it when the response arrives.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::{SinkExt, StreamExt};
use rmpv::Value;
use serde::de::DeserializeOwned;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::sync::{Mutex as AsyncMutex, oneshot};
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, warn};

use super::codec::{Message, MsgpackRpcCodec, Result, RpcError};

/// Raw outcome of a call: result value, or the remote error object
pub type Reply = std::result::Result<Value, Value>;

// None once the connection is closed
type Pending = Arc<Mutex<Option<HashMap<u32, oneshot::Sender<Reply>>>>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Handle to an in-flight call
///
/// Awaiting [`CallHandle::join`] waits for the simulator to finish the
/// operation. Dropping the handle leaves the call running; its reply is
/// discarded when it arrives.
#[derive(Debug)]
pub struct CallHandle {
    method: String,
    reply: oneshot::Receiver<Reply>,
}

impl CallHandle {
    /// Create a handle plus the sender that completes it
    pub fn channel(method: impl Into<String>) -> (oneshot::Sender<Reply>, Self) {
        let (tx, rx) = oneshot::channel();
        let handle = Self {
            method: method.into(),
            reply: rx,
        };
        (tx, handle)
    }

    /// A handle that is already complete
    pub fn completed(method: impl Into<String>, reply: Reply) -> Self {
        let (tx, handle) = Self::channel(method);
        // Receiver is alive in `handle`, so this cannot fail
        let _ = tx.send(reply);
        handle
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    /// Wait for the call to complete
    pub async fn join(self) -> Result<Value> {
        match self.reply.await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(error)) => Err(RpcError::Remote {
                method: self.method,
                message: error.to_string(),
            }),
            Err(_) => Err(RpcError::Disconnected {
                method: self.method,
            }),
        }
    }
}

/// msgpack-rpc client over TCP
pub struct RpcClient {
    writer: AsyncMutex<FramedWrite<OwnedWriteHalf, MsgpackRpcCodec>>,
    pending: Pending,
    next_msgid: AtomicU32,
    reader: JoinHandle<()>,
}

impl RpcClient {
    /// Connect to an msgpack-rpc server
    pub async fn connect(addr: impl ToSocketAddrs) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        Ok(Self::from_stream(stream))
    }

    /// Wrap an already connected stream
    pub fn from_stream(stream: TcpStream) -> Self {
        let (read_half, write_half) = stream.into_split();
        let pending: Pending = Arc::new(Mutex::new(Some(HashMap::new())));

        let reader = tokio::spawn(read_responses(
            FramedRead::new(read_half, MsgpackRpcCodec),
            Arc::clone(&pending),
        ));

        Self {
            writer: AsyncMutex::new(FramedWrite::new(write_half, MsgpackRpcCodec)),
            pending,
            next_msgid: AtomicU32::new(0),
            reader,
        }
    }

    /// Submit a call without waiting for its result
    pub async fn call_async(&self, method: &str, params: Vec<Value>) -> Result<CallHandle> {
        let msgid = self.next_msgid.fetch_add(1, Ordering::Relaxed);
        let (tx, handle) = CallHandle::channel(method);

        match lock(&self.pending).as_mut() {
            Some(calls) => {
                calls.insert(msgid, tx);
            }
            None => {
                return Err(RpcError::Disconnected {
                    method: method.to_string(),
                });
            }
        }

        debug!("Call #{} {}({:?})", msgid, method, params);
        let request = Message::Request {
            msgid,
            method: method.to_string(),
            params,
        };

        if let Err(e) = self.writer.lock().await.send(request).await {
            if let Some(calls) = lock(&self.pending).as_mut() {
                calls.remove(&msgid);
            }
            return Err(e);
        }

        Ok(handle)
    }

    /// Submit a call and wait for its result
    pub async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value> {
        self.call_async(method, params).await?.join().await
    }

    /// Submit a call and deserialize its result
    pub async fn call_as<T: DeserializeOwned>(&self, method: &str, params: Vec<Value>) -> Result<T> {
        let value = self.call(method, params).await?;
        rmpv::ext::from_value(value).map_err(|source| RpcError::Convert {
            method: method.to_string(),
            source,
        })
    }
}

impl Drop for RpcClient {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

/// Route responses to their callers until the connection closes
async fn read_responses(mut frames: FramedRead<OwnedReadHalf, MsgpackRpcCodec>, pending: Pending) {
    while let Some(frame) = frames.next().await {
        match frame {
            Ok(Message::Response { msgid, result }) => {
                let waiter = lock(&pending)
                    .as_mut()
                    .and_then(|calls| calls.remove(&msgid));
                match waiter {
                    Some(tx) => {
                        if let Err(reply) = tx.send(result) {
                            debug!("Discarded reply to call #{}: {:?}", msgid, reply);
                        }
                    }
                    None => warn!("Response for unknown call #{}", msgid),
                }
            }
            Ok(Message::Notification { method, .. }) => {
                debug!("Ignoring notification {}", method);
            }
            Ok(Message::Request { method, .. }) => {
                warn!("Ignoring request {} from server", method);
            }
            Err(e) => {
                warn!("Closing simulator connection: {}", e);
                break;
            }
        }
    }

    debug!("Simulator connection closed");
    // Dropping the senders fails every outstanding call
    lock(&pending).take();
}
