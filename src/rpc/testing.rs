// Loopback msgpack-rpc server for tests

use std::net::SocketAddr;

use futures::{SinkExt, StreamExt};
use rmpv::Value;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::codec::Framed;

use super::client::Reply;
use super::codec::{Message, MsgpackRpcCodec};

/// A request as the server saw it
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Recorded {
    pub method: String,
    pub params: Vec<Value>,
}

/// Serve one connection, answering each request with `handler`.
///
/// A `None` from the handler leaves that request unanswered.
pub(crate) async fn spawn_server<F>(mut handler: F) -> (SocketAddr, mpsc::UnboundedReceiver<Recorded>)
where
    F: FnMut(&str, &[Value]) -> Option<Reply> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (seen_tx, seen_rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        let mut framed = Framed::new(socket, MsgpackRpcCodec);

        while let Some(Ok(frame)) = framed.next().await {
            let Message::Request {
                msgid,
                method,
                params,
            } = frame
            else {
                continue;
            };

            let reply = handler(&method, &params);
            let _ = seen_tx.send(Recorded { method, params });
            if let Some(result) = reply {
                if framed.send(Message::Response { msgid, result }).await.is_err() {
                    break;
                }
            }
        }
    });

    (addr, seen_rx)
}
