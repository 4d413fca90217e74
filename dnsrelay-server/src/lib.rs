use futures::stream::StreamExt;
use prelude::Message;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::Notify;

pub mod prelude;
pub mod receiver;
pub mod sender;

/// Turns a decoded request into a reply, or `None` if nothing should be
/// sent back (a header too short to even contain a transaction id).
#[async_trait::async_trait]
pub trait Handler {
    async fn handle(&self, message: Message) -> Option<Message>;
}

pub struct UdpServer<H> {
    address: SocketAddr,
    handler: H,
}

impl<H: Handler + Send + Sync> UdpServer<H> {
    pub fn new(address: SocketAddr, handler: H) -> Self {
        Self { address, handler }
    }

    /// Runs the accept loop until `shutdown` is notified. Each inbound
    /// datagram is handled concurrently with up to 64 requests in flight.
    pub async fn run(&self, shutdown: Arc<Notify>) -> std::io::Result<()> {
        let socket = UdpSocket::bind(self.address).await?;
        let socket = Arc::new(socket);
        tracing::info!(address = %self.address, "udp server listening");

        let receiver = receiver::Receiver::new(socket.clone());
        let sender = sender::Sender::new(socket);

        let stream = receiver
            .into_stream()
            .map(|item| async { self.handler.handle(item).await })
            .buffer_unordered(64);

        tokio::pin!(stream);

        loop {
            tokio::select! {
                item = stream.next() => {
                    match item {
                        Some(Some(reply)) => {
                            if let Err(error) = sender.send(&reply).await {
                                tracing::error!("couldn't send message to {:?}: {error:?}", reply.address);
                            }
                        }
                        Some(None) => {}
                        None => break,
                    }
                }
                _ = shutdown.notified() => {
                    tracing::info!("udp server shutting down");
                    break;
                }
            }
        }

        Ok(())
    }
}
