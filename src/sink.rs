/// Best-effort UDP delivery of NMEA sentences
use std::net::SocketAddr;

use log::{debug, warn};
use tokio::net::UdpSocket;

use crate::error::BridgeError;

/// Fire-and-forget datagram sink for a fixed destination.
///
/// The socket is bound lazily and dropped after any send failure, so the next
/// sentence goes out on a fresh socket.
pub struct UdpSink {
    target: SocketAddr,
    socket: Option<UdpSocket>,
}

impl UdpSink {
    pub fn new(target: SocketAddr) -> Self {
        UdpSink {
            target,
            socket: None,
        }
    }

    pub fn target(&self) -> SocketAddr {
        self.target
    }

    /// Send one sentence, logging and swallowing any failure
    pub async fn send(&mut self, sentence: &str) {
        if let Err(e) = self.try_send(sentence).await {
            warn!("{}", e);
        }
    }

    /// Send one sentence as a single datagram
    ///
    /// # Returns
    /// Transport error on failure; the underlying socket is discarded in that case
    pub async fn try_send(&mut self, sentence: &str) -> Result<(), BridgeError> {
        let result = self.send_datagram(sentence.as_bytes()).await;
        match result {
            Ok(sent) => {
                debug!("Sent {} bytes to {}: {}", sent, self.target, sentence.trim_end());
                Ok(())
            }
            Err(source) => {
                self.socket = None;
                Err(BridgeError::Transport {
                    target: self.target,
                    source,
                })
            }
        }
    }

    async fn send_datagram(&mut self, payload: &[u8]) -> std::io::Result<usize> {
        let socket = match self.socket.take() {
            Some(socket) => socket,
            None => {
                let bind_addr: SocketAddr = if self.target.is_ipv4() {
                    SocketAddr::from(([0, 0, 0, 0], 0))
                } else {
                    SocketAddr::from(([0u16; 8], 0))
                };
                UdpSocket::bind(bind_addr).await?
            }
        };
        let sent = socket.send_to(payload, self.target).await?;
        self.socket = Some(socket);
        Ok(sent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{timeout, Duration};

    #[tokio::test]
    async fn test_sentences_arrive_in_call_order() {
        let receiver = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let mut sink = UdpSink::new(receiver.local_addr().unwrap());

        sink.send("$WIMWV,10.0,R,0.1,N,A*13\n").await;
        sink.send("$WIHDM,270.0,M*39\n").await;

        let mut buf = [0u8; 128];
        let n = timeout(Duration::from_secs(2), receiver.recv(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(&buf[..n], b"$WIMWV,10.0,R,0.1,N,A*13\n");
        let n = timeout(Duration::from_secs(2), receiver.recv(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(&buf[..n], b"$WIHDM,270.0,M*39\n");
    }

    #[tokio::test]
    async fn test_failure_is_reported_and_socket_recreated() {
        // IPv4 socket cannot reach the IPv4 broadcast address without SO_BROADCAST
        let mut sink = UdpSink::new(SocketAddr::from(([255, 255, 255, 255], 2000)));
        let err = sink.try_send("$WIHDM,0.0,M*3c\n").await.unwrap_err();
        assert!(matches!(err, BridgeError::Transport { .. }));
        assert!(sink.socket.is_none());

        // Containment: the infallible path never panics or propagates
        sink.send("$WIHDM,0.0,M*3c\n").await;
    }
}
