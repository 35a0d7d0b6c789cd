//! Provider that sends the start of a stream and then goes quiet
//!
//! `wiremock` only serves whole bodies, so this speaks just enough HTTP/1.1
//! to deliver one chunk and hold the connection open.

use std::net::SocketAddr;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

pub struct StalledProvider {
    addr: SocketAddr,
    shutdown: CancellationToken,
}

impl StalledProvider {
    /// Serve `head` as the first body chunk of every response
    pub async fn start(head: String) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(("127.0.0.1", 0)).await?;
        let addr = listener.local_addr()?;
        let shutdown = CancellationToken::new();
        let token = shutdown.clone();

        tokio::spawn(async move {
            loop {
                let (mut socket, _) = tokio::select! {
                    () = token.cancelled() => break,
                    accepted = listener.accept() => match accepted {
                        Ok(accepted) => accepted,
                        Err(_) => break,
                    },
                };
                let head = head.clone();
                let token = token.clone();
                tokio::spawn(async move {
                    let mut request = vec![0_u8; 64 * 1024];
                    let _ = socket.read(&mut request).await;

                    let response = format!(
                        "HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\ntransfer-encoding: chunked\r\n\r\n{:x}\r\n{head}\r\n",
                        head.len()
                    );
                    if socket.write_all(response.as_bytes()).await.is_err() {
                        return;
                    }
                    let _ = socket.flush().await;
                    token.cancelled().await;
                });
            }
        });

        Ok(Self { addr, shutdown })
    }

    pub fn base_url(&self) -> String {
        format!("http://{}/v1", self.addr)
    }
}

impl Drop for StalledProvider {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
