//! Minimal SMTP server for end-to-end tests
//!
//! Accepts every command and records the conversation.
#![allow(dead_code)]

use std::{net::SocketAddr, sync::Arc};

use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream},
    sync::RwLock,
};

pub struct MockSmtpServer {
    addr: SocketAddr,
    lines: Arc<RwLock<Vec<String>>>,
}

impl MockSmtpServer {
    /// Bind on loopback and start serving.
    pub async fn start() -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let lines = Arc::new(RwLock::new(Vec::new()));

        let recorded = Arc::clone(&lines);
        tokio::spawn(async move {
            while let Ok((stream, _peer)) = listener.accept().await {
                let recorded = Arc::clone(&recorded);
                tokio::spawn(async move {
                    let _ = Self::handle_client(stream, recorded).await;
                });
            }
        });

        Ok(Self { addr, lines })
    }

    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Every line received, message content included, without line endings.
    pub async fn lines(&self) -> Vec<String> {
        self.lines.read().await.clone()
    }

    async fn handle_client(
        mut stream: TcpStream,
        recorded: Arc<RwLock<Vec<String>>>,
    ) -> std::io::Result<()> {
        let (reader, mut writer) = stream.split();
        let mut reader = BufReader::new(reader);
        let mut in_data = false;

        writer.write_all(b"220 mock ESMTP\r\n").await?;

        let mut line = String::new();
        loop {
            line.clear();
            if reader.read_line(&mut line).await? == 0 {
                return Ok(());
            }

            let text = line.trim_end_matches(['\r', '\n']).to_string();
            recorded.write().await.push(text.clone());

            let reply: &[u8] = if in_data {
                if text != "." {
                    continue;
                }
                in_data = false;
                b"250 2.0.0 queued as 42\r\n"
            } else {
                let verb = text.split(' ').next().unwrap_or_default().to_uppercase();
                match verb.as_str() {
                    "EHLO" => b"250-mock\r\n250 8BITMIME\r\n",
                    "DATA" => {
                        in_data = true;
                        b"354 go ahead\r\n"
                    }
                    "QUIT" => {
                        writer.write_all(b"221 bye\r\n").await?;
                        return Ok(());
                    }
                    _ => b"250 ok\r\n",
                }
            };

            writer.write_all(reply).await?;
        }
    }
}
