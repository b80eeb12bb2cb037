//! Mock SMTP server for delivery tests
//!
//! This module provides a scripted SMTP server on loopback that can:
#![allow(dead_code)] // Test utility module - not all methods used in every test
//! - Answer each command with a configured reply, per recipient for RCPT
//! - Advertise STARTTLS and then drop the connection instead of handshaking
//! - Run AUTH PLAIN and AUTH CRAM-MD5 exchanges
//! - Hang on the Nth command to exercise the delivery deadline
//! - Record every command, across connections, for verification
//!
//! # Example
//!
//! ```rust,no_run
//! use support::mock_server::MockSmtpServer;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let server = MockSmtpServer::builder()
//!     .with_rcpt_to_response_for("bob@example.com", 550, "User unknown")
//!     .build()
//!     .await?;
//!
//! // Point a route at server.addr() and deliver
//!
//! server.shutdown();
//! # Ok(())
//! # }
//! ```

use std::{
    collections::HashMap,
    fmt::Write,
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use qremote_common::tracing;
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream},
    sync::RwLock,
    time::timeout,
};

/// Challenge sent in reply to AUTH CRAM-MD5, base64 of the RFC 2195 example.
pub const CRAM_MD5_CHALLENGE: &str = "PDE4OTYuNjk3MTcwOTUyQHBvc3RvZmZpY2UucmVzdG9uLm1jaS5uZXQ+";

/// SMTP command received by the mock server
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SmtpCommand {
    /// EHLO command with hostname
    Ehlo(String),
    /// HELO command with hostname
    Helo(String),
    /// MAIL FROM command, with the address between the angle brackets
    MailFrom(String),
    /// RCPT TO command, with the address between the angle brackets
    RcptTo(String),
    /// DATA command
    Data,
    /// Message content (after DATA), exactly as it came over the wire
    MessageContent(Vec<u8>),
    /// QUIT command
    Quit,
    /// STARTTLS command
    StartTls,
    /// AUTH command with its arguments, then the client's answer when there is one
    Auth(String),
    /// Unknown/other command
    Other(String),
}

/// Response configuration for SMTP commands
#[derive(Debug, Clone)]
pub struct SmtpResponse {
    /// SMTP status code (e.g., 250, 550)
    pub code: u16,
    /// Response message
    pub message: String,
}

impl SmtpResponse {
    fn new(code: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    fn to_bytes(&self) -> Vec<u8> {
        format!("{} {}\r\n", self.code, self.message).into_bytes()
    }
}

/// Mock SMTP server configuration
#[derive(Clone)]
struct MockServerConfig {
    greeting: SmtpResponse,
    ehlo_response: Option<EhloResponse>,
    helo_response: SmtpResponse,
    mail_from_response: SmtpResponse,
    rcpt_to_response: SmtpResponse,
    rcpt_to_responses: HashMap<String, SmtpResponse>,
    data_response: SmtpResponse,
    data_end_response: SmtpResponse,
    quit_response: SmtpResponse,
    starttls_response: Option<SmtpResponse>,
    auth_response: SmtpResponse,

    // Failure injection
    timeout_on_command: Option<usize>,
}

#[derive(Clone)]
struct EhloResponse {
    code: u16,
    capabilities: Vec<String>,
}

impl EhloResponse {
    fn to_bytes(&self) -> Vec<u8> {
        let mut response = String::new();
        let cap_count = self.capabilities.len();

        for (i, cap) in self.capabilities.iter().enumerate() {
            if i < cap_count - 1 {
                let _ = write!(&mut response, "{}-{}\r\n", self.code, cap);
            } else {
                let _ = write!(&mut response, "{} {}\r\n", self.code, cap);
            }
        }

        response.into_bytes()
    }
}

impl Default for MockServerConfig {
    fn default() -> Self {
        Self {
            greeting: SmtpResponse::new(220, "Mock SMTP Server"),
            ehlo_response: Some(EhloResponse {
                code: 250,
                capabilities: vec!["localhost".to_string(), "SIZE 10000".to_string()],
            }),
            helo_response: SmtpResponse::new(250, "Hello"),
            mail_from_response: SmtpResponse::new(250, "OK"),
            rcpt_to_response: SmtpResponse::new(250, "OK"),
            rcpt_to_responses: HashMap::new(),
            data_response: SmtpResponse::new(354, "Start mail input; end with <CRLF>.<CRLF>"),
            data_end_response: SmtpResponse::new(250, "OK: Message accepted"),
            quit_response: SmtpResponse::new(221, "Bye"),
            starttls_response: None,
            auth_response: SmtpResponse::new(235, "Authentication successful"),
            timeout_on_command: None,
        }
    }
}

/// The address between the angle brackets of a MAIL or RCPT argument.
fn bracketed(argument: &str) -> String {
    argument
        .split_once('<')
        .and_then(|(_, rest)| rest.split_once('>'))
        .map_or_else(|| argument.to_string(), |(address, _)| address.to_string())
}

/// Mock SMTP server for testing
pub struct MockSmtpServer {
    addr: SocketAddr,
    config: Arc<MockServerConfig>,
    commands_received: Arc<RwLock<Vec<SmtpCommand>>>,
    shutdown: Arc<AtomicBool>,
    connections: Arc<AtomicUsize>,
}

impl MockSmtpServer {
    /// Create a new builder for configuring the mock server
    #[must_use]
    pub fn builder() -> MockSmtpServerBuilder {
        MockSmtpServerBuilder::new()
    }

    /// Get the address the server is listening on
    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Get all commands received by the server, over every connection
    pub async fn commands(&self) -> Vec<SmtpCommand> {
        self.commands_received.read().await.clone()
    }

    /// Recipients in the order their RCPT commands arrived
    pub async fn recipients(&self) -> Vec<String> {
        self.commands()
            .await
            .into_iter()
            .filter_map(|command| match command {
                SmtpCommand::RcptTo(address) => Some(address),
                _ => None,
            })
            .collect()
    }

    /// Get the number of connections accepted
    #[must_use]
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::Relaxed)
    }

    /// Shutdown the server
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }

    /// Handle a single client connection
    #[allow(clippy::too_many_lines)]
    async fn handle_client(
        mut stream: TcpStream,
        config: Arc<MockServerConfig>,
        commands: Arc<RwLock<Vec<SmtpCommand>>>,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let (reader, mut writer) = stream.split();
        let mut reader = BufReader::new(reader);
        let mut line = String::new();
        let mut local_command_count = 0;

        // Send greeting
        writer.write_all(&config.greeting.to_bytes()).await?;
        writer.flush().await?;

        loop {
            line.clear();

            // Check if we should timeout on this command
            if let Some(timeout_on) = config.timeout_on_command
                && local_command_count == timeout_on
            {
                // Sleep indefinitely to simulate timeout
                tokio::time::sleep(Duration::from_secs(3600)).await;
                return Ok(());
            }

            let read_result = timeout(Duration::from_secs(10), reader.read_line(&mut line)).await;
            if read_result.is_err() {
                return Ok(());
            }

            let bytes_read = read_result??;
            if bytes_read == 0 {
                // Connection closed
                return Ok(());
            }

            local_command_count += 1;

            let cmd_line = line.trim();
            tracing::debug!("Mock server received: {}", cmd_line);

            // Parse command
            let (verb, argument) = cmd_line.split_once(' ').unwrap_or((cmd_line, ""));
            let command = verb.to_uppercase();

            let (response, smtp_cmd) = match command.as_str() {
                "EHLO" => {
                    let cmd = SmtpCommand::Ehlo(argument.to_string());
                    let resp = config
                        .ehlo_response
                        .as_ref()
                        .map_or_else(|| config.helo_response.to_bytes(), EhloResponse::to_bytes);
                    (resp, cmd)
                }
                "HELO" => (
                    config.helo_response.to_bytes(),
                    SmtpCommand::Helo(argument.to_string()),
                ),
                "MAIL" => (
                    config.mail_from_response.to_bytes(),
                    SmtpCommand::MailFrom(bracketed(argument)),
                ),
                "RCPT" => {
                    let to = bracketed(argument);
                    let resp = config
                        .rcpt_to_responses
                        .get(&to)
                        .unwrap_or(&config.rcpt_to_response)
                        .to_bytes();
                    (resp, SmtpCommand::RcptTo(to))
                }
                "DATA" => (config.data_response.to_bytes(), SmtpCommand::Data),
                "QUIT" => {
                    commands.write().await.push(SmtpCommand::Quit);
                    writer.write_all(&config.quit_response.to_bytes()).await?;
                    writer.flush().await?;
                    return Ok(());
                }
                "STARTTLS" => {
                    commands.write().await.push(SmtpCommand::StartTls);
                    let Some(starttls) = config.starttls_response.as_ref() else {
                        writer
                            .write_all(&SmtpResponse::new(502, "Command not implemented").to_bytes())
                            .await?;
                        writer.flush().await?;
                        continue;
                    };

                    writer.write_all(&starttls.to_bytes()).await?;
                    writer.flush().await?;

                    // No TLS here: a go-ahead is followed by hanging up,
                    // which fails the client's handshake
                    if starttls.code == 220 {
                        return Ok(());
                    }
                    continue;
                }
                "AUTH" if argument.to_uppercase().starts_with("CRAM-MD5") => {
                    writer
                        .write_all(&SmtpResponse::new(334, CRAM_MD5_CHALLENGE).to_bytes())
                        .await?;
                    writer.flush().await?;

                    let mut answer = String::new();
                    reader.read_line(&mut answer).await?;
                    (
                        config.auth_response.to_bytes(),
                        SmtpCommand::Auth(format!("{argument} {}", answer.trim())),
                    )
                }
                "AUTH" => (
                    config.auth_response.to_bytes(),
                    SmtpCommand::Auth(argument.to_string()),
                ),
                _ => (
                    SmtpResponse::new(500, "Unknown command").to_bytes(),
                    SmtpCommand::Other(cmd_line.to_string()),
                ),
            };

            // Store command
            commands.write().await.push(smtp_cmd.clone());

            // Handle DATA content if we just sent DATA response
            if matches!(smtp_cmd, SmtpCommand::Data) && config.data_response.code == 354 {
                writer.write_all(&response).await?;
                writer.flush().await?;

                // Read message content until we see <CRLF>.<CRLF>
                let mut message_content = Vec::new();
                let mut data_line = Vec::new();

                loop {
                    data_line.clear();
                    let bytes_read = reader.read_until(b'\n', &mut data_line).await?;
                    if bytes_read == 0 {
                        break;
                    }

                    if data_line == b".\r\n" {
                        commands
                            .write()
                            .await
                            .push(SmtpCommand::MessageContent(message_content.clone()));

                        writer
                            .write_all(&config.data_end_response.to_bytes())
                            .await?;
                        writer.flush().await?;
                        break;
                    }

                    message_content.extend_from_slice(&data_line);
                }
                continue;
            }

            // Send response
            writer.write_all(&response).await?;
            writer.flush().await?;
        }
    }
}

/// Builder for configuring a `MockSmtpServer`
pub struct MockSmtpServerBuilder {
    config: MockServerConfig,
}

impl MockSmtpServerBuilder {
    fn new() -> Self {
        Self {
            config: MockServerConfig::default(),
        }
    }

    /// Set the greeting message
    #[must_use]
    pub fn with_greeting(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.greeting = SmtpResponse::new(code, message);
        self
    }

    /// Set the EHLO response with capabilities
    #[must_use]
    pub fn with_ehlo_response(mut self, code: u16, capabilities: &[&str]) -> Self {
        self.config.ehlo_response = Some(EhloResponse {
            code,
            capabilities: capabilities.iter().map(ToString::to_string).collect(),
        });
        self
    }

    /// Answer EHLO with the HELO response, as a server without ESMTP does
    #[must_use]
    pub fn without_ehlo(mut self) -> Self {
        self.config.ehlo_response = None;
        self
    }

    /// Set the HELO response
    #[must_use]
    pub fn with_helo_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.helo_response = SmtpResponse::new(code, message);
        self
    }

    /// Set the MAIL FROM response
    #[must_use]
    pub fn with_mail_from_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.mail_from_response = SmtpResponse::new(code, message);
        self
    }

    /// Set the RCPT TO response for every recipient without its own
    #[must_use]
    pub fn with_rcpt_to_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.rcpt_to_response = SmtpResponse::new(code, message);
        self
    }

    /// Set the RCPT TO response for one recipient
    #[must_use]
    pub fn with_rcpt_to_response_for(
        mut self,
        recipient: &str,
        code: u16,
        message: impl Into<String>,
    ) -> Self {
        self.config
            .rcpt_to_responses
            .insert(recipient.to_string(), SmtpResponse::new(code, message));
        self
    }

    /// Set the DATA command response
    #[must_use]
    pub fn with_data_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.data_response = SmtpResponse::new(code, message);
        self
    }

    /// Set the response after message content (after `<CRLF>.<CRLF>`)
    #[must_use]
    pub fn with_data_end_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.data_end_response = SmtpResponse::new(code, message);
        self
    }

    /// Set the STARTTLS response; 220 means hang up in place of a handshake
    #[must_use]
    pub fn with_starttls_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.starttls_response = Some(SmtpResponse::new(code, message));
        self
    }

    /// Set the final AUTH response
    #[must_use]
    pub fn with_auth_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.auth_response = SmtpResponse::new(code, message);
        self
    }

    /// Timeout (hang) on the Nth command (0-indexed)
    #[must_use]
    pub const fn with_timeout_on_command(mut self, command_index: usize) -> Self {
        self.config.timeout_on_command = Some(command_index);
        self
    }

    /// Build and start the mock SMTP server
    ///
    /// # Errors
    ///
    /// Returns an error if the server fails to bind to a port
    pub async fn build(self) -> Result<MockSmtpServer, std::io::Error> {
        // Bind to a random available port
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let config = Arc::new(self.config);
        let commands = Arc::new(RwLock::new(Vec::new()));
        let shutdown = Arc::new(AtomicBool::new(false));
        let connections = Arc::new(AtomicUsize::new(0));

        // Spawn server task
        let config_clone = Arc::clone(&config);
        let commands_clone = Arc::clone(&commands);
        let shutdown_clone = Arc::clone(&shutdown);
        let connections_clone = Arc::clone(&connections);

        tokio::spawn(async move {
            loop {
                if shutdown_clone.load(Ordering::Relaxed) {
                    break;
                }

                // Accept connection with timeout to allow checking shutdown flag
                let accept_result = timeout(Duration::from_millis(100), listener.accept()).await;

                if let Ok(Ok((stream, _peer))) = accept_result {
                    connections_clone.fetch_add(1, Ordering::Relaxed);
                    let config = Arc::clone(&config_clone);
                    let commands = Arc::clone(&commands_clone);

                    tokio::spawn(async move {
                        if let Err(e) = MockSmtpServer::handle_client(stream, config, commands).await
                        {
                            tracing::debug!("Mock server client error: {}", e);
                        }
                    });
                }
            }
        });

        Ok(MockSmtpServer {
            addr,
            config,
            commands_received: commands,
            shutdown,
            connections,
        })
    }
}
