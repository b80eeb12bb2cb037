//! Outbound SMTP client.
//!
//! The client speaks just enough SMTP to hand a single message to a remote
//! server:
//!
//! - TCP connections bound to a chosen source address
//! - EHLO with a HELO fallback, and the capabilities it advertises
//! - STARTTLS upgrade without certificate verification
//! - AUTH via CRAM-MD5 or PLAIN
//! - DATA with dot-stuffing and line ending normalisation
//!
//! Replies are returned as [`Response`] values and classified by the caller;
//! only transport, TLS and parse failures surface as [`ClientError`].
//!
//! # Examples
//!
//! ```no_run
//! use qremote_smtp::client::SmtpClient;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut client = SmtpClient::connect("192.0.2.25:25".parse()?, None, "mx.example.com").await?;
//! let greeting = client.read_greeting().await?;
//! assert_eq!(greeting.code, 220);
//!
//! client.hello("mail.example.org").await?;
//! client.mail_from("sender@example.org").await?;
//! client.rcpt_to("recipient@example.com").await?;
//! client.data().await?;
//! client.send_data(b"Subject: Test\n\nHello World\n").await?;
//! client.quit().await?;
//! # Ok(())
//! # }
//! ```

mod auth;
mod capabilities;
mod data;
mod error;
mod response;
mod smtp_client;

pub use auth::{Credentials, Mechanism};
pub use capabilities::{Capabilities, Capability};
pub use data::encode_data;
pub use error::{ClientError, Result};
pub use response::{ReplyClass, Response, ResponseLine};
pub use smtp_client::SmtpClient;
