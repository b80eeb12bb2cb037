//! Test support utilities for delivery tests
//!
//! A scripted SMTP server plus helpers that route a request to it through
//! in-memory control files and DNS.

pub mod harness;
pub mod mock_server;

pub use harness::DeliveryHarness;
pub use mock_server::{MockSmtpServer, SmtpCommand};
