//! Test support utilities for end-to-end tests
//!
//! A control directory on disk and a minimal SMTP server that accepts
//! everything it is sent.

pub mod control_root;
pub mod mock_server;

pub use control_root::ControlRoot;
pub use mock_server::MockSmtpServer;
