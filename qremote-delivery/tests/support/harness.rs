//! Delivery harness
//!
//! Builds a `DeliveryAgent` whose only route leads to a given remote spec,
//! typically a `MockSmtpServer` on loopback.
//!
//! # Example
//!
//! ```no_run
//! use support::{DeliveryHarness, MockSmtpServer};
//!
//! # async fn example() {
//! let server = MockSmtpServer::builder().build().await.unwrap();
//! let report = DeliveryHarness::to_server(&server)
//!     .deliver(&["bob@example.com"])
//!     .await;
//! # }
//! ```
#![allow(dead_code)]

use std::{sync::Arc, time::Duration};

use qremote_common::{
    context::Request,
    control::{ControlFile, StaticControl},
};
use qremote_delivery::{
    Deadline, DeliveryAgent, Record, Report, SmtpTimeouts, StaticLookup, Tag,
};
use rand::{SeedableRng, rngs::StdRng};

use super::mock_server::MockSmtpServer;

pub const SENDER: &str = "alice@sender.test";
pub const DESTINATION: &str = "example.com";
pub const HELO_NAME: &str = "me.example.net";
pub const MESSAGE: &[u8] = b"X-QB-UUID: 7f3e2a\r\nSubject: Test\r\n\r\nHello World!\r\n";

/// Everything needed to run one delivery against a fixed route.
pub struct DeliveryHarness {
    destination: String,
    control: StaticControl,
    lookup: StaticLookup,
    timeouts: SmtpTimeouts,
    budget: Duration,
    message: Vec<u8>,
}

impl DeliveryHarness {
    /// A harness whose route sends every message to `remote_spec`.
    #[must_use]
    pub fn with_remote(remote_spec: &str) -> Self {
        Self::with_route(&format!("mock;127.0.0.1;{remote_spec};;"))
    }

    /// A harness delivering to the mock server.
    #[must_use]
    pub fn to_server(server: &MockSmtpServer) -> Self {
        Self::with_remote(&server.addr().to_string())
    }

    /// A harness with a complete `control/routes` record named `mock`.
    #[must_use]
    pub fn with_route(record: &str) -> Self {
        let control = StaticControl::new()
            .with(ControlFile::Me, HELO_NAME)
            .with(ControlFile::DefaultOutgoingIp, "127.0.0.1")
            .with(ControlFile::RouteMap, "*;*;mock")
            .with(ControlFile::Routes, record)
            .with(ControlFile::SmtpRoutes, "");

        Self {
            destination: DESTINATION.to_string(),
            control,
            lookup: StaticLookup::new(),
            timeouts: SmtpTimeouts::default(),
            budget: Duration::from_secs(30),
            message: MESSAGE.to_vec(),
        }
    }

    #[must_use]
    pub fn with_destination(mut self, destination: &str) -> Self {
        self.destination = destination.to_string();
        self
    }

    #[must_use]
    pub fn with_control(mut self, control: StaticControl) -> Self {
        self.control = control;
        self
    }

    #[must_use]
    pub fn with_lookup(mut self, lookup: StaticLookup) -> Self {
        self.lookup = lookup;
        self
    }

    #[must_use]
    pub const fn with_budget(mut self, budget: Duration) -> Self {
        self.budget = budget;
        self
    }

    #[must_use]
    pub fn with_message(mut self, message: &[u8]) -> Self {
        self.message = message.to_vec();
        self
    }

    /// Deliver the harness message to `recipients`.
    pub async fn deliver(self, recipients: &[&str]) -> Report {
        let request = Request::new(
            &self.destination,
            SENDER,
            recipients.iter().map(ToString::to_string).collect(),
            self.message,
        );
        let agent = DeliveryAgent::new(
            Arc::new(self.control),
            Arc::new(self.lookup),
            self.timeouts,
        );

        let mut rng = StdRng::seed_from_u64(25);
        agent
            .deliver(&request, Deadline::after(self.budget), &mut rng)
            .await
    }
}

/// The tags of a report, in order.
#[must_use]
pub fn tags(report: &Report) -> Vec<Tag> {
    report.records().iter().map(Record::tag).collect()
}

/// The text of the final record.
#[must_use]
pub fn final_text(report: &Report) -> String {
    report
        .records()
        .last()
        .map(|record| record.text().to_string())
        .unwrap_or_default()
}
