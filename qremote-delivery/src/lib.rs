//! Outbound delivery of a single message.
//!
//! This crate provides functionality to:
//! - Resolve the route for a (sender, destination) pair from the control files
//! - Expand address specs into ordered local and remote candidates
//! - Run the SMTP session under one delivery deadline
//! - Collect the per-recipient and final records for the queue manager

pub mod address;
pub mod deadline;
mod dns;
mod error;
pub mod report;
pub mod route;
mod session;
mod types;

use std::sync::Arc;

pub use deadline::{Deadline, Expired};
pub use dns::{DnsConfig, DnsError, DnsResolver, Lookup, MailServer, StaticLookup};
pub use error::{DeliveryError, PermanentError, TemporaryError};
use qremote_common::{
    context::Request,
    control::{ControlFile, ControlSource},
    tracing::{info, warn},
};
use qremote_smtp::client::Response;
use rand::Rng;
pub use report::{Record, Report, Tag, write_records};
pub use route::{Route, RouteResolver};
pub use session::{Candidates, SmtpSession};
use tokio::time::timeout_at;
pub use types::SmtpTimeouts;

use crate::address::Expander;

/// Delivers one message at a time, start to finish.
pub struct DeliveryAgent {
    control: Arc<dyn ControlSource>,
    lookup: Arc<dyn Lookup>,
    timeouts: SmtpTimeouts,
}

impl DeliveryAgent {
    #[must_use]
    pub fn new(
        control: Arc<dyn ControlSource>,
        lookup: Arc<dyn Lookup>,
        timeouts: SmtpTimeouts,
    ) -> Self {
        Self {
            control,
            lookup,
            timeouts,
        }
    }

    /// Deliver `request`, giving up once `deadline` passes.
    ///
    /// Never fails: every outcome, including the deadline firing part way,
    /// ends the returned report with exactly one final record.
    pub async fn deliver<R: Rng + ?Sized>(
        &self,
        request: &Request,
        deadline: Deadline,
        rng: &mut R,
    ) -> Report {
        let mut report = Report::for_request(request);

        let outcome = timeout_at(
            deadline.instant(),
            self.attempt(request, &deadline, rng, &mut report),
        )
        .await;

        match outcome {
            Ok(Ok(response)) => {
                info!(id = request.id(), %response, "Message accepted");
                report.accepted(&response);
            }
            Ok(Err(err)) => {
                warn!(id = request.id(), error = %err, "Delivery failed");
                report.failed(&err);
            }
            Err(_) => {
                warn!(id = request.id(), "Delivery deadline passed");
                report.failed(&TemporaryError::DeadlineExceeded("delivery").into());
            }
        }

        report
    }

    async fn attempt<R: Rng + ?Sized>(
        &self,
        request: &Request,
        deadline: &Deadline,
        rng: &mut R,
        report: &mut Report,
    ) -> Result<Response, DeliveryError> {
        let route = RouteResolver::new(self.control.as_ref())
            .resolve(request.sender_host(), request.destination())?;
        let helo_fallback = self.control.first_line(ControlFile::Me)?;
        let default_local = if route.local_spec.is_empty() {
            Some(self.control.first_line(ControlFile::DefaultOutgoingIp)?)
        } else {
            None
        };

        info!(
            id = request.id(),
            destination = request.destination(),
            route = %route.name,
            remote = %route.remote_spec,
            local = %route.local_spec,
            "Resolved route"
        );

        let expander = Expander::new(self.lookup.as_ref(), deadline);
        let local = match default_local {
            Some(line) => expander.default_local(&line).await?,
            None => expander.local(&route.local_spec, rng).await?,
        };
        let remote = expander
            .remote(&route.remote_spec, &route.query_host, rng)
            .await?;
        let candidates = Candidates { local, remote };

        SmtpSession::new(
            request,
            &route,
            &candidates,
            self.lookup.as_ref(),
            &helo_fallback,
            &self.timeouts,
            deadline,
        )
        .execute(report)
        .await
    }
}
