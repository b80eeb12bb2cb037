//! SMTP session execution.
//!
//! A session walks one message through a remote server:
//! - dial the candidates until one greets and answers EHLO/HELO
//! - upgrade via STARTTLS when offered, reconnecting in clear text if that fails
//! - authenticate when the route carries credentials
//! - MAIL FROM, one RCPT TO per recipient, DATA
//! - QUIT, whatever happened after the connection was made

use std::future::Future;

use qremote_common::{
    context::Request,
    tracing::{debug, info, warn},
};
use qremote_smtp::client::{
    ClientError, Mechanism, Response, Result as ClientResult, SmtpClient,
};

use crate::{
    SmtpTimeouts,
    address::{LocalCandidate, RemoteCandidate},
    deadline::Deadline,
    dns::Lookup,
    error::{DeliveryError, PermanentError, TemporaryError},
    report::Report,
    route::Route,
};

/// Outcome of a STARTTLS attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TlsNegotiationOutcome {
    Success,
    /// The connection is unusable; start over without TLS.
    RetryWithoutTls,
}

/// The candidates a session may connect between.
#[derive(Debug, Clone, Default)]
pub struct Candidates {
    pub local: Vec<LocalCandidate>,
    pub remote: Vec<RemoteCandidate>,
}

impl Candidates {
    /// Every (local, remote) pair in the order they are tried.
    ///
    /// Remote-major first, then local-major, so each pair appears twice.
    pub fn pairs(&self) -> impl Iterator<Item = (&LocalCandidate, &RemoteCandidate)> {
        let remote_major = self
            .remote
            .iter()
            .flat_map(|remote| self.local.iter().map(move |local| (local, remote)));
        let local_major = self
            .local
            .iter()
            .flat_map(|local| self.remote.iter().map(move |remote| (local, remote)));

        remote_major.chain(local_major)
    }
}

/// A single SMTP session delivering one message.
pub struct SmtpSession<'a> {
    request: &'a Request,
    route: &'a Route,
    candidates: &'a Candidates,
    lookup: &'a dyn Lookup,
    /// HELO name used when the local address has no reverse DNS.
    helo_fallback: &'a str,
    timeouts: &'a SmtpTimeouts,
    deadline: &'a Deadline,
}

impl<'a> SmtpSession<'a> {
    #[must_use]
    pub const fn new(
        request: &'a Request,
        route: &'a Route,
        candidates: &'a Candidates,
        lookup: &'a dyn Lookup,
        helo_fallback: &'a str,
        timeouts: &'a SmtpTimeouts,
        deadline: &'a Deadline,
    ) -> Self {
        Self {
            request,
            route,
            candidates,
            lookup,
            helo_fallback,
            timeouts,
            deadline,
        }
    }

    /// Run the session to the server's verdict on the message.
    ///
    /// Recipient answers are added to `report` as they arrive. The returned
    /// response is the server's acceptance of the message.
    ///
    /// # Errors
    ///
    /// Returns the failure that ended the session; `report` keeps every
    /// recipient record collected until then.
    pub async fn execute(&self, report: &mut Report) -> Result<Response, DeliveryError> {
        let (mut client, identity) = self.connect(report).await?;

        if client.capabilities().supports("STARTTLS") {
            let outcome = match self.negotiate_tls(&mut client, &identity).await {
                Ok(outcome) => outcome,
                Err(err) => {
                    client.close().await;
                    return Err(err);
                }
            };

            if outcome == TlsNegotiationOutcome::RetryWithoutTls {
                info!(
                    id = self.request.id(),
                    server = %client.peer_addr(),
                    "Reconnecting without STARTTLS"
                );
                client.close().await;
                (client, _) = self.connect(report).await?;
            }
        }

        let result = self.transact(&mut client, report).await;
        self.quit(&mut client).await;
        result
    }

    async fn transact(
        &self,
        client: &mut SmtpClient,
        report: &mut Report,
    ) -> Result<Response, DeliveryError> {
        self.authenticate(client).await?;
        self.send_mail_from(client).await?;
        self.send_rcpt_to(client, report).await?;
        self.send_message_data(client).await
    }

    /// Try every candidate pair until one completes the greeting.
    async fn connect(&self, report: &mut Report) -> Result<(SmtpClient, String), DeliveryError> {
        let mut last_error = None;

        for (local, remote) in self.candidates.pairs() {
            match self.dial(local, remote).await {
                Ok((client, identity)) => {
                    info!(
                        id = self.request.id(),
                        route = %self.route.name,
                        local = %client.local_addr(),
                        remote = %client.peer_addr(),
                        helo = %identity,
                        "Connected"
                    );
                    report.connected(client.local_addr(), client.peer_addr());
                    return Ok((client, identity));
                }
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => {
                    warn!(%local, %remote, error = %err, "Connection attempt failed");
                    last_error = Some(err);
                }
            }
        }

        let remotes = self
            .candidates
            .remote
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",");

        Err(TemporaryError::NoConnection {
            remotes,
            reason: last_error.map(|err| err.message()).unwrap_or_default(),
        }
        .into())
    }

    /// One connection attempt: bind, connect, greeting, EHLO.
    async fn dial(
        &self,
        local: &LocalCandidate,
        remote: &RemoteCandidate,
    ) -> Result<(SmtpClient, String), DeliveryError> {
        let Some(source) = local.ip else {
            return Err(TemporaryError::ConnectionFailed(format!(
                "local address {} is not an IP address",
                local.token
            ))
            .into());
        };

        let identity = self.helo_identity(local).await?;

        let handshake = async {
            let mut client =
                SmtpClient::connect(remote.addr, Some(source), remote.host.clone()).await?;

            let greeting = client.read_greeting().await?;
            if greeting.code != 220 {
                return Err(ClientError::UnexpectedResponse {
                    code: greeting.code,
                    message: greeting.message(),
                });
            }

            client.hello(&identity).await?;
            Ok::<_, ClientError>(client)
        };

        match self
            .deadline
            .run_within(self.timeouts.connect(), "connect", handshake)
            .await?
        {
            Ok(client) => Ok((client, identity)),
            Err(err) => Err(
                TemporaryError::ConnectionFailed(format!("{local} -> {remote}: {err}")).into(),
            ),
        }
    }

    /// The name to greet with from `local`.
    async fn helo_identity(&self, local: &LocalCandidate) -> Result<String, DeliveryError> {
        if let Some(ip) = local.ip
            && let Ok(names) = self.deadline.run("reverse DNS", self.lookup.reverse(ip)).await?
            && let Some(name) = names.into_iter().find(|name| !name.is_empty())
        {
            return Ok(name);
        }

        Ok(self.helo_fallback.to_string())
    }

    /// Upgrade the connection, or say that it has to be abandoned.
    ///
    /// # Errors
    ///
    /// Only the deadline passing is an error here.
    async fn negotiate_tls(
        &self,
        client: &mut SmtpClient,
        identity: &str,
    ) -> Result<TlsNegotiationOutcome, DeliveryError> {
        match self.deadline.run("STARTTLS", client.starttls()).await? {
            Ok(response) if response.is_success() => {}
            Ok(response) => {
                info!(%response, "Server refused STARTTLS");
                return Ok(TlsNegotiationOutcome::RetryWithoutTls);
            }
            Err(err) => {
                info!(error = %err, "STARTTLS failed");
                return Ok(TlsNegotiationOutcome::RetryWithoutTls);
            }
        }

        match self.deadline.run("EHLO", client.hello(identity)).await? {
            Ok(_) => {
                debug!(server = %client.peer_addr(), "TLS negotiated via STARTTLS");
                Ok(TlsNegotiationOutcome::Success)
            }
            Err(err) => {
                info!(error = %err, "EHLO after STARTTLS failed");
                Ok(TlsNegotiationOutcome::RetryWithoutTls)
            }
        }
    }

    async fn authenticate(&self, client: &mut SmtpClient) -> Result<(), DeliveryError> {
        let Some(credentials) = self.route.credentials() else {
            return Ok(());
        };

        if !client.capabilities().supports("AUTH") {
            debug!(route = %self.route.name, "Server does not offer AUTH, continuing without");
            return Ok(());
        }

        let mechanism = Mechanism::select(client.capabilities().auth_mechanisms());
        debug!(%mechanism, "Authenticating");

        match self
            .deadline
            .run("AUTH", client.authenticate(mechanism, &credentials))
            .await?
        {
            Ok(response) if response.is_success() => Ok(()),
            Ok(response) => Err(TemporaryError::AuthFailed(response.to_string()).into()),
            Err(err) => Err(TemporaryError::AuthFailed(err.to_string()).into()),
        }
    }

    async fn send_mail_from(&self, client: &mut SmtpClient) -> Result<(), DeliveryError> {
        let response = self
            .step("MAIL FROM", client.mail_from(self.request.sender()))
            .await?;

        DeliveryError::from_rejection(
            &response,
            PermanentError::SenderRejected,
            TemporaryError::SenderRejected,
        )
        .map_or(Ok(()), Err)
    }

    /// One RCPT per recipient, in order; each answer lands in `report`.
    async fn send_rcpt_to(
        &self,
        client: &mut SmtpClient,
        report: &mut Report,
    ) -> Result<(), DeliveryError> {
        let mut accepted = 0usize;

        for recipient in self.request.recipients() {
            let response = self.step("RCPT TO", client.rcpt_to(recipient)).await?;
            if response.is_success() {
                accepted += 1;
            }
            report.recipient(recipient, &response);
        }

        if accepted == 0 {
            let remote = client.peer_addr().ip().to_string();
            return Err(PermanentError::AllRecipientsRejected(remote).into());
        }

        Ok(())
    }

    async fn send_message_data(&self, client: &mut SmtpClient) -> Result<Response, DeliveryError> {
        let response = self.step("DATA", client.data()).await?;
        if !response.is_intermediate() {
            return Err(DeliveryError::from_rejection(
                &response,
                PermanentError::DataRejected,
                TemporaryError::DataRejected,
            )
            .unwrap_or_else(|| {
                DeliveryError::Protocol(format!("unexpected reply to DATA: {response}"))
            }));
        }

        let response = match self
            .deadline
            .run("message transfer", client.send_data(self.request.message()))
            .await?
        {
            Ok(response) => response,
            Err(ClientError::ParseError(reply)) => return Err(DeliveryError::Protocol(reply)),
            Err(err) => return Err(TemporaryError::DataWrite(err.to_string()).into()),
        };

        DeliveryError::from_rejection(
            &response,
            PermanentError::MessageRejected,
            TemporaryError::MessageDeferred,
        )
        .map_or(Ok(response), Err)
    }

    /// Best-effort QUIT, bounded by its own limit and the deadline.
    async fn quit(&self, client: &mut SmtpClient) {
        if !self.deadline.is_expired() {
            let limit = self.timeouts.quit().min(self.deadline.remaining());
            match self.deadline.run_within(limit, "QUIT", client.quit()).await {
                Ok(Ok(_)) => {}
                Ok(Err(err)) => debug!(error = %err, "QUIT failed"),
                Err(err) => debug!(error = %err, "QUIT did not complete"),
            }
        }

        client.close().await;
    }

    async fn step<T>(
        &self,
        step: &'static str,
        future: impl Future<Output = ClientResult<T>>,
    ) -> Result<T, DeliveryError> {
        Ok(self.deadline.run(step, future).await??)
    }
}
