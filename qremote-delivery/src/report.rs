//! Delivery records for the queue manager.
//!
//! Each record is one status byte, free text, and a terminating NUL. Records
//! for individual recipients come first, then exactly one record with the
//! overall outcome.

use std::{
    fmt,
    io::{self, Write},
    net::SocketAddr,
};

use qremote_common::context::Request;
use qremote_smtp::client::{ReplyClass, Response};

use crate::error::DeliveryError;

/// Text of the record written when the arguments make no sense.
pub const USAGE: &str = "I (qremote) was invoked improperly. (#5.3.5)";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tag {
    /// `K`: the message was accepted.
    Success,
    /// `D`: the message can never be delivered.
    Permanent,
    /// `Z`: try again later.
    Temporary,
    /// `r`
    RecipientAccepted,
    /// `h`
    RecipientRejected,
    /// `s`
    RecipientDeferred,
}

impl Tag {
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        match self {
            Self::Success => b'K',
            Self::Permanent => b'D',
            Self::Temporary => b'Z',
            Self::RecipientAccepted => b'r',
            Self::RecipientRejected => b'h',
            Self::RecipientDeferred => b's',
        }
    }

    /// Returns `true` for the tags that close a report.
    #[must_use]
    pub const fn is_final(self) -> bool {
        matches!(self, Self::Success | Self::Permanent | Self::Temporary)
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", char::from(self.as_byte()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    tag: Tag,
    text: String,
}

impl Record {
    pub fn new(tag: Tag, text: impl Into<String>) -> Self {
        // A NUL inside the text would end the record early
        let text = text.into().replace('\0', " ");
        Self { tag, text }
    }

    /// The record for a bad invocation.
    #[must_use]
    pub fn usage() -> Self {
        Self::new(Tag::Permanent, USAGE)
    }

    #[must_use]
    pub const fn tag(&self) -> Tag {
        self.tag
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// The bytes written to the queue manager.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.text.len() + 2);
        bytes.push(self.tag.as_byte());
        bytes.extend_from_slice(self.text.as_bytes());
        bytes.push(0);
        bytes
    }
}

/// Write `records` in order and flush.
///
/// # Errors
///
/// Returns an error if writing fails.
pub fn write_records<W: Write>(out: &mut W, records: &[Record]) -> io::Result<()> {
    for record in records {
        out.write_all(&record.encode())?;
    }
    out.flush()
}

/// The records of one delivery, built up as it progresses.
///
/// Survives a delivery that is cut short: whatever recipient records were
/// added before the cut stay in place ahead of the final record.
#[derive(Debug, Clone)]
pub struct Report {
    id: String,
    sender: String,
    recipients: Vec<String>,
    connection: Option<(SocketAddr, SocketAddr)>,
    records: Vec<Record>,
}

impl Report {
    #[must_use]
    pub fn new(id: &str, sender: &str, recipients: &[String]) -> Self {
        Self {
            id: id.to_string(),
            sender: sender.to_string(),
            recipients: recipients.to_vec(),
            connection: None,
            records: Vec::new(),
        }
    }

    #[must_use]
    pub fn for_request(request: &Request) -> Self {
        Self::new(request.id(), request.sender(), request.recipients())
    }

    /// Note the connection now carrying the session.
    pub fn connected(&mut self, local: SocketAddr, remote: SocketAddr) {
        self.connection = Some((local, remote));
    }

    /// Record the server's answer to one RCPT.
    pub fn recipient(&mut self, recipient: &str, response: &Response) {
        let (tag, message) = match response.class() {
            ReplyClass::Success => (Tag::RecipientAccepted, "recipient accepted.".to_string()),
            ReplyClass::Transient => (
                Tag::RecipientDeferred,
                format!("does not like recipient. Remote host said: {response}"),
            ),
            ReplyClass::Permanent => (
                Tag::RecipientRejected,
                format!("does not like recipient. Remote host said: {response}"),
            ),
        };

        let text = format!("{}{message}", self.prefix(recipient));
        self.records.push(Record::new(tag, text));
    }

    /// Close the report with the server's acceptance of the message.
    pub fn accepted(&mut self, response: &Response) {
        let text = format!(
            "{}accepted message. Remote host said: {response}",
            self.prefix(&self.recipients.join(","))
        );
        self.records.push(Record::new(Tag::Success, text));
    }

    /// Close the report with a failure.
    pub fn failed(&mut self, error: &DeliveryError) {
        let text = format!(
            "{}{}",
            self.prefix(&self.recipients.join(",")),
            error.diagnostic()
        );
        self.records.push(Record::new(error.tag(), text));
    }

    #[must_use]
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    #[must_use]
    pub fn into_records(self) -> Vec<Record> {
        self.records
    }

    /// The tag of the final record, once there is one.
    #[must_use]
    pub fn outcome(&self) -> Option<Tag> {
        self.records
            .last()
            .map(Record::tag)
            .filter(|tag| tag.is_final())
    }

    /// # Errors
    ///
    /// Returns an error if writing fails.
    pub fn write_to<W: Write>(&self, out: &mut W) -> io::Result<()> {
        write_records(out, &self.records)
    }

    fn prefix(&self, recipients: &str) -> String {
        match self.connection {
            Some((local, remote)) => format!(
                "{}:{local}->{remote}:{}:{recipients}:",
                self.id, self.sender
            ),
            None => format!("{}:{}:{recipients}:", self.id, self.sender),
        }
    }
}
