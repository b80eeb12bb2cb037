use mailparse::MailHeaderMap;

/// Header carrying the queue manager's correlation id.
pub const CORRELATION_HEADER: &str = "X-QB-UUID";

/// Correlation id used when the message does not carry one.
pub const DEFAULT_CORRELATION_ID: &str = "nouuid";

/// Sender host used for the null (bounce) sender.
pub const BOUNCE_SENDER_HOST: &str = "bounce";

/// A single delivery request, threaded through every stage of a delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    id: String,
    destination: String,
    sender: String,
    recipients: Vec<String>,
    message: Vec<u8>,
}

impl Request {
    /// Build a request from the invocation arguments and the raw message.
    ///
    /// The destination and sender are lower-cased; the correlation id is read
    /// from the message headers.
    #[must_use]
    pub fn new(destination: &str, sender: &str, recipients: Vec<String>, message: Vec<u8>) -> Self {
        Self {
            id: correlation_id(&message),
            destination: destination.to_lowercase(),
            sender: sender.to_lowercase(),
            recipients,
            message,
        }
    }

    /// Retrieve the correlation id of this request
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn destination(&self) -> &str {
        &self.destination
    }

    #[must_use]
    pub fn sender(&self) -> &str {
        &self.sender
    }

    #[must_use]
    pub fn recipients(&self) -> &[String] {
        &self.recipients
    }

    #[must_use]
    pub fn message(&self) -> &[u8] {
        &self.message
    }

    /// The domain part of the sender, or `bounce` for a sender without one.
    #[must_use]
    pub fn sender_host(&self) -> &str {
        self.sender.split('@').nth(1).unwrap_or(BOUNCE_SENDER_HOST)
    }
}

/// Extract the correlation id from the message headers.
#[must_use]
pub fn correlation_id(message: &[u8]) -> String {
    mailparse::parse_headers(message)
        .ok()
        .and_then(|(headers, _)| headers.get_first_value(CORRELATION_HEADER))
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| DEFAULT_CORRELATION_ID.to_string())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_request_lowercases_routing_fields() {
        let request = Request::new(
            "Example.COM",
            "Alice@Sender.Example",
            vec!["Bob@Example.com".to_string()],
            b"Subject: hi\r\n\r\nbody\r\n".to_vec(),
        );

        assert_eq!(request.destination(), "example.com");
        assert_eq!(request.sender(), "alice@sender.example");
        assert_eq!(request.sender_host(), "sender.example");
        // Recipients are passed to the remote server exactly as given
        assert_eq!(request.recipients(), ["Bob@Example.com".to_string()]);
    }

    #[test]
    fn test_bounce_sender_host() {
        let request = Request::new("example.com", "", vec!["a@example.com".to_string()], Vec::new());
        assert_eq!(request.sender_host(), BOUNCE_SENDER_HOST);
    }

    #[test]
    fn test_correlation_id_from_header() {
        let message = b"From: a@example.com\r\nX-QB-UUID: 1234-abcd\r\nSubject: test\r\n\r\nbody\r\n";
        assert_eq!(correlation_id(message), "1234-abcd");
    }

    #[test]
    fn test_correlation_id_missing() {
        let message = b"From: a@example.com\r\nSubject: test\r\n\r\nbody\r\n";
        assert_eq!(correlation_id(message), DEFAULT_CORRELATION_ID);
        assert_eq!(correlation_id(b""), DEFAULT_CORRELATION_ID);
    }
}
