//! SMTP transparency for the DATA phase.

/// Prepare a message for transmission after a 354 reply.
///
/// Bare LF line endings become CRLF, lines starting with `.` get an extra
/// leading dot, and the result is terminated by `CRLF . CRLF`. Everything
/// else is passed through byte for byte.
#[must_use]
pub fn encode_data(message: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(message.len() + message.len() / 32 + 5);
    let mut at_line_start = true;
    let mut previous = 0u8;

    for &byte in message {
        if at_line_start && byte == b'.' {
            out.push(b'.');
        }
        if byte == b'\n' && previous != b'\r' {
            out.push(b'\r');
        }
        out.push(byte);

        at_line_start = byte == b'\n';
        previous = byte;
    }

    if !out.is_empty() && !out.ends_with(b"\r\n") {
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(b".\r\n");

    out
}
