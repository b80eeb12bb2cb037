use std::path::PathBuf;

use clap::Parser;

/// Deliver one message from the queue to a remote SMTP server.
///
/// The message is read from standard input; the outcome is written to
/// standard output as NUL-terminated records.
#[derive(Parser, Debug, Clone)]
#[command(name = "qremote")]
#[command(version)]
pub struct Cli {
    /// Directory holding `control/`, overriding the settings file
    #[arg(long, value_name = "DIR")]
    pub control_root: Option<PathBuf>,

    /// Host the message is destined for
    pub host: String,

    /// Envelope sender, empty for bounces
    #[arg(allow_hyphen_values = true)]
    pub sender: String,

    /// Envelope recipients
    #[arg(required = true, num_args = 1.., allow_hyphen_values = true)]
    pub recipients: Vec<String>,
}
