//! qremote delivers one message from the qmail queue to a remote SMTP server.
//!
//! Invocation is `qremote host sender recipient...` with the message on
//! standard input. Whatever happens, the outcome is written to standard output
//! as NUL-terminated records and the process exits with status 0.

mod app;
mod cli;
mod settings;

use std::{ffi::OsString, io::Read, sync::Arc};

pub use app::{App, failure};
use clap::Parser;
pub use cli::Cli;
use qremote_common::{logging, tracing::error};
use qremote_delivery::{DeliveryError, DnsResolver, Record, TemporaryError};
pub use settings::{CONFIG_ENV, Settings};

/// Run one invocation and return the records to report.
///
/// Usage errors are reported before anything else is looked at.
pub fn run<I, T>(args: I, input: &mut impl Read) -> Vec<Record>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let Ok(cli) = Cli::try_parse_from(args) else {
        return vec![Record::usage()];
    };

    let settings = match Settings::load() {
        Ok(settings) => settings.with_control_root(cli.control_root.clone()),
        Err(err) => {
            logging::init(None);
            error!("Unable to load settings: {err:#}");
            return failure(&cli, &TemporaryError::Settings(format!("{err:#}")).into());
        }
    };

    logging::init(settings.log_level.as_deref());

    let lookup = match DnsResolver::with_dns_config(&settings.dns) {
        Ok(resolver) => resolver,
        Err(err) => {
            error!(error = %err, "Unable to create the DNS resolver");
            return failure(&cli, &DeliveryError::from(err));
        }
    };

    App::new(settings, Arc::new(lookup)).dispatch(cli, input)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_usage_record_for_missing_arguments() {
        let records = run(["qremote", "example.com", "alice@sender.test"], &mut std::io::empty());

        assert_eq!(records, vec![Record::usage()]);
        assert_eq!(
            records[0].encode(),
            b"DI (qremote) was invoked improperly. (#5.3.5)\0".to_vec()
        );
    }
}
