use std::{io::Read, sync::Arc};

use qremote_common::{
    context::{DEFAULT_CORRELATION_ID, Request},
    control::ControlFiles,
    tracing::{debug, error},
};
use qremote_delivery::{
    Deadline, DeliveryAgent, DeliveryError, Lookup, Record, Report, TemporaryError,
};
use rand::{SeedableRng, rngs::StdRng};

use crate::{cli::Cli, settings::Settings};

/// One invocation: read the message, deliver it, report.
pub struct App {
    settings: Settings,
    lookup: Arc<dyn Lookup>,
}

impl App {
    #[must_use]
    pub fn new(settings: Settings, lookup: Arc<dyn Lookup>) -> Self {
        Self { settings, lookup }
    }

    /// Deliver the message on `input` as `cli` describes.
    ///
    /// The watchdog starts here, before the message is read.
    pub fn dispatch(&self, cli: Cli, input: &mut impl Read) -> Vec<Record> {
        let deadline = Deadline::after(self.settings.timeouts.watchdog());

        let mut message = Vec::new();
        if let Err(err) = input.read_to_end(&mut message) {
            error!(error = %err, "Unable to read the message");
            return failure(&cli, &TemporaryError::MessageUnreadable(err.to_string()).into());
        }
        debug!(bytes = message.len(), "Read message");

        let runtime = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime,
            Err(err) => {
                error!(error = %err, "Unable to start the runtime");
                return failure(&cli, &TemporaryError::ConnectionFailed(err.to_string()).into());
            }
        };

        let request = Request::new(&cli.host, &cli.sender, cli.recipients, message);
        runtime
            .block_on(self.deliver(&request, deadline))
            .into_records()
    }

    /// Deliver `request` using the control files under the configured root.
    pub async fn deliver(&self, request: &Request, deadline: Deadline) -> Report {
        let control = Arc::new(ControlFiles::new(self.settings.control_root.clone()));
        let agent = DeliveryAgent::new(
            control,
            Arc::clone(&self.lookup),
            self.settings.timeouts.clone(),
        );

        let mut rng = StdRng::from_os_rng();
        agent.deliver(request, deadline, &mut rng).await
    }
}

/// The records for an invocation that failed before delivery began.
pub fn failure(cli: &Cli, error: &DeliveryError) -> Vec<Record> {
    let mut report = Report::new(DEFAULT_CORRELATION_ID, &cli.sender, &cli.recipients);
    report.failed(error);
    report.into_records()
}
