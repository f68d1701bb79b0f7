//! Restart loop for long-running tasks.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::engine::Runner;
use crate::metrics;

/// Run `runner` over and over on a background task until `token` is cancelled.
///
/// Cancellation is only observed between attempts: an attempt that is already
/// running is left to finish, and its outcome is still written to `sink`.
/// After every attempt the loop sleeps for `delay`, whatever the outcome.
pub fn until<W>(
    runner: Arc<dyn Runner>,
    mut sink: W,
    name: &'static str,
    delay: Duration,
    token: CancellationToken,
) -> JoinHandle<()>
where
    W: Write + Send + 'static,
{
    tokio::spawn(async move {
        loop {
            if token.is_cancelled() {
                info!(task = name, "supervised task stopped");
                return;
            }

            debug!(task = name, "starting supervised attempt");
            let result = runner.run().await;
            metrics::record_supervised_exit(name, result.is_ok());

            let line = match &result {
                Ok(()) => {
                    warn!(task = name, "exited with no errors");
                    format!("{}: exited with no errors", name)
                }
                Err(e) => {
                    error!(task = name, error = %e, "exited with error");
                    format!("{}: exited with error: {}", name, e)
                }
            };
            if let Err(e) = writeln!(sink, "{}", line).and_then(|_| sink.flush()) {
                warn!(task = name, error = %e, "failed to write status line");
            }

            tokio::time::sleep(delay).await;
        }
    })
}
