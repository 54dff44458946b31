//! Status polling until an upload reaches a terminal state.
//!
//! The poller fetches a snapshot, reports flows that finished since the
//! previous snapshot, and sleeps before fetching again. Transient failures are
//! absorbed here:
//!
//! | Status query result | Next step |
//! |---------------------|-----------|
//! | snapshot, not completed | sleep `interval`, fetch again |
//! | snapshot, completed | print summary, return [`PollOutcome::Completed`] |
//! | HTTP 429 | grow `interval` by the backoff factor, fetch again |
//! | HTTP >= 500 | retry at the same `interval`, up to the server-error budget |
//! | anything else | return [`PollError`] |
//!
//! A watchdog runs next to the loop. When it fires it prints a warning and
//! stops further fetches; it neither aborts an in-flight request nor fails the
//! run.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use maestro_upload::client::{ApiClient, BackendTarget};
//! use maestro_upload::model::UploadJob;
//! use maestro_upload::poller::{PollSettings, StatusPoller};
//! use maestro_upload::report::TerminalConsole;
//!
//! # async fn example(job: UploadJob) -> anyhow::Result<()> {
//! let client = ApiClient::new("key", "https://api.mobile.dev", BackendTarget::cloud())?;
//! let poller = StatusPoller::new(client, Arc::new(TerminalConsole), PollSettings::default());
//!
//! let outcome = poller.poll(&job).await?;
//! std::process::exit(outcome.exit_code());
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::{ApiError, StatusSource};
use crate::model::{Flow, FlowStatus, UploadJob};
use crate::report::{Console, JobOutputs, ResultReporter, failed_flows_summary};
use crate::tracker::FlowTracker;

/// Status code the service uses for rate limiting.
const TOO_MANY_REQUESTS: u16 = 429;

/// Timing and retry parameters of a polling session.
#[derive(Debug, Clone, PartialEq)]
pub struct PollSettings {
    /// Delay between two status queries.
    pub interval: Duration,

    /// How long to wait for completion before giving up.
    pub timeout: Duration,

    /// Factor applied to the interval after a rate-limited response.
    pub backoff_factor: f64,

    /// Upper bound for the interval grown by backoff.
    pub max_interval: Duration,

    /// Server errors tolerated in one session before failing.
    pub max_server_errors: u32,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            timeout: Duration::from_secs(30 * 60),
            backoff_factor: 1.25,
            max_interval: Duration::from_secs(5 * 60),
            max_server_errors: 3,
        }
    }
}

/// Final state of an upload that completed.
#[derive(Debug, Clone)]
pub struct JobSummary {
    pub upload_id: String,
    pub status: FlowStatus,
    pub flows: Vec<Flow>,
    /// Overall status and flow results, ready to publish.
    pub outputs: JobOutputs,
}

impl JobSummary {
    /// Message describing the failure, if the upload failed.
    pub fn failure_message(&self) -> Option<String> {
        self.status
            .is_failure()
            .then(|| failed_flows_summary(&self.flows))
    }
}

/// How a polling session ended, short of an error.
#[derive(Debug, Clone)]
pub enum PollOutcome {
    /// The service reported the upload as completed.
    Completed(JobSummary),

    /// The watchdog fired before completion was observed.
    TimedOut,
}

impl PollOutcome {
    /// Returns `false` only when the upload completed with a failing status.
    ///
    /// A timeout is not a failure: the upload may still finish remotely.
    pub fn success(&self) -> bool {
        match self {
            PollOutcome::Completed(summary) => !summary.status.is_failure(),
            PollOutcome::TimedOut => true,
        }
    }

    pub fn failure_message(&self) -> Option<String> {
        match self {
            PollOutcome::Completed(summary) => summary.failure_message(),
            PollOutcome::TimedOut => None,
        }
    }

    /// Process exit code for this outcome.
    pub fn exit_code(&self) -> i32 {
        if self.success() { 0 } else { 1 }
    }
}

/// Polling failures that end the run.
#[derive(Debug, thiserror::Error)]
pub enum PollError {
    /// The server-error budget is spent.
    #[error(
        "Request to get status information failed with status code {status}: {body}. \
         View the Upload in the console for more information: {console_url}"
    )]
    ServerErrors {
        status: u16,
        body: String,
        console_url: String,
    },

    /// A status query failed in a way that is not retried.
    #[error(
        "Could not get Upload status - received error {source}. \
         View the Upload in the console for more information: {console_url}"
    )]
    Status {
        #[source]
        source: ApiError,
        console_url: String,
    },

    /// The completion outputs could not be serialized.
    #[error("Failed to serialize flow results: {0}")]
    Outputs(#[from] serde_json::Error),
}

/// Client-side state of one polling session.
#[derive(Debug)]
struct PollingSession {
    interval: Duration,
    server_errors: u32,
    tracker: FlowTracker,
    stopped: CancellationToken,
}

impl PollingSession {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            server_errors: 0,
            tracker: FlowTracker::new(),
            stopped: CancellationToken::new(),
        }
    }

    /// Grows the interval after a rate-limited response. Never shrinks it.
    ///
    /// A product that is not a valid duration jumps straight to the ceiling.
    fn back_off(&mut self, settings: &PollSettings) {
        let grown =
            Duration::try_from_secs_f64(self.interval.as_secs_f64() * settings.backoff_factor)
                .unwrap_or(settings.max_interval);
        self.interval = grown.min(settings.max_interval).max(self.interval);
    }
}

/// Aborts the watchdog task when dropped.
struct Watchdog {
    handle: JoinHandle<()>,
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Polls an upload until it completes, fails, or times out.
pub struct StatusPoller<S> {
    source: S,
    reporter: ResultReporter,
    settings: PollSettings,
}

impl<S: StatusSource> StatusPoller<S> {
    pub fn new(source: S, console: Arc<dyn Console>, settings: PollSettings) -> Self {
        Self {
            source,
            reporter: ResultReporter::new(console),
            settings,
        }
    }

    /// Runs a polling session for `job`.
    ///
    /// The first status query is issued immediately. Each flow is printed once,
    /// the first time it is seen in a terminal status. Sessions are
    /// independent: calling this concurrently for different jobs is fine.
    ///
    /// # Errors
    ///
    /// Returns [`PollError`] when the server-error budget is spent or a status
    /// query fails in a non-retriable way. Both messages include the console
    /// URL of the job.
    pub async fn poll(&self, job: &UploadJob) -> Result<PollOutcome, PollError> {
        let mut session = PollingSession::new(self.settings.interval);
        let watchdog = self.spawn_watchdog(session.stopped.clone(), job.console_url.clone());

        self.reporter
            .console()
            .info("Waiting for analyses to complete...\n");

        loop {
            if session.stopped.is_cancelled() {
                debug!(upload_id = %job.upload_id, "Polling stopped by watchdog");
                return Ok(PollOutcome::TimedOut);
            }

            match self.source.fetch_status(&job.upload_id).await {
                Ok(snapshot) => {
                    for flow in session
                        .tracker
                        .newly_terminal(self.source.target(), &snapshot.flows)
                    {
                        self.reporter.report_flow(flow);
                    }

                    if snapshot.completed {
                        drop(watchdog);
                        info!(
                            upload_id = %job.upload_id,
                            status = %snapshot.status,
                            flows = snapshot.flows.len(),
                            "Upload completed"
                        );

                        self.reporter.report_completion(
                            &snapshot.status,
                            &snapshot.flows,
                            &job.console_url,
                        );
                        let outputs = JobOutputs::for_completion(&snapshot.status, &snapshot.flows)?;

                        return Ok(PollOutcome::Completed(JobSummary {
                            upload_id: snapshot.upload_id,
                            status: snapshot.status,
                            flows: snapshot.flows,
                            outputs,
                        }));
                    }

                    debug!(
                        upload_id = %job.upload_id,
                        status = %snapshot.status,
                        reported = session.tracker.reported_count(),
                        interval_ms = session.interval.as_millis() as u64,
                        "Upload still running"
                    );
                }
                Err(ApiError::StatusQuery { status, .. }) if status == TOO_MANY_REQUESTS => {
                    session.back_off(&self.settings);
                    warn!(
                        upload_id = %job.upload_id,
                        interval_ms = session.interval.as_millis() as u64,
                        server_errors = session.server_errors,
                        "Rate limited, backing off"
                    );
                }
                Err(ApiError::StatusQuery { status, body, .. }) if status >= 500 => {
                    if session.server_errors >= self.settings.max_server_errors {
                        return Err(PollError::ServerErrors {
                            status,
                            body,
                            console_url: job.console_url.clone(),
                        });
                    }
                    session.server_errors += 1;
                    warn!(
                        upload_id = %job.upload_id,
                        status,
                        server_errors = session.server_errors,
                        interval_ms = session.interval.as_millis() as u64,
                        "Server error, retrying"
                    );
                }
                Err(source) => {
                    return Err(PollError::Status {
                        source,
                        console_url: job.console_url.clone(),
                    });
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(session.interval) => {}
                _ = session.stopped.cancelled() => {}
            }
        }
    }

    fn spawn_watchdog(&self, stopped: CancellationToken, console_url: String) -> Watchdog {
        let console = self.reporter.console().clone();
        let timeout = self.settings.timeout;

        let handle = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            warn!(timeout_secs = timeout.as_secs(), "Timed out waiting for upload");
            console.warning(&format!(
                "Timed out waiting for Upload to complete. \
                 View the Upload in the console for more information: {}",
                console_url
            ));
            stopped.cancel();
        });

        Watchdog { handle }
    }
}
