use crate::api::Error;
use crate::device::{Batch, DeviceFailure};
use async_trait::async_trait;
use chrono::{DateTime, Local};
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::collections::BTreeSet;
use std::mem;

pub const HUMAN_TIME_FORMAT: &str = "%a, %d %b %Y %H:%M:%S";

pub fn human_time_format(time: &DateTime<Local>) -> String {
    time.format(HUMAN_TIME_FORMAT).to_string()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub subject: String,
    pub body: String,
}

/// Everything that went wrong since the last report.
#[derive(Debug, Default)]
struct Window {
    failed_polls: u64,
    failed_writes: u64,
    device_errors: u64,
    last_error: Option<String>,
    faulted: BTreeSet<String>,
    seen: BTreeSet<String>,
}

impl Window {
    fn record_inverters(&mut self, batch: &Batch) {
        self.seen
            .extend(batch.reported_inverters().map(String::from));
        self.faulted
            .extend(batch.faulted_inverters().map(String::from));
        self.device_errors += batch.errors.len() as u64;
        if let Some(DeviceFailure { error, .. }) = batch.errors.last() {
            self.last_error = Some(error.to_string());
        }
    }

    fn into_report(self, known_inverters: &[String], now: &DateTime<Local>) -> Option<Report> {
        let missing: Vec<&str> = known_inverters
            .iter()
            .filter(|serial| !self.seen.contains(*serial))
            .map(String::as_str)
            .collect();

        let mut issues = Vec::new();
        if self.failed_polls > 0 {
            issues.push(format!("gateway polls failed: {}", self.failed_polls));
        }
        if self.failed_writes > 0 {
            issues.push(format!("database writes failed: {}", self.failed_writes));
        }
        if self.device_errors > 0 {
            issues.push(format!("device records rejected: {}", self.device_errors));
        }
        if !self.faulted.is_empty() {
            let faulted: Vec<&str> = self.faulted.iter().map(String::as_str).collect();
            issues.push(format!("inverters not working: {}", faulted.join(", ")));
        }
        if !missing.is_empty() {
            issues.push(format!("inverters not reported: {}", missing.join(", ")));
        }

        if issues.is_empty() {
            return None;
        }

        let mut body = format!("sunpower monitor report at {}\n\n", human_time_format(now));
        for issue in &issues {
            body.push_str(issue);
            body.push('\n');
        }
        if let Some(error) = self.last_error {
            body.push_str(&format!("\nlast error: {}\n", error));
        }

        Some(Report {
            subject: format!("sunpower monitor: {} issue(s) to look at", issues.len()),
            body,
        })
    }
}

/// Loop state carried from one poll cycle to the next.
#[derive(Debug)]
pub struct PollState {
    /// Cycles since the last report window closed.
    pub count: u64,
    cycles_per_report: u64,
    known_inverters: Vec<String>,
    window: Window,
}

impl PollState {
    pub fn new(interval_secs: u64, report_interval_secs: u64, known_inverters: Vec<String>) -> Self {
        PollState {
            count: 0,
            cycles_per_report: (report_interval_secs / interval_secs.max(1)).max(1),
            known_inverters,
            window: Window::default(),
        }
    }

    pub fn record_batch(&mut self, batch: &Batch) {
        self.window.record_inverters(batch);
    }

    pub fn record_poll_failure(&mut self, error: &Error) {
        self.window.failed_polls += 1;
        self.window.last_error = Some(error.to_string());
    }

    pub fn record_write_failure(&mut self, batch: &Batch, error: &Error) {
        self.window.record_inverters(batch);
        self.window.failed_writes += 1;
        self.window.last_error = Some(error.to_string());
    }

    /// Count a finished cycle. Closes the window once it spans the report interval and
    /// returns a report if anything went wrong in it.
    pub fn advance(&mut self, now: &DateTime<Local>) -> Option<Report> {
        self.count += 1;
        if self.count < self.cycles_per_report {
            return None;
        }

        self.count = 0;
        mem::take(&mut self.window).into_report(&self.known_inverters, now)
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, report: &Report) -> Result<(), Error>;
}

pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, report: &Report) -> Result<(), Error> {
        log::warn!("{}\n{}", report.subject, report.body);
        Ok(())
    }
}

pub struct EmailNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    receivers: Vec<String>,
}

impl EmailNotifier {
    /// SMTP over implicit TLS (port 465) to `server`.
    pub fn new(
        server: &str,
        username: String,
        password: String,
        sender: &str,
        receivers: Vec<String>,
    ) -> Result<Self, Error> {
        let from: Mailbox = sender
            .parse()
            .map_err(|e| Error::NotifyError(format!("invalid sender {}: {}", sender, e)))?;

        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(server)
            .map_err(|e| Error::NotifyError(format!("invalid SMTP relay {}: {}", server, e)))?
            .credentials(Credentials::new(username, password))
            .build();

        Ok(EmailNotifier {
            transport,
            from,
            receivers,
        })
    }
}

#[async_trait]
impl Notifier for EmailNotifier {
    async fn notify(&self, report: &Report) -> Result<(), Error> {
        let mut result = Ok(());

        for receiver in &self.receivers {
            let to: Mailbox = match receiver.parse() {
                Ok(to) => to,
                Err(e) => {
                    log::error!("invalid report receiver {}, skipping: {}", receiver, e);
                    continue;
                }
            };

            let message = Message::builder()
                .from(self.from.clone())
                .to(to)
                .subject(report.subject.as_str())
                .body(report.body.clone())
                .map_err(|e| Error::NotifyError(e.to_string()))?;

            match self.transport.send(message).await {
                Ok(_) => log::info!("report sent to {}", receiver),
                Err(e) => {
                    log::error!("a SMTP error occurred sending to {}: {}", receiver, e);
                    result = Err(Error::NotifyError(e.to_string()));
                }
            }
        }

        result
    }
}
