use crate::api::{DeviceSource, Error};
use crate::device::{assemble_values, Batch, ClassifyMode};
use crate::report::{human_time_format, Notifier, PollState};
use crate::writer::PointWriter;
use chrono::{DateTime, Local, Utc};

#[derive(Debug)]
pub enum CycleOutcome {
    Written(Batch),
    GatewayFailed(Error),
    /// The batch was dropped.
    WriteFailed(Batch, Error),
}

impl CycleOutcome {
    pub fn batch(&self) -> Option<&Batch> {
        match self {
            CycleOutcome::Written(batch) | CycleOutcome::WriteFailed(batch, _) => Some(batch),
            CycleOutcome::GatewayFailed(_) => None,
        }
    }
}

/// Poll the gateway once, assemble the batch and hand it to `writer`.
pub async fn run_cycle<S, W>(
    source: &S,
    writer: &W,
    mode: ClassifyMode,
    state: &mut PollState,
) -> CycleOutcome
where
    S: DeviceSource + ?Sized,
    W: PointWriter + ?Sized,
{
    let captured_at: DateTime<Utc> = Utc::now();

    let list = match source.device_list().await {
        Ok(list) => list,
        Err(e) => {
            log::error!(
                "at {} something went wrong polling the PVS: {}",
                human_time_format(&Local::now()),
                e
            );
            state.record_poll_failure(&e);
            return CycleOutcome::GatewayFailed(e);
        }
    };

    let batch = assemble_values(mode, &list.devices);
    if batch.is_empty() {
        log::warn!("the PVS reported no devices");
    }
    for failure in &batch.errors {
        log::warn!(
            "skipping device #{} ({}): {}",
            failure.index,
            failure.serial.as_deref().unwrap_or("no serial"),
            failure.error
        );
    }

    match writer.write(&batch.points, captured_at).await {
        Ok(()) => {
            log::info!(
                "wrote {} points, {} devices skipped",
                batch.points.len(),
                batch.errors.len()
            );
            state.record_batch(&batch);
            CycleOutcome::Written(batch)
        }
        Err(e) => {
            log::error!(
                "at {} something went wrong writing {} points: {}",
                human_time_format(&Local::now()),
                batch.points.len(),
                e
            );
            state.record_write_failure(&batch, &e);
            CycleOutcome::WriteFailed(batch, e)
        }
    }
}

/// Count the finished cycle and send the window's report, if there is one.
pub async fn close_cycle<N>(state: &mut PollState, notifier: &N, now: DateTime<Local>)
where
    N: Notifier + ?Sized,
{
    if let Some(report) = state.advance(&now) {
        log::info!("report window closed: {}", report.subject);
        if let Err(e) = notifier.notify(&report).await {
            log::error!("could not send report: {}", e);
        }
    }
}
