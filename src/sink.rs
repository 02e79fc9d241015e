//! Ingestion Sink Adapter: delivers batches with bounded retries.

use std::thread;

use tracing::{debug, info, warn};

use crate::{
    batch::Batch,
    error::IngestionError,
    exporter::{Delivery, Exporter},
    range::TimeRange,
    retry::{Event, FailureCause, RetryPolicy, SendState},
};

#[derive(Debug)]
pub struct Sink<E> {
    exporter: E,
    policy: RetryPolicy,
}
impl<E: Exporter> Sink<E> {
    pub fn new(exporter: E, policy: RetryPolicy) -> Self {
        Self { exporter, policy }
    }
    pub fn exporter(&self) -> &E {
        &self.exporter
    }

    /// Returns the number of attempts it took.
    pub fn send(&mut self, batch: &Batch) -> Result<u32, IngestionError> {
        let Some(window) = batch.window() else {
            return Ok(0);
        };
        let payload = batch.encode();
        let mut state = SendState::Idle;
        loop {
            let event = match &state {
                SendState::Idle => Event::Start,
                SendState::Sending { attempt } => {
                    debug!(attempt, records = batch.len(), bytes = payload.len(), %window, "sending batch");
                    let delivery = self.exporter.export(&payload);
                    if let Delivery::Transient(reason) = &delivery {
                        warn!(attempt, %reason, %window, "transient sink failure");
                    }
                    Event::Delivered(delivery)
                }
                SendState::RetryWait { delay, .. } => {
                    info!(delay_ms = delay.as_millis() as u64, %window, "retrying batch after backoff");
                    thread::sleep(*delay);
                    Event::Elapsed
                }
                SendState::Success { attempts } => return Ok(*attempts),
                SendState::PermanentFailure { attempts, cause } => {
                    return Err(failure(window, *attempts, cause.clone()));
                }
            };
            state = state.next(event, &self.policy);
        }
    }

    pub fn finish(&mut self) -> Result<(), IngestionError> {
        self.exporter.finish().map_err(IngestionError::Finish)
    }
}

fn failure(window: TimeRange, attempts: u32, cause: FailureCause) -> IngestionError {
    match cause {
        FailureCause::Rejected(reason) => IngestionError::Rejected { window, reason },
        FailureCause::RetriesExhausted(reason) => IngestionError::RetriesExhausted {
            window,
            attempts,
            reason,
        },
    }
}
