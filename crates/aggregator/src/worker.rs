//! The aggregator task.
//!
//! Single consumer of the shared event queue. Primary-camera events wait in
//! the [`PendingTable`] until a secondary camera reports the same class and
//! direction within the timeout window, or until they time out. Either way
//! each one becomes exactly one [`CompletedRecord`], buffered and flushed to
//! the [`RecordSink`] periodically and at shutdown.

use chrono::NaiveDateTime;
use common::events::{CompletedRecord, RawEvent};
use common::validation::now_local;
use std::sync::Arc;
use std::time::{Duration, Instant};
use telemetry::metrics::{
    AGGREGATOR_BUFFERED_RECORDS, AGGREGATOR_EVENTS_RECEIVED, AGGREGATOR_FLUSHES,
    AGGREGATOR_PENDING_ENTRIES, AGGREGATOR_PENDING_EVICTIONS, AGGREGATOR_RECORDS,
    AGGREGATOR_UNMATCHED_SECONDARY,
};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::AggregatorConfig;
use crate::counter::DailyCounter;
use crate::merge::build_record;
use crate::pending::{InsertOutcome, PendingTable};
use crate::sink::RecordSink;

const FINAL_FLUSH_ATTEMPTS: usize = 3;

/// Totals reported when the aggregator stops
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregatorStats {
    pub events_received: u64,
    pub paired: u64,
    pub timed_out: u64,
    pub unmatched_secondary: u64,
    pub ignored: u64,
    pub records_written: u64,
    /// Records still buffered after the last flush attempt failed
    pub records_unwritten: u64,
}

pub struct Aggregator {
    config: AggregatorConfig,
    location: String,
    sink: Arc<dyn RecordSink>,
    counter: Option<DailyCounter>,
    pending: PendingTable,
    ready: Vec<CompletedRecord>,
    last_flush: Instant,
    stats: AggregatorStats,
}

impl Aggregator {
    pub fn new(
        config: AggregatorConfig,
        location: impl Into<String>,
        sink: Arc<dyn RecordSink>,
        counter: Option<DailyCounter>,
    ) -> Self {
        let pending = PendingTable::new(config.max_pending, config.bucket);
        Self {
            config,
            location: location.into(),
            sink,
            counter,
            pending,
            ready: Vec::new(),
            last_flush: Instant::now(),
            stats: AggregatorStats::default(),
        }
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Records completed but not yet written
    pub fn ready(&self) -> &[CompletedRecord] {
        &self.ready
    }

    pub fn stats(&self) -> &AggregatorStats {
        &self.stats
    }

    pub fn spawn(
        self,
        events: UnboundedReceiver<RawEvent>,
        token: CancellationToken,
    ) -> JoinHandle<AggregatorStats> {
        tokio::spawn(self.run(events, token))
    }

    /// Consume events until `token` is cancelled or every sender is gone,
    /// then resolve all pending entries and write everything out.
    pub async fn run(
        mut self,
        mut events: UnboundedReceiver<RawEvent>,
        token: CancellationToken,
    ) -> AggregatorStats {
        info!(
            location = %self.location,
            primary = self.config.primary_camera,
            secondary = ?self.config.secondary_cameras,
            timeout_secs = self.config.timeout.as_secs(),
            "aggregator started"
        );

        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    info!("aggregator stop requested");
                    break;
                }
                received = tokio::time::timeout(self.config.recv_timeout, events.recv()) => {
                    match received {
                        Ok(Some(event)) => self.handle_event(event),
                        Ok(None) => {
                            info!("event queue closed");
                            break;
                        }
                        Err(_) => {}
                    }
                }
            }

            self.sweep_timeouts_at(now_local());
            self.maybe_flush().await;
        }

        self.drain_queue(&mut events);

        if self.config.await_pending_on_stop {
            info!(pending = self.pending.len(), "waiting for pending entries to time out");
            while !self.pending.is_empty() {
                tokio::time::sleep(self.config.recv_timeout).await;
                self.drain_queue(&mut events);
                self.sweep_timeouts_at(now_local());
                self.maybe_flush().await;
            }
        }

        self.force_timeouts();
        self.final_flush().await;

        info!(
            received = self.stats.events_received,
            paired = self.stats.paired,
            timed_out = self.stats.timed_out,
            unmatched_secondary = self.stats.unmatched_secondary,
            written = self.stats.records_written,
            unwritten = self.stats.records_unwritten,
            "aggregator stopped"
        );
        self.stats
    }

    /// Route one event by its camera role
    pub fn handle_event(&mut self, event: RawEvent) {
        self.stats.events_received += 1;
        let camera = event.camera.to_string();

        if event.camera == self.config.primary_camera {
            AGGREGATOR_EVENTS_RECEIVED
                .with_label_values(&[&camera, "primary"])
                .inc();
            self.store_primary(event);
        } else if self.config.is_secondary(event.camera) {
            AGGREGATOR_EVENTS_RECEIVED
                .with_label_values(&[&camera, "secondary"])
                .inc();
            self.match_secondary(event);
        } else {
            AGGREGATOR_EVENTS_RECEIVED
                .with_label_values(&[&camera, "ignored"])
                .inc();
            self.stats.ignored += 1;
            warn!(
                camera = event.camera,
                track_id = event.track_id,
                "event from camera without a role ignored"
            );
        }

        AGGREGATOR_PENDING_ENTRIES.set(self.pending.len() as i64);
    }

    fn store_primary(&mut self, event: RawEvent) {
        let track_id = event.track_id;
        let timestamp = event.timestamp.clone();

        match self.pending.insert(event) {
            InsertOutcome::Inserted => {
                debug!(track_id, timestamp = %timestamp, pending = self.pending.len(), "entry pending");
            }
            InsertOutcome::Replaced(previous) => {
                warn!(
                    track_id,
                    replaced_track_id = previous.track_id,
                    replaced_timestamp = %previous.timestamp,
                    "pending entry overwritten by a newer event with the same key"
                );
            }
            InsertOutcome::Evicted(oldest) => {
                AGGREGATOR_PENDING_EVICTIONS.inc();
                warn!(
                    evicted_track_id = oldest.track_id,
                    evicted_timestamp = %oldest.timestamp,
                    capacity = self.config.max_pending,
                    "pending table full, closing oldest entry"
                );
                self.complete(&oldest, None);
            }
        }
    }

    fn match_secondary(&mut self, exit: RawEvent) {
        match self.pending.take_match(&exit, self.config.timeout) {
            Some((key, primary)) => {
                info!(
                    key = %key,
                    track_id = primary.track_id,
                    exit_camera = exit.camera,
                    "entry paired with exit"
                );
                self.complete(&primary, Some(&exit));
            }
            None => {
                AGGREGATOR_UNMATCHED_SECONDARY.inc();
                self.stats.unmatched_secondary += 1;
                info!(
                    camera = exit.camera,
                    track_id = exit.track_id,
                    class_id = exit.class_id,
                    direction = %exit.direction,
                    timestamp = %exit.timestamp,
                    "no pending entry for exit event, dropped"
                );
            }
        }
    }

    fn complete(&mut self, primary: &RawEvent, exit: Option<&RawEvent>) {
        let record = build_record(primary, exit, &self.location);
        let status = if record.is_paired() {
            self.stats.paired += 1;
            "paired"
        } else {
            self.stats.timed_out += 1;
            "timeout"
        };
        AGGREGATOR_RECORDS.with_label_values(&[status]).inc();

        if let Some(counter) = &self.counter {
            let today = counter.increment();
            debug!(count = today, "daily count updated");
        }

        self.ready.push(record);
        AGGREGATOR_BUFFERED_RECORDS.set(self.ready.len() as i64);
    }

    /// Turn every entry with `now - T >= timeout` into a timeout record
    pub fn sweep_timeouts_at(&mut self, now: NaiveDateTime) -> usize {
        let expired = self.pending.take_expired(now, self.config.timeout);
        for (key, primary) in &expired {
            info!(key = %key, track_id = primary.track_id, "entry timed out without exit match");
            self.complete(primary, None);
        }
        AGGREGATOR_PENDING_ENTRIES.set(self.pending.len() as i64);
        expired.len()
    }

    /// Turn all remaining entries into timeout records, oldest first
    pub fn force_timeouts(&mut self) -> usize {
        let remaining = self.pending.drain();
        if !remaining.is_empty() {
            info!(count = remaining.len(), "closing pending entries at shutdown");
        }
        for (_, primary) in &remaining {
            self.complete(primary, None);
        }
        AGGREGATOR_PENDING_ENTRIES.set(0);
        remaining.len()
    }

    fn drain_queue(&mut self, events: &mut UnboundedReceiver<RawEvent>) {
        while let Ok(event) = events.try_recv() {
            self.handle_event(event);
        }
    }

    async fn maybe_flush(&mut self) {
        if self.last_flush.elapsed() >= self.config.flush_interval {
            self.flush().await;
        }
    }

    /// Write the buffered records; on failure they stay buffered.
    ///
    /// Returns whether the buffer is now empty.
    pub async fn flush(&mut self) -> bool {
        if self.ready.is_empty() {
            return true;
        }

        match self.sink.write_batch(&self.ready).await {
            Ok(()) => {
                AGGREGATOR_FLUSHES.with_label_values(&["ok"]).inc();
                self.stats.records_written += self.ready.len() as u64;
                self.ready.clear();
                self.last_flush = Instant::now();
                AGGREGATOR_BUFFERED_RECORDS.set(0);
                true
            }
            Err(e) => {
                AGGREGATOR_FLUSHES.with_label_values(&["error"]).inc();
                error!(error = %e, records = self.ready.len(), "failed to write records, keeping them for retry");
                self.last_flush = Instant::now();
                false
            }
        }
    }

    async fn final_flush(&mut self) {
        for attempt in 1..=FINAL_FLUSH_ATTEMPTS {
            if self.flush().await {
                self.stats.records_unwritten = 0;
                return;
            }
            if attempt < FINAL_FLUSH_ATTEMPTS {
                tokio::time::sleep(self.config.recv_timeout.min(Duration::from_secs(1))).await;
            }
        }
        self.stats.records_unwritten = self.ready.len() as u64;
        error!(records = self.ready.len(), "giving up on unwritten records");
    }
}
