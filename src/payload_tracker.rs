//! Aggregates per-payload byte updates into session-wide progress,
//! transfer speed, and ETA (spec.md §4.G), grounded on
//! `examples/original_source/sharing/payload_tracker.h`. The sliding
//! window width (spec.md §9 Open Question) is resolved in `DESIGN.md`
//! to 500 ms, taken from [`crate::config::Config::transfer_speed_window`].

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::config::Config;
use crate::transfer_metadata::{InProgressAttachment, Status, TransferMetadata, TransferMetadataBuilder};

/// Per-payload status (spec.md §4.G).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PayloadStatus {
    InProgress,
    Success,
    Cancelled,
    Failed,
}

#[derive(Clone, Debug)]
struct PayloadState {
    attachment_id: u64,
    total_size: u64,
    amount_transferred: u64,
    status: PayloadStatus,
}

/// One incoming update from the connection manager's payload-status
/// listener.
#[derive(Clone, Copy, Debug)]
pub struct PayloadTransferUpdate {
    pub payload_id: u64,
    pub status: PayloadStatus,
    pub bytes_transferred: u64,
}

struct SpeedWindow {
    start: Instant,
    start_bytes: u64,
}

/// Aggregates [`PayloadTransferUpdate`]s for one session into
/// [`TransferMetadata`] snapshots.
pub struct PayloadTracker {
    is_self_share: bool,
    payload_state: HashMap<u64, PayloadState>,
    total_transfer_size: u64,
    transferred_attachments_count: u32,
    last_emitted_progress_percent: i32,
    last_emission: Option<Instant>,
    window: Option<SpeedWindow>,
    current_speed: f64,
    in_progress_payload_id: Option<u64>,
    emission_interval: Duration,
    window_size: Duration,
}

impl PayloadTracker {
    /// `attachment_payload_map` gives the `(payload_id -> attachment_id,
    /// total_size)` table the session built while processing the
    /// introduction frame.
    #[must_use]
    pub fn new(config: &Config, is_self_share: bool, attachment_sizes: &HashMap<u64, (u64, u64)>) -> Self {
        let mut payload_state = HashMap::with_capacity(attachment_sizes.len());
        let mut total_transfer_size = 0u64;
        for (&payload_id, &(attachment_id, total_size)) in attachment_sizes {
            total_transfer_size += total_size;
            payload_state.insert(
                payload_id,
                PayloadState {
                    attachment_id,
                    total_size,
                    amount_transferred: 0,
                    status: PayloadStatus::InProgress,
                },
            );
        }
        Self {
            is_self_share,
            payload_state,
            total_transfer_size,
            transferred_attachments_count: 0,
            last_emitted_progress_percent: -1,
            last_emission: None,
            window: None,
            current_speed: 0.0,
            in_progress_payload_id: None,
            emission_interval: Duration::from_millis(200),
            window_size: config.transfer_speed_window,
        }
    }

    fn total_transferred(&self) -> u64 {
        self.payload_state.values().map(|s| s.amount_transferred).sum()
    }

    fn overall_progress_percent(&self) -> f32 {
        if self.total_transfer_size == 0 {
            return 100.0;
        }
        (self.total_transferred() as f64 / self.total_transfer_size as f64 * 100.0) as f32
    }

    fn final_status(&self) -> Option<Status> {
        if self.payload_state.values().any(|s| s.status == PayloadStatus::Cancelled) {
            return Some(Status::Cancelled);
        }
        if self.payload_state.values().all(|s| s.status == PayloadStatus::Success) {
            return Some(Status::Complete);
        }
        if self.payload_state.values().any(|s| s.status == PayloadStatus::Failed) {
            return Some(Status::Failed);
        }
        None
    }

    /// Folds in one [`PayloadTransferUpdate`], returning a
    /// [`TransferMetadata`] snapshot if spec.md §4.G step 3's emission
    /// conditions are met, at the given `now` (the caller supplies the
    /// clock reading so this stays independent of wall-clock access).
    pub fn on_update(&mut self, update: PayloadTransferUpdate, now: Instant) -> Option<TransferMetadata> {
        let became_terminal;
        {
            let Some(state) = self.payload_state.get_mut(&update.payload_id) else {
                return None;
            };
            let was_success = state.status == PayloadStatus::Success;
            state.amount_transferred = update.bytes_transferred.min(state.total_size);
            state.status = update.status;
            became_terminal = !was_success && state.status == PayloadStatus::Success;
        }
        if became_terminal {
            self.transferred_attachments_count += 1;
        }

        let progress_percent = self.overall_progress_percent();
        let progress_int = progress_percent as i32;
        let progress_increased = progress_int > self.last_emitted_progress_percent;
        let became_terminal_update = matches!(
            update.status,
            PayloadStatus::Success | PayloadStatus::Cancelled | PayloadStatus::Failed
        );
        let rate_limited_elapsed = self
            .last_emission
            .map_or(true, |last| now.duration_since(last) >= self.emission_interval);

        if !(progress_increased || became_terminal_update || rate_limited_elapsed) {
            return None;
        }

        self.last_emitted_progress_percent = progress_int;
        self.last_emission = Some(now);

        let (speed, eta) = self.update_speed_and_eta(now, progress_percent);

        let status = self.final_status().unwrap_or(Status::InProgress);
        let in_progress_attachment = self.in_progress_payload_id.and_then(|id| {
            self.payload_state.get(&id).map(|s| InProgressAttachment {
                id: s.attachment_id,
                transferred_bytes: s.amount_transferred,
                total_bytes: s.total_size,
            })
        });

        Some(
            TransferMetadataBuilder::new()
                .status(status)
                .progress(progress_percent)
                .is_self_share(self.is_self_share)
                .transferred_bytes(self.total_transferred())
                .transfer_speed(speed)
                .estimated_time_remaining(eta)
                .total_attachments_count(self.payload_state.len() as u32)
                .transferred_attachments_count(self.transferred_attachments_count)
                .in_progress_attachment(in_progress_attachment)
                .build(),
        )
    }

    /// Sliding-window speed/ETA (spec.md §4.G step 4). The first window
    /// uses the instantaneous rate since there is no prior sample to
    /// diff against.
    fn update_speed_and_eta(&mut self, now: Instant, _progress_percent: f32) -> (u64, u64) {
        let transferred = self.total_transferred();
        match &self.window {
            None => {
                self.window = Some(SpeedWindow { start: now, start_bytes: transferred });
            }
            Some(window) => {
                let elapsed = now.duration_since(window.start);
                if elapsed >= self.window_size {
                    let delta_bytes = transferred.saturating_sub(window.start_bytes);
                    self.current_speed = delta_bytes as f64 / elapsed.as_secs_f64().max(f64::EPSILON);
                    self.window = Some(SpeedWindow { start: now, start_bytes: transferred });
                }
            }
        }
        if self.current_speed <= 0.0 {
            // First window: instantaneous rate over whatever has elapsed
            // so far since tracking began.
            let elapsed = self
                .window
                .as_ref()
                .map(|w| now.duration_since(w.start).as_secs_f64())
                .unwrap_or(0.0)
                .max(f64::EPSILON);
            self.current_speed = transferred as f64 / elapsed;
        }
        let remaining = self.total_transfer_size.saturating_sub(transferred);
        let eta = if self.current_speed > 0.0 {
            (remaining as f64 / self.current_speed) as u64
        } else {
            0
        };
        (self.current_speed as u64, eta)
    }
}
