//! Immutable transfer-progress records observed by session surfaces
//! (spec.md §4.J), grounded on
//! `examples/original_source/sharing/transfer_metadata.h` and
//! `transfer_metadata_builder.h`. `is_final_status` is always derived
//! from `status`, never set independently — the one invariant the
//! original's builder enforces that this port keeps as a hard rule
//! rather than a caller convention.

/// Mirrors `TransferMetadata::Status`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Default, enum_iterator::Sequence)]
pub enum Status {
    #[default]
    Unknown,
    Connecting,
    AwaitingLocalConfirmation,
    AwaitingRemoteAcceptance,
    InProgress,
    Complete,
    Failed,
    Rejected,
    Cancelled,
    TimedOut,
    MediaUnavailable,
    NotEnoughSpace,
    UnsupportedAttachmentType,
    DeviceAuthenticationFailed,
    IncompletePayloads,
}

impl Status {
    /// `TransferMetadata::IsFinalStatus` (spec.md §4.J's table).
    #[must_use]
    pub const fn is_final(self) -> bool {
        matches!(
            self,
            Self::Cancelled
                | Self::Complete
                | Self::Failed
                | Self::IncompletePayloads
                | Self::MediaUnavailable
                | Self::NotEnoughSpace
                | Self::DeviceAuthenticationFailed
                | Self::Rejected
                | Self::TimedOut
                | Self::UnsupportedAttachmentType
        )
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct InProgressAttachment {
    pub id: u64,
    pub transferred_bytes: u64,
    pub total_bytes: u64,
}

/// One point-in-time progress snapshot. `is_final_status` is always
/// `status.is_final()` — [`TransferMetadataBuilder::build`] is the only
/// place that constructs one.
#[derive(Clone, Debug)]
pub struct TransferMetadata {
    pub status: Status,
    pub progress: f32,
    pub token: Option<String>,
    pub is_original: bool,
    pub is_final_status: bool,
    pub is_self_share: bool,
    pub transferred_bytes: u64,
    pub transfer_speed: u64,
    pub estimated_time_remaining: u64,
    pub total_attachments_count: u32,
    pub transferred_attachments_count: u32,
    pub in_progress_attachment: Option<InProgressAttachment>,
}

/// Builds a [`TransferMetadata`], mirroring
/// `TransferMetadataBuilder`'s fluent setters.
#[derive(Clone, Debug, Default)]
pub struct TransferMetadataBuilder {
    is_original: bool,
    progress: f32,
    status: Status,
    token: Option<String>,
    is_self_share: bool,
    transferred_bytes: u64,
    transfer_speed: u64,
    estimated_time_remaining: u64,
    total_attachments_count: u32,
    transferred_attachments_count: u32,
    in_progress_attachment: Option<InProgressAttachment>,
}

impl TransferMetadataBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a builder from an existing metadata value (`Clone` in the
    /// original), so a caller only overrides the fields that changed.
    #[must_use]
    pub fn clone_of(metadata: &TransferMetadata) -> Self {
        Self {
            is_original: metadata.is_original,
            progress: metadata.progress,
            status: metadata.status,
            token: metadata.token.clone(),
            is_self_share: metadata.is_self_share,
            transferred_bytes: metadata.transferred_bytes,
            transfer_speed: metadata.transfer_speed,
            estimated_time_remaining: metadata.estimated_time_remaining,
            total_attachments_count: metadata.total_attachments_count,
            transferred_attachments_count: metadata.transferred_attachments_count,
            in_progress_attachment: metadata.in_progress_attachment,
        }
    }

    #[must_use]
    pub const fn is_original(mut self, value: bool) -> Self {
        self.is_original = value;
        self
    }

    #[must_use]
    pub const fn progress(mut self, value: f32) -> Self {
        self.progress = value;
        self
    }

    #[must_use]
    pub const fn status(mut self, value: Status) -> Self {
        self.status = value;
        self
    }

    #[must_use]
    pub fn token(mut self, value: Option<String>) -> Self {
        self.token = value;
        self
    }

    #[must_use]
    pub const fn is_self_share(mut self, value: bool) -> Self {
        self.is_self_share = value;
        self
    }

    #[must_use]
    pub const fn transferred_bytes(mut self, value: u64) -> Self {
        self.transferred_bytes = value;
        self
    }

    #[must_use]
    pub const fn transfer_speed(mut self, value: u64) -> Self {
        self.transfer_speed = value;
        self
    }

    #[must_use]
    pub const fn estimated_time_remaining(mut self, value: u64) -> Self {
        self.estimated_time_remaining = value;
        self
    }

    #[must_use]
    pub const fn total_attachments_count(mut self, value: u32) -> Self {
        self.total_attachments_count = value;
        self
    }

    #[must_use]
    pub const fn transferred_attachments_count(mut self, value: u32) -> Self {
        self.transferred_attachments_count = value;
        self
    }

    #[must_use]
    pub const fn in_progress_attachment(mut self, value: Option<InProgressAttachment>) -> Self {
        self.in_progress_attachment = value;
        self
    }

    #[must_use]
    pub fn build(self) -> TransferMetadata {
        TransferMetadata {
            is_final_status: self.status.is_final(),
            status: self.status,
            progress: self.progress,
            token: self.token,
            is_original: self.is_original,
            is_self_share: self.is_self_share,
            transferred_bytes: self.transferred_bytes,
            transfer_speed: self.transfer_speed,
            estimated_time_remaining: self.estimated_time_remaining,
            total_attachments_count: self.total_attachments_count,
            transferred_attachments_count: self.transferred_attachments_count,
            in_progress_attachment: self.in_progress_attachment,
        }
    }
}

/// Tracks, per session, whether a final-status update has already been
/// emitted — spec.md §8 "TransferMetadata final-status lock" and §4.H
/// "a session rejects all updates after the first marked
/// `is_final_status`".
#[derive(Debug, Default)]
pub struct FinalStatusLock {
    locked: bool,
}

impl FinalStatusLock {
    /// Returns `true` if `metadata` should be delivered to observers,
    /// `false` if it must be swallowed. Once a final-status update has
    /// passed through, every subsequent call returns `false`.
    pub fn admit(&mut self, metadata: &TransferMetadata) -> bool {
        if self.locked {
            return false;
        }
        if metadata.is_final_status {
            self.locked = true;
        }
        true
    }

    #[must_use]
    pub const fn is_locked(&self) -> bool {
        self.locked
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_derives_final_status_from_status() {
        let metadata = TransferMetadataBuilder::new().status(Status::Complete).build();
        assert!(metadata.is_final_status);
        let metadata = TransferMetadataBuilder::new().status(Status::InProgress).build();
        assert!(!metadata.is_final_status);
    }

    #[test]
    fn final_status_lock_swallows_everything_after_the_first_final_update() {
        let mut lock = FinalStatusLock::default();
        let complete = TransferMetadataBuilder::new().status(Status::Complete).build();
        let cancelled = TransferMetadataBuilder::new().status(Status::Cancelled).build();

        assert!(lock.admit(&complete));
        assert!(!lock.admit(&cancelled));
        assert!(lock.is_locked());
    }

    #[test]
    fn in_progress_updates_pass_through_freely() {
        let mut lock = FinalStatusLock::default();
        for pct in [10.0, 20.0, 30.0] {
            let update = TransferMetadataBuilder::new().status(Status::InProgress).progress(pct).build();
            assert!(lock.admit(&update));
        }
    }

    #[test]
    fn every_status_variant_round_trips_through_a_lock() {
        for status in enum_iterator::all::<Status>() {
            let mut lock = FinalStatusLock::default();
            let metadata = TransferMetadataBuilder::new().status(status).build();
            assert!(lock.admit(&metadata));
            assert_eq!(lock.is_locked(), status.is_final());
        }
    }
}
