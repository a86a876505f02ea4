//! Local device visibility: who is allowed to discover this device's
//! advertisement. Used by the advertisement codec (spec.md §6) and by
//! the paired-key verification runner's "visibility gate" (spec.md
//! §4.E step 4).

/// Mirrors the 5-bit visibility field packed into an advertisement's
/// version/visibility byte.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Default, num_enum::IntoPrimitive, num_enum::TryFromPrimitive)]
#[repr(u8)]
pub enum DeviceVisibility {
    #[default]
    Unknown = 0,
    Everyone = 1,
    Contacts = 2,
    SelfShare = 3,
    Hidden = 4,
}

impl DeviceVisibility {
    /// `true` for the visibilities spec.md §4.E calls out as "we never
    /// do silent transfers from strangers": `Everyone` and `Hidden`.
    #[must_use]
    pub const fn is_stranger_facing(self) -> bool {
        matches!(self, Self::Everyone | Self::Hidden)
    }
}

/// The local visibility at the time of verification and the visibility
/// that was in effect just before it — needed to tell a transient
/// "currently visible to contacts" window from a sustained
/// stranger-facing one (spec.md §4.E step 4).
#[derive(Clone, Copy, Debug)]
pub struct VisibilityHistory {
    pub current: DeviceVisibility,
    pub previous: DeviceVisibility,
}

impl VisibilityHistory {
    /// Whether a successful paired-key verification should be
    /// downgraded to `Unable` because we are not transiently visible to
    /// contacts (i.e. both the current and prior visibility are
    /// stranger-facing).
    #[must_use]
    pub const fn forbids_silent_acceptance(&self) -> bool {
        self.current.is_stranger_facing() && self.previous.is_stranger_facing()
    }
}
