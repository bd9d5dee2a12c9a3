/// Diagnostics counters for one session. None of these represent failures
/// surfaced to callers; they exist so drops and fallbacks stay observable.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyncStats {
    pub snapshots_sent: u64,
    pub ticks_suppressed: u64,
    pub forced_sends: u64,
    pub messages_received: u64,
    pub stale_drops: u64,
    pub duplicate_drops: u64,
    pub decode_errors: u64,
    pub unroutable_drops: u64,
    pub authority_rejects: u64,
    pub teleport_snaps: u64,
    pub extrapolation_freezes: u64,
}
