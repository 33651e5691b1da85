//! [`SendSession`]: wraps [`engine::ActiveSend`] with the bookkeeping fields
//! the engine crate deliberately leaves to the session-admission layer —
//! `quiet`, the bypass check, the expected spec count, and whether metadata
//! has already gone out (`spec.md` §4.5).

use logging::Quiet;

/// One outbound transfer's full session state: an [`engine::ActiveSend`] plus
/// the admission-layer fields that decide *whether* and *how loudly* it talks
/// back to the remote.
pub struct SendSession {
    pub(crate) inner: engine::ActiveSend,
    pub(crate) quiet: Quiet,
    pub(crate) bypass_ok: Option<bool>,
    pub(crate) expected_num_of_args: i64,
    pub(crate) metadata_sent: bool,
}

impl SendSession {
    pub(crate) fn new(
        id: impl Into<String>,
        quiet: i64,
        bypass_ok: Option<bool>,
        expected_num_of_args: i64,
    ) -> Self {
        let id = id.into();
        Self {
            inner: engine::ActiveSend::new(id),
            quiet: Quiet::from_wire(quiet),
            bypass_ok,
            expected_num_of_args,
            metadata_sent: false,
        }
    }

    /// Whether the spec-collection phase has reached the count the remote
    /// announced up front (`spec.md` §4.5 `spec_complete`). The caller is
    /// responsible for calling `inner.mark_spec_complete()` once
    /// [`Self::specs_reached_expected_count`] turns `true` — this type only
    /// tracks the threshold, not the one-way latch itself.
    pub(crate) fn spec_complete(&self) -> bool {
        self.inner.spec_complete()
    }

    /// Whether enough `file` specs have been collected to reach the count
    /// the remote announced in its `receive` command's `sz` field.
    pub(crate) fn specs_reached_expected_count(&self) -> bool {
        i64::try_from(self.inner.pending_specs().len()).unwrap_or(i64::MAX) >= self.expected_num_of_args
    }
}
