//! Release of the `in_flight` flag when an operation's backend call settles.

use crate::snapshot::SessionSnapshot;

use super::{SessionController, SessionState};

/// Marks an authentication operation that is waiting on the backend.
///
/// The operation consumes it with [`Flight::land`] once the call resolves. If the
/// operation's future is dropped first, the abort transition runs instead so
/// `in_flight` can never stay set.
pub(super) struct Flight<'a> {
    controller: &'a SessionController,
    operation: &'static str,
    abort: Option<fn(&mut SessionSnapshot)>,
}

impl<'a> Flight<'a> {
    pub(super) const fn new(
        controller: &'a SessionController,
        operation: &'static str,
        abort: fn(&mut SessionSnapshot),
    ) -> Self {
        Self {
            controller,
            operation,
            abort: Some(abort),
        }
    }

    /// Applies the landing transition in a single published update.
    pub(super) fn land<R>(mut self, apply: impl FnOnce(&mut SessionState) -> R) -> R {
        self.abort = None;
        self.controller.update(apply)
    }
}

impl Drop for Flight<'_> {
    fn drop(&mut self) {
        if let Some(abort) = self.abort.take() {
            log::warn!(
                "{} cancelled while waiting on the backend, releasing session",
                self.operation
            );
            self.controller.update(|state| abort(&mut state.snapshot));
        }
    }
}
