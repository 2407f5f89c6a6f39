//! Session lifecycle callbacks.

use weft_session::{SessionError, SessionOutcome, SessionRequest};

/// Observes session boundaries on an app.
///
/// Both callbacks default to no-ops, so implementors override only the
/// ones they need. Hooks run inline on the connection task; keep them
/// brief.
pub trait SessionHooks: Send + Sync + 'static {
    /// Runs once per connection, after the guards pass and before the
    /// engine takes over.
    fn on_session_start(&self, _request: &SessionRequest) {}

    /// Runs once per connection, after the engine returns.
    ///
    /// `result` is the engine's verdict: a clean outcome, or the error
    /// about to propagate to the caller.
    fn on_session_end(
        &self,
        _request: &SessionRequest,
        _result: &Result<SessionOutcome, SessionError>,
    ) {
    }
}

/// Default hooks that observe nothing.
pub struct NoHooks;

impl SessionHooks for NoHooks {}
