//! Subprotocol negotiation.

use crate::SessionError;

/// Picks the subprotocol for a session.
///
/// The requested list is scanned in the order the peer sent it; the
/// first entry present in the accepted set wins. Declaration order of
/// the accepted set carries no weight. An empty accepted set means the
/// endpoint requires no subprotocol: negotiation succeeds with `None`
/// no matter what was requested. A non-empty accepted set with no match
/// (including an empty request) refuses the connection.
pub fn negotiate(
    accepted: &[String],
    requested: &[String],
) -> Result<Option<String>, SessionError> {
    if accepted.is_empty() {
        return Ok(None);
    }
    requested
        .iter()
        .find(|candidate| accepted.contains(*candidate))
        .cloned()
        .map(Some)
        .ok_or(SessionError::NoCompatibleSubprotocol)
}
