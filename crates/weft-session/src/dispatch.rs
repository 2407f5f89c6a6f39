//! The dispatch contract between the handler adapter and the engine.

use std::future::Future;

use futures_util::future::BoxFuture;

use crate::{Session, SessionError};

/// One session's worth of application logic.
///
/// Implemented automatically for any `Fn(Session) -> Future<Output =
/// Result<(), SessionError>>`, so plain async functions register
/// directly as handlers.
pub trait SessionHandler: Send + Sync + 'static {
    fn call(&self, session: Session) -> BoxFuture<'static, Result<(), SessionError>>;
}

impl<F, Fut> SessionHandler for F
where
    F: Fn(Session) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), SessionError>> + Send + 'static,
{
    fn call(&self, session: Session) -> BoxFuture<'static, Result<(), SessionError>> {
        Box::pin(self(session))
    }
}
