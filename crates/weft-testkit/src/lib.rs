//! # weft-testkit
//!
//! In-process duplex test harness for [`weft`] applications.
//!
//! The harness wires a real application stack (router, guards, hooks,
//! session engine) to one end of a bounded queue pair and lets the
//! test play the remote peer over the other end, with no socket and no
//! real time. Connections refused by the app, handshakes that never
//! complete, unread traffic at teardown, and handler failures all
//! surface as distinct [`HarnessError`] values instead of hangs.
//!
//! ```rust,ignore
//! use weft::prelude::*;
//! use weft_testkit::WebSocketTester;
//!
//! let tester = WebSocketTester::new(app);
//! let mut session = tester.connect("/echo").open().await?;
//! session.send("hello").await?;
//! assert_eq!(session.receive().await?.as_text(), Some("hello"));
//! session.close().await?;
//! ```

mod error;
mod session;
mod tester;

pub use error::HarnessError;
pub use session::TestSession;
pub use tester::{Connect, DEFAULT_HANDSHAKE_TIMEOUT, DEFAULT_RECEIVE_TIMEOUT, WebSocketTester};
