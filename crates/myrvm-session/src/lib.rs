//! # MyRVM Session
//!
//! Kiosk session lifecycle for the MyRVM platform.
//!
//! An RVM requests a session and shows its token as a QR code; a user's phone
//! claims it (or the kiosk starts a guest session), and every later request
//! re-validates the session's IP and user-agent binding.
//!
//! - [`SessionService`]: create, claim, authorize, expire, destroy, cleanup,
//!   statistics, security validation and sliding renewal
//! - [`middleware::session_security`]: per-request Axum gate
//! - [`SessionEvent`]: in-process notifications for a broadcast bridge

pub mod error;
pub mod events;
pub mod middleware;
pub mod model;
pub mod service;

pub use error::{SESSION_SECURITY_FAILED, SessionError};
pub use events::SessionEvent;
pub use middleware::{CurrentSession, SESSION_TOKEN_HEADER, session_security};
pub use model::{CleanupPreview, NewSession, SessionRecord, SessionStats, SessionStatus};
pub use myrvm_config::SessionTtl;
pub use service::{SESSION_ID_LENGTH, SessionService, generate_session_id};
