//! Session keeping - connectivity-aware token refresh against the auth provider.
//!
//! The pieces:
//!
//! - [`ConnectivityProber`] - times a cheap provider call with growing
//!   deadlines and classifies the connection
//! - [`RefreshPolicyTable`] - maps a [`ConnectionQuality`] to check interval,
//!   refresh margin and attempt timeout
//! - [`SessionStore`] - the current session plus failure bookkeeping
//! - [`SessionService`] - the facade every authenticated operation goes through
//! - [`RefreshScheduler`] - background loop that refreshes ahead of expiry
//!
//! # Example
//!
//! ```ignore
//! use bodyshop_core::domain::session::{
//!     RefreshScheduler, SessionConfig, SessionService, SupabaseAuthProvider, ToastOptions,
//!     TracingNotifier,
//! };
//!
//! let provider = Arc::new(SupabaseAuthProvider::new(client));
//! let service = SessionService::new(provider, TracingNotifier, SessionConfig::default());
//! service.probe_connectivity().await;
//!
//! let mut scheduler = RefreshScheduler::new(service.clone());
//! scheduler.start();
//!
//! let invoice = service
//!     .execute_with_valid_session(&ToastOptions::default().with_error("Load failed"), |session| {
//!         repo.get(&session, id)
//!     })
//!     .await?;
//! ```
//!
//! Refreshes are single-flight: concurrent callers that find the token inside
//! the margin all await the same provider call. After
//! `max_consecutive_failures` failed refreshes in a row the service halts and
//! the scheduler stops until [`RefreshScheduler::reset`] is called.

mod notifier;
mod policy;
mod prober;
mod scheduler;
mod service;
mod store;
mod traits;
mod types;

pub mod provider;

pub use notifier::{Notifier, Toast, ToastLevel, ToastOptions, TracingNotifier};
pub use policy::{LatencyThresholds, PolicyError, RefreshPolicy, RefreshPolicyTable};
pub use prober::ConnectivityProber;
pub use provider::SupabaseAuthProvider;
pub use scheduler::RefreshScheduler;
pub use service::{SessionConfig, SessionService};
pub use store::SessionStore;
pub use traits::{AuthProvider, Result, SessionError};
pub use types::{ConnectionQuality, ProbeOutcome, Session, SessionEvent, SessionStatus, SessionUser};
