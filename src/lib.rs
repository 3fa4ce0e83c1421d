//! Authentication runtime for CLI tools and agents.
//!
//! A "formula" is a small JSON document describing how one OAuth provider
//! wants to be talked to: its endpoints, its client(s), and — for Device
//! Code and Authorization Code flows — the script an agent-facing caller
//! should render while the flow is in progress. This crate turns a parsed
//! formula plus a caller's overrides into a runnable [`formula::Plan`],
//! drives the matching OAuth grant through [`engine`], and persists the
//! result through a [`store::Store`]. A [`coordinator::RefreshCoordinator`]
//! keeps a long-lived credential fresh across however many processes happen
//! to share that store.
//!
//! # Example
//!
//! ```rust,no_run
//! use schlussel::formula::{Formula, Overrides};
//! use schlussel::oauth::HttpClient;
//! use schlussel::store::{MemoryStore, Store};
//! use schlussel::engine;
//!
//! # fn main() -> schlussel::error::Result<()> {
//! let formula: Formula = Formula::from_value(&serde_json::json!({
//!     "schema": "v2",
//!     "id": "acme",
//!     "label": "Acme",
//!     "methods": {
//!         "device": {
//!             "endpoints": {
//!                 "device": "https://acme.example/device/code",
//!                 "token": "https://acme.example/oauth/token"
//!             }
//!         }
//!     },
//!     "apis": {},
//!     "clients": [{"name": "default", "id": "acme-cli"}]
//! }))?;
//!
//! let plan = formula.resolve_plan(Some("device"), None, &Overrides::default())?;
//! let method = &formula.methods[&plan.method_name];
//! let http = HttpClient::new();
//! let store = Store::Memory(MemoryStore::new());
//!
//! let token = engine::run_device_flow(&http, &store, method, &plan, |ctx| {
//!     println!("visit {} and enter {}", ctx.verification_uri.as_deref().unwrap_or(""), ctx.user_code.as_deref().unwrap_or(""));
//! })?;
//! # let _ = token;
//! # Ok(())
//! # }
//! ```
//!
//! For more detail, see:
//!
//! - [`formula`] for the provider description and the plan interpreter
//! - [`engine`] for driving a resolved plan's OAuth flow to completion
//! - [`oauth`] for the grant implementations themselves (device, authcode,
//!   registration, refresh)
//! - [`store`] for the three credential-store backends
//! - [`coordinator`] and [`lock`] for cross-process-safe refresh
#![deny(unsafe_code)]

pub mod coordinator;
pub mod engine;
pub mod error;
pub mod formula;
pub mod lock;
pub mod oauth;
pub mod pkce;
pub mod platform;
pub mod store;
pub mod token;
pub mod urlencode;

pub use error::{Error, Result};
pub use token::Token;

/// Re-exports of the types most callers need, so `use schlussel::prelude::*`
/// covers the common path without naming every module.
pub mod prelude {
    pub use crate::coordinator::{RefreshCoordinator, RefreshTarget};
    pub use crate::engine;
    pub use crate::error::{Error, Result};
    pub use crate::formula::{Formula, Overrides, Plan};
    pub use crate::oauth::HttpClient;
    pub use crate::store::Store;
    pub use crate::token::Token;
}
