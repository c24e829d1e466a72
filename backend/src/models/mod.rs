//! Data models shared across the session store and API handlers.

pub mod location;
pub mod share_session;

pub use location::{LocationFix, LocationInput, LocationSample};
pub use share_session::{ShareSession, SessionSummary};
