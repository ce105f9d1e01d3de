//! Community, club, and room membership.
//!
//! The ledger turns the store's uniqueness constraints into domain rules:
//! one community per user, unique club memberships, idempotent auto-join
//! rooms. Creation flows best-effort join the creator and a reconciliation
//! pass repairs the ones that failed.

mod error;
mod ledger;
mod types;

pub use error::{MembershipError, MembershipResult};
pub use ledger::MembershipLedger;
pub use types::{Club, Community, CreatedClub, CreatedRoom, Room};
