//! Shared identity and record types for Gatehouse.
//!
//! This crate is the schema side of the data layer: typed principal ids, the
//! session principal, and the record shapes stored in the remote document
//! store. It has **no internal gatehouse dependencies**: a pure leaf crate
//! that the binding layer decodes into.
//!
//! # Entity-Relationship Overview
//!
//! ```text
//! Principal (PrincipalId) ← authenticated or anonymous session identity
//!     └── owns UserProfile (users/{uid})
//!     └── registers Personnel (personnel/{id}, user_id = uid)
//!
//! Personnel ← someone stationed at a facility
//!     └── visited by Visitor (visitors/{id}, visiting_personnel_id)
//! ```
//!
//! # Key Types
//!
//! |-------------------|----------------------------------------------|
//! | Type              | Purpose                                      |
//! |-------------------|----------------------------------------------|
//! | [`Principal`]     | Session identity (uid + anonymous flag)      |
//! | [`PrincipalId`]   | Who is signed in                             |
//! | [`Record`]        | Tagged union over every stored entity shape  |
//! | [`FromDocument`]  | Raw document → typed record boundary         |
//! | [`Roster`]        | Visitors joined to the personnel they visit  |
//! |-------------------|----------------------------------------------|

pub mod ids;
pub mod principal;
pub mod record;
pub mod roster;

// Re-export primary types at crate root for convenience.
pub use ids::PrincipalId;
pub use principal::Principal;
pub use record::{
    Fields, FromDocument, Personnel, PersonnelStatus, Record, RecordError, RecordKind,
    UserProfile, Visitor, VisitorStatus,
};
pub use roster::{Roster, RosterEntry};

/// Current time as Unix milliseconds. Used for error and record timestamps.
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
