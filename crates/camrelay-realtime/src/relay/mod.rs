//! Event routing between the members of a session.

pub mod router;

pub use router::{Delivery, RelayOutcome, RelayRouter};
