//! Account-management journeys: the shared state machine, the per-session
//! journey map, the page table and the guard that ties them together.

pub mod guard;
mod machine;
pub mod routes;
mod store;

pub use guard::{GuardOutcome, check};
pub use machine::{Event, JourneyState, StateName, initial_state, transition};
pub use routes::{JOURNEY_ROUTES, JourneyRoute, Step};
pub use store::{JourneyStateStore, JourneyType};
