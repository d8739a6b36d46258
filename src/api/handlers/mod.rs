//! Route handlers.

pub mod health;
pub mod journeys;
pub mod logout;
