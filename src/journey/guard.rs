//! Step check run before any journey page is served.

use super::{
    routes::{JourneyRoute, Step},
    store::JourneyStateStore,
};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardOutcome {
    Proceed,
    /// No entry for the journey in the session.
    NotStarted,
    /// The entry exists but does not permit this page; it has been cleared.
    EventMismatch,
}

impl GuardOutcome {
    #[must_use]
    pub const fn is_proceed(self) -> bool {
        matches!(self, Self::Proceed)
    }
}

/// Decide whether `route` may be served for the session's `journeys`.
///
/// Event pages require their event in the current allowed set; an empty set
/// (terminal state) never satisfies them. Confirmation pages require the
/// terminal state. A rejected entry is removed so the user must restart the
/// journey from its first page.
pub fn check(journeys: &mut JourneyStateStore, route: &JourneyRoute) -> GuardOutcome {
    let Some(state) = journeys.get(route.journey) else {
        warn!(
            journey = %route.journey,
            path = route.path,
            "journey not started, redirecting"
        );
        return GuardOutcome::NotStarted;
    };

    let permitted = match route.step {
        Step::Event(event) => state.allows(event),
        Step::Complete => state.value().is_terminal(),
    };
    if permitted {
        return GuardOutcome::Proceed;
    }

    warn!(
        journey = %route.journey,
        path = route.path,
        state = %state.value(),
        "journey step not permitted, clearing journey"
    );
    journeys.clear(route.journey);
    GuardOutcome::EventMismatch
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journey::{Event, JourneyType, routes::lookup};

    fn route(path: &str) -> &'static JourneyRoute {
        match lookup(path) {
            Some(route) => route,
            None => panic!("missing route {path}"),
        }
    }

    #[test]
    fn missing_entry_is_not_started_and_leaves_store_alone() {
        let mut journeys = JourneyStateStore::default();
        journeys.start(JourneyType::ChangeEmail);

        let outcome = check(&mut journeys, route("/change-password"));
        assert_eq!(outcome, GuardOutcome::NotStarted);
        assert!(journeys.get(JourneyType::ChangeEmail).is_some());
    }

    #[test]
    fn allowed_event_proceeds() {
        let mut journeys = JourneyStateStore::default();
        journeys.start(JourneyType::ChangePhoneNumber);

        let outcome = check(
            &mut journeys,
            route("/change-phone-number/enter-password"),
        );
        assert!(outcome.is_proceed());
        assert!(journeys.get(JourneyType::ChangePhoneNumber).is_some());
    }

    #[test]
    fn disallowed_event_clears_entry() {
        let mut journeys = JourneyStateStore::default();
        journeys.start(JourneyType::ChangePhoneNumber);

        // still at AUTHENTICATE, VALUE_UPDATED not permitted
        let outcome = check(&mut journeys, route("/check-your-phone"));
        assert_eq!(outcome, GuardOutcome::EventMismatch);
        assert!(journeys.get(JourneyType::ChangePhoneNumber).is_none());
    }

    #[test]
    fn terminal_state_rejects_event_pages() {
        let mut journeys = JourneyStateStore::default();
        journeys.start(JourneyType::ChangePassword);
        journeys.advance(JourneyType::ChangePassword, Event::Authenticated);
        journeys.advance(JourneyType::ChangePassword, Event::ValueUpdated);

        let outcome = check(&mut journeys, route("/change-password"));
        assert_eq!(outcome, GuardOutcome::EventMismatch);
        assert!(journeys.get(JourneyType::ChangePassword).is_none());
    }

    #[test]
    fn confirmation_page_needs_terminal_state() {
        let mut journeys = JourneyStateStore::default();
        journeys.start(JourneyType::ChangePassword);
        journeys.advance(JourneyType::ChangePassword, Event::Authenticated);

        let confirmation = route("/password-updated-confirmation");
        let mut early = journeys.clone();
        assert_eq!(check(&mut early, confirmation), GuardOutcome::EventMismatch);
        assert!(early.is_empty());

        journeys.advance(JourneyType::ChangePassword, Event::ValueUpdated);
        assert!(check(&mut journeys, confirmation).is_proceed());
    }

    #[test]
    fn other_journeys_are_untouched_by_a_rejection() {
        let mut journeys = JourneyStateStore::default();
        journeys.start(JourneyType::ChangeEmail);
        journeys.start(JourneyType::DeleteAccount);

        check(&mut journeys, route("/check-your-email"));
        assert!(journeys.get(JourneyType::ChangeEmail).is_none());
        assert!(journeys.get(JourneyType::DeleteAccount).is_some());
    }
}
