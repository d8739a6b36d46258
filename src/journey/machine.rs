//! Transition table shared by every account-management journey.
//!
//! Journeys only differ in which slot of the session they occupy; the machine
//! itself is a fixed lookup table evaluated by [`transition`].

use serde::{Deserialize, Serialize};
use std::{collections::BTreeSet, fmt};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StateName {
    Authenticate,
    ChangeValue,
    VerifyCode,
    Confirmation,
}

impl StateName {
    pub const ALL: [Self; 4] = [
        Self::Authenticate,
        Self::ChangeValue,
        Self::VerifyCode,
        Self::Confirmation,
    ];

    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Confirmation)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Authenticate => "AUTHENTICATE",
            Self::ChangeValue => "CHANGE_VALUE",
            Self::VerifyCode => "VERIFY_CODE",
            Self::Confirmation => "CONFIRMATION",
        }
    }

    /// Events that have a row in the table for this state.
    #[must_use]
    pub fn allowed_events(self) -> BTreeSet<Event> {
        Event::ALL
            .into_iter()
            .filter(|event| next(self, *event).is_some())
            .collect()
    }
}

impl fmt::Display for StateName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Event {
    Authenticated,
    ValueUpdated,
    VerifyCodeSent,
    ResendCode,
}

impl Event {
    pub const ALL: [Self; 4] = [
        Self::Authenticated,
        Self::ValueUpdated,
        Self::VerifyCodeSent,
        Self::ResendCode,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Authenticated => "AUTHENTICATED",
            Self::ValueUpdated => "VALUE_UPDATED",
            Self::VerifyCodeSent => "VERIFY_CODE_SENT",
            Self::ResendCode => "RESEND_CODE",
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const fn next(from: StateName, event: Event) -> Option<StateName> {
    match (from, event) {
        (StateName::Authenticate, Event::Authenticated) => Some(StateName::ChangeValue),
        (StateName::ChangeValue | StateName::VerifyCode, Event::ValueUpdated) => {
            Some(StateName::Confirmation)
        }
        (StateName::ChangeValue, Event::VerifyCodeSent) => Some(StateName::VerifyCode),
        (StateName::VerifyCode, Event::ResendCode | Event::VerifyCodeSent) => {
            Some(StateName::ChangeValue)
        }
        _ => None,
    }
}

/// Current machine position of a journey.
///
/// `allowed_events` is always derived from `value`; deserialized entries are
/// re-derived so a tampered or stale record cannot widen the set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "StoredJourneyState")]
pub struct JourneyState {
    value: StateName,
    #[serde(rename = "events")]
    allowed_events: BTreeSet<Event>,
}

#[derive(Deserialize)]
struct StoredJourneyState {
    value: StateName,
}

impl From<StoredJourneyState> for JourneyState {
    fn from(stored: StoredJourneyState) -> Self {
        Self::at(stored.value)
    }
}

impl JourneyState {
    #[must_use]
    pub fn at(value: StateName) -> Self {
        Self {
            value,
            allowed_events: value.allowed_events(),
        }
    }

    #[must_use]
    pub const fn value(&self) -> StateName {
        self.value
    }

    #[must_use]
    pub const fn allowed_events(&self) -> &BTreeSet<Event> {
        &self.allowed_events
    }

    #[must_use]
    pub fn allows(&self, event: Event) -> bool {
        self.allowed_events.contains(&event)
    }
}

#[must_use]
pub fn initial_state() -> JourneyState {
    JourneyState::at(StateName::Authenticate)
}

/// Apply `event` to `current`; events without a table row return `current` unchanged.
#[must_use]
pub fn transition(current: StateName, event: Event) -> JourneyState {
    JourneyState::at(next(current, event).unwrap_or(current))
}
