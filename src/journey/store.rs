//! Per-session map of in-flight journeys.

use super::machine::{Event, JourneyState, initial_state, transition};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt, str::FromStr};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum JourneyType {
    ChangeEmail,
    ChangePassword,
    ChangePhoneNumber,
    AddBackupMethod,
    RemoveBackupMethod,
    SwitchBackupMethod,
    ChangeDefaultMethod,
    ChangeAuthenticatorApp,
    DeleteAccount,
    GlobalLogout,
    NoUkMobilePhone,
}

impl JourneyType {
    pub const ALL: [Self; 11] = [
        Self::ChangeEmail,
        Self::ChangePassword,
        Self::ChangePhoneNumber,
        Self::AddBackupMethod,
        Self::RemoveBackupMethod,
        Self::SwitchBackupMethod,
        Self::ChangeDefaultMethod,
        Self::ChangeAuthenticatorApp,
        Self::DeleteAccount,
        Self::GlobalLogout,
        Self::NoUkMobilePhone,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ChangeEmail => "changeEmail",
            Self::ChangePassword => "changePassword",
            Self::ChangePhoneNumber => "changePhoneNumber",
            Self::AddBackupMethod => "addBackupMethod",
            Self::RemoveBackupMethod => "removeBackupMethod",
            Self::SwitchBackupMethod => "switchBackupMethod",
            Self::ChangeDefaultMethod => "changeDefaultMethod",
            Self::ChangeAuthenticatorApp => "changeAuthenticatorApp",
            Self::DeleteAccount => "deleteAccount",
            Self::GlobalLogout => "globalLogout",
            Self::NoUkMobilePhone => "noUkMobilePhone",
        }
    }
}

impl fmt::Display for JourneyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JourneyType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|journey| journey.as_str() == s)
            .ok_or_else(|| format!("unknown journey: {s}"))
    }
}

/// Journeys currently in flight for one session.
///
/// Absence of an entry means the journey was never started (or was cleared),
/// which guarded pages treat as "not permitted".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JourneyStateStore {
    entries: BTreeMap<JourneyType, JourneyState>,
}

impl JourneyStateStore {
    #[must_use]
    pub fn get(&self, journey: JourneyType) -> Option<&JourneyState> {
        self.entries.get(&journey)
    }

    /// Put `journey` at the machine's initial state, replacing any previous entry.
    pub fn start(&mut self, journey: JourneyType) -> &JourneyState {
        self.entries.insert(journey, initial_state());
        &self.entries[&journey]
    }

    /// Apply `event` to the entry for `journey`.
    ///
    /// Returns `None` without touching the map when the journey was never started.
    pub fn advance(&mut self, journey: JourneyType, event: Event) -> Option<&JourneyState> {
        let Some(current) = self.entries.get_mut(&journey) else {
            warn!(journey = %journey, event = %event, "journey state is not initialized");
            return None;
        };
        *current = transition(current.value(), event);
        Some(current)
    }

    pub fn clear(&mut self, journey: JourneyType) -> Option<JourneyState> {
        self.entries.remove(&journey)
    }

    pub fn iter(&self) -> impl Iterator<Item = (JourneyType, &JourneyState)> {
        self.entries.iter().map(|(journey, state)| (*journey, state))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
