//! Static page table consumed by the journey guard.

use self::Step::Complete;
use super::{machine::Event, store::JourneyType};
use super::store::JourneyType::{
    AddBackupMethod, ChangeAuthenticatorApp, ChangeDefaultMethod, ChangeEmail, ChangePassword,
    ChangePhoneNumber, DeleteAccount, GlobalLogout, NoUkMobilePhone, RemoveBackupMethod,
    SwitchBackupMethod,
};

pub const YOUR_SERVICES: &str = "/your-services";
pub const SESSION_EXPIRED: &str = "/session-expired";
pub const SIGNED_OUT: &str = "/signed-out";

/// What a page needs from the session's journey entry before it may be shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// The page fires this event, so the current state must permit it.
    Event(Event),
    /// Confirmation page, only reachable once the journey reached its terminal state.
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JourneyRoute {
    pub path: &'static str,
    pub journey: JourneyType,
    pub step: Step,
}

const fn route(path: &'static str, journey: JourneyType, step: Step) -> JourneyRoute {
    JourneyRoute {
        path,
        journey,
        step,
    }
}

const AUTHENTICATED: Step = Step::Event(Event::Authenticated);
const VALUE_UPDATED: Step = Step::Event(Event::ValueUpdated);
const VERIFY_CODE_SENT: Step = Step::Event(Event::VerifyCodeSent);
const RESEND_CODE: Step = Step::Event(Event::ResendCode);

pub const SIGN_OUT_EVERYWHERE: &str = "/sign-out-everywhere";

pub static JOURNEY_ROUTES: &[JourneyRoute] = &[
    route("/change-email/enter-password", ChangeEmail, AUTHENTICATED),
    route("/change-email", ChangeEmail, VERIFY_CODE_SENT),
    route("/check-your-email", ChangeEmail, VALUE_UPDATED),
    route("/resend-email-code", ChangeEmail, RESEND_CODE),
    route("/email-updated-confirmation", ChangeEmail, Complete),
    route("/change-password/enter-password", ChangePassword, AUTHENTICATED),
    route("/change-password", ChangePassword, VALUE_UPDATED),
    route("/password-updated-confirmation", ChangePassword, Complete),
    route(
        "/change-phone-number/enter-password",
        ChangePhoneNumber,
        AUTHENTICATED,
    ),
    route("/change-phone-number", ChangePhoneNumber, VERIFY_CODE_SENT),
    route("/check-your-phone", ChangePhoneNumber, VALUE_UPDATED),
    route("/resend-phone-code", ChangePhoneNumber, RESEND_CODE),
    route(
        "/phone-number-updated-confirmation",
        ChangePhoneNumber,
        Complete,
    ),
    route(
        "/no-uk-mobile-phone/enter-password",
        NoUkMobilePhone,
        AUTHENTICATED,
    ),
    route("/no-uk-mobile-phone", NoUkMobilePhone, VALUE_UPDATED),
    route("/add-mfa-method/enter-password", AddBackupMethod, AUTHENTICATED),
    route("/add-mfa-method-app", AddBackupMethod, VALUE_UPDATED),
    route("/add-mfa-method-sms", AddBackupMethod, VERIFY_CODE_SENT),
    route("/add-mfa-method-sms/check-your-phone", AddBackupMethod, VALUE_UPDATED),
    route("/add-mfa-method-confirmation", AddBackupMethod, Complete),
    route(
        "/delete-mfa-method/enter-password",
        RemoveBackupMethod,
        AUTHENTICATED,
    ),
    route("/delete-mfa-method", RemoveBackupMethod, VALUE_UPDATED),
    route("/remove-backup-confirmation", RemoveBackupMethod, Complete),
    route(
        "/switch-backup-method/enter-password",
        SwitchBackupMethod,
        AUTHENTICATED,
    ),
    route("/switch-backup-method", SwitchBackupMethod, VALUE_UPDATED),
    route(
        "/switch-backup-method-confirmation",
        SwitchBackupMethod,
        Complete,
    ),
    route(
        "/change-default-method/enter-password",
        ChangeDefaultMethod,
        AUTHENTICATED,
    ),
    route("/change-default-method-app", ChangeDefaultMethod, VALUE_UPDATED),
    route("/change-default-method-sms", ChangeDefaultMethod, VERIFY_CODE_SENT),
    route(
        "/change-default-method/check-your-phone",
        ChangeDefaultMethod,
        VALUE_UPDATED,
    ),
    route(
        "/change-default-method-confirmation",
        ChangeDefaultMethod,
        Complete,
    ),
    route(
        "/change-authenticator-app/enter-password",
        ChangeAuthenticatorApp,
        AUTHENTICATED,
    ),
    route("/change-authenticator-app", ChangeAuthenticatorApp, VALUE_UPDATED),
    route(
        "/authenticator-app-updated-confirmation",
        ChangeAuthenticatorApp,
        Complete,
    ),
    route("/delete-account/enter-password", DeleteAccount, AUTHENTICATED),
    route("/delete-account", DeleteAccount, VALUE_UPDATED),
    route("/sign-out-everywhere/enter-password", GlobalLogout, AUTHENTICATED),
    route(SIGN_OUT_EVERYWHERE, GlobalLogout, VALUE_UPDATED),
];

#[must_use]
pub fn lookup(path: &str) -> Option<&'static JourneyRoute> {
    JOURNEY_ROUTES.iter().find(|route| route.path == path)
}

/// Page that asks for the user's password and fires `AUTHENTICATED`.
#[must_use]
pub fn entry_page(journey: JourneyType) -> Option<&'static JourneyRoute> {
    JOURNEY_ROUTES
        .iter()
        .find(|route| route.journey == journey && route.step == AUTHENTICATED)
}

/// Page the browser moves on to once the password was accepted.
#[must_use]
pub fn page_after_password(journey: JourneyType) -> Option<&'static JourneyRoute> {
    JOURNEY_ROUTES
        .iter()
        .skip_while(|route| !(route.journey == journey && route.step == AUTHENTICATED))
        .nth(1)
        .filter(|route| route.journey == journey)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn paths_are_unique() {
        let mut seen = HashSet::new();
        for route in JOURNEY_ROUTES {
            assert!(seen.insert(route.path), "duplicate path {}", route.path);
        }
    }

    #[test]
    fn every_journey_has_an_entry_page() {
        for journey in JourneyType::ALL {
            assert!(
                JOURNEY_ROUTES.iter().any(|route| route.journey == journey),
                "{journey} has no pages"
            );
        }
    }

    #[test]
    fn every_journey_continues_after_the_password() {
        for journey in JourneyType::ALL {
            let entry = entry_page(journey);
            assert!(
                entry.is_some_and(|route| route.path.ends_with("/enter-password")),
                "{journey} has no entry page"
            );
            let next = page_after_password(journey);
            assert!(
                next.is_some_and(|route| route.journey == journey && route.step != AUTHENTICATED),
                "{journey} has nowhere to go after the password"
            );
        }
        assert_eq!(
            page_after_password(GlobalLogout).map(|route| route.path),
            Some(SIGN_OUT_EVERYWHERE)
        );
        assert_eq!(
            page_after_password(ChangeEmail).map(|route| route.path),
            Some("/change-email")
        );
    }

    #[test]
    fn lookup_finds_declared_step() {
        let route = lookup("/check-your-phone");
        assert_eq!(
            route.map(|route| (route.journey, route.step)),
            Some((ChangePhoneNumber, VALUE_UPDATED))
        );
        assert!(lookup("/not-a-journey-page").is_none());
    }
}
