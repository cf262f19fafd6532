use anyhow::Result;
use time::OffsetDateTime;

use crate::api::{UserApi, UserProfile};
use crate::session::SessionStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmationOutcome {
    Confirmed(UserProfile),
    AlreadyConfirmed,
    Expired,
    Failed,
}

impl ConfirmationOutcome {
    pub fn message(&self) -> &'static str {
        match self {
            ConfirmationOutcome::Confirmed(_) => "Your account has been confirmed",
            ConfirmationOutcome::AlreadyConfirmed => "The account has already been confirmed",
            ConfirmationOutcome::Expired => "Account confirmation expired",
            ConfirmationOutcome::Failed => "Something wrong, try again",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ConfirmationOutcome::Confirmed(_))
    }
}

/// Whether the signed-in user should still be reminded to confirm.
pub fn needs_confirmation(profile: Option<&UserProfile>) -> bool {
    profile.is_some_and(|user| !user.account_confirmation.is_confirmed)
}

/// Checks the pending confirmation and, when it is still valid, confirms the
/// account and merges the returned fields into the cached profile.
pub async fn confirm_account(
    users: &UserApi,
    sessions: &SessionStore,
    now: OffsetDateTime,
) -> Result<ConfirmationOutcome> {
    let pending = match users.get_account_confirmation().await {
        Ok(pending) => pending,
        Err(err) => {
            tracing::warn!(?err, "fetching account confirmation failed");
            return Ok(ConfirmationOutcome::Failed);
        }
    };
    if pending.is_confirmed {
        return Ok(ConfirmationOutcome::AlreadyConfirmed);
    }
    if pending.is_expired_at(now) {
        return Ok(ConfirmationOutcome::Expired);
    }

    let patch = match users.confirm_account().await {
        Ok(patch) => patch,
        Err(err) => {
            tracing::warn!(?err, "confirming account failed");
            return Ok(ConfirmationOutcome::Failed);
        }
    };
    let cached = sessions.load()?.and_then(|session| session.user);
    let merged = match &cached {
        Some(user) => user.merged(patch),
        None => serde_json::from_value(patch),
    };
    let user = match merged {
        Ok(user) => user,
        Err(err) => {
            tracing::warn!(?err, "confirmed profile could not be read");
            return Ok(ConfirmationOutcome::Failed);
        }
    };
    sessions.update_user(user.clone())?;
    tracing::info!(email = %user.email, "account confirmed");
    Ok(ConfirmationOutcome::Confirmed(user))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::AccountConfirmationState;

    #[test]
    fn reminder_only_for_unconfirmed_users() {
        let mut user = UserProfile {
            email: "ana@example.com".into(),
            name: "Ana".into(),
            account_confirmation: AccountConfirmationState::default(),
        };
        assert!(needs_confirmation(Some(&user)));
        user.account_confirmation.is_confirmed = true;
        assert!(!needs_confirmation(Some(&user)));
        assert!(!needs_confirmation(None));
    }
}
