use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use thiserror::Error;
use time::OffsetDateTime;

use super::{decode, expect_status, ApiClient, ApiError};

const NAME_MAX: usize = 80;
const PASSWORD_MIN: usize = 6;
const PASSWORD_MAX: usize = 80;

static EMAIL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid email pattern"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FormError {
    #[error("Name must be at least 1 character")]
    NameTooShort,
    #[error("Name cannot have more than 80 characters")]
    NameTooLong,
    #[error("Email is invalid")]
    InvalidEmail,
    #[error("Password must be at least 6 characters")]
    PasswordTooShort,
    #[error("Password cannot have more than 80 characters")]
    PasswordTooLong,
    #[error("Passwords must be the same")]
    PasswordMismatch,
}

fn check_name(name: &str) -> Result<(), FormError> {
    let len = name.trim().chars().count();
    if len == 0 {
        return Err(FormError::NameTooShort);
    }
    if len > NAME_MAX {
        return Err(FormError::NameTooLong);
    }
    Ok(())
}

fn check_email(email: &str) -> Result<(), FormError> {
    if EMAIL_PATTERN.is_match(email.trim()) {
        Ok(())
    } else {
        Err(FormError::InvalidEmail)
    }
}

fn check_password(password: &str) -> Result<(), FormError> {
    let len = password.chars().count();
    if len < PASSWORD_MIN {
        return Err(FormError::PasswordTooShort);
    }
    if len > PASSWORD_MAX {
        return Err(FormError::PasswordTooLong);
    }
    Ok(())
}

fn check_confirmation(password: &str, confirmation: Option<&str>) -> Result<(), FormError> {
    match confirmation {
        Some(confirmation) if confirmation != password => Err(FormError::PasswordMismatch),
        _ => Ok(()),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountConfirmationState {
    #[serde(default)]
    pub email: bool,
    #[serde(default)]
    pub is_confirmed: bool,
}

/// Profile returned by the user endpoints and cached in the local session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub email: String,
    pub name: String,
    #[serde(default)]
    pub account_confirmation: AccountConfirmationState,
}

impl UserProfile {
    /// Applies the fields present in `patch` on top of this profile. Keys the
    /// server left out keep their cached values.
    pub fn merged(&self, patch: serde_json::Value) -> Result<UserProfile, serde_json::Error> {
        let mut current = serde_json::to_value(self)?;
        if let (Some(fields), serde_json::Value::Object(updates)) = (current.as_object_mut(), patch)
        {
            fields.extend(updates);
        }
        serde_json::from_value(current)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: UserProfile,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountConfirmation {
    #[serde(default)]
    pub is_confirmed: bool,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub expiry_date: Option<OffsetDateTime>,
}

impl AccountConfirmation {
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        self.expiry_date.is_some_and(|expiry| now > expiry)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SignIn {
    pub email: String,
    pub password: String,
}

impl SignIn {
    pub fn validate(&self) -> Result<(), FormError> {
        check_email(&self.email)?;
        check_password(&self.password)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SignUp {
    pub name: String,
    pub email: String,
    pub password: String,
    #[serde(skip)]
    pub password_confirmation: Option<String>,
}

impl SignUp {
    pub fn validate(&self) -> Result<(), FormError> {
        check_name(&self.name)?;
        check_email(&self.email)?;
        check_password(&self.password)?;
        check_confirmation(&self.password, self.password_confirmation.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BasicInfo {
    pub name: String,
    pub email: String,
}

impl BasicInfo {
    pub fn validate(&self) -> Result<(), FormError> {
        check_name(&self.name)?;
        check_email(&self.email)
    }

    pub fn matches(&self, profile: &UserProfile) -> bool {
        self.name == profile.name && self.email == profile.email
    }
}

#[skip_serializing_none]
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordChange {
    pub password: String,
    pub password_confirmation: Option<String>,
}

impl PasswordChange {
    pub fn validate(&self) -> Result<(), FormError> {
        check_password(&self.password)?;
        check_confirmation(&self.password, self.password_confirmation.as_deref())
    }
}

#[derive(Debug, Serialize)]
struct EmailBody<'a> {
    email: &'a str,
}

#[derive(Debug, Serialize)]
struct NewPasswordBody<'a> {
    password: &'a str,
}

#[derive(Debug, Serialize)]
struct Empty {}

#[derive(Clone)]
pub struct UserApi {
    api: ApiClient,
}

impl UserApi {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    pub async fn sign_in(&self, form: &SignIn) -> Result<AuthResponse, ApiError> {
        form.validate()?;
        let response = self
            .api
            .public(Method::POST, "user/sign-in")
            .json(form)
            .send()
            .await?;
        decode(response, StatusCode::OK).await
    }

    pub async fn sign_up(&self, form: &SignUp) -> Result<AuthResponse, ApiError> {
        form.validate()?;
        let response = self
            .api
            .public(Method::POST, "user/sign-up")
            .json(form)
            .send()
            .await?;
        decode(response, StatusCode::CREATED).await
    }

    pub async fn update_basic_info(&self, form: &BasicInfo) -> Result<UserProfile, ApiError> {
        form.validate()?;
        let response = self
            .api
            .authed(Method::PUT, "user/basic-info")?
            .json(form)
            .send()
            .await?;
        decode(response, StatusCode::OK).await
    }

    pub async fn update_password(&self, form: &PasswordChange) -> Result<(), ApiError> {
        form.validate()?;
        let response = self
            .api
            .authed(Method::PUT, "user/password")?
            .json(form)
            .send()
            .await?;
        expect_status(response, StatusCode::OK).await?;
        Ok(())
    }

    pub async fn delete_account(&self, password: &str) -> Result<(), ApiError> {
        let response = self
            .api
            .authed(Method::DELETE, "user")?
            .json(&NewPasswordBody { password })
            .send()
            .await?;
        expect_status(response, StatusCode::CREATED).await?;
        Ok(())
    }

    pub async fn send_password_recovery(&self, email: &str) -> Result<(), ApiError> {
        check_email(email)?;
        let response = self
            .api
            .public(Method::POST, "user/password-recovery")
            .json(&EmailBody { email })
            .send()
            .await?;
        expect_status(response, StatusCode::CREATED).await?;
        Ok(())
    }

    pub async fn get_password_recovery(&self, id: &str) -> Result<serde_json::Value, ApiError> {
        let response = self
            .api
            .public(Method::GET, &format!("user/password-recovery/{id}"))
            .send()
            .await?;
        decode(response, StatusCode::OK).await
    }

    pub async fn confirm_password_recovery(
        &self,
        id: &str,
        password: &str,
    ) -> Result<(), ApiError> {
        check_password(password)?;
        let response = self
            .api
            .public(Method::POST, &format!("user/password-recovery/{id}/confirm"))
            .json(&NewPasswordBody { password })
            .send()
            .await?;
        expect_status(response, StatusCode::OK).await?;
        Ok(())
    }

    pub async fn get_account_confirmation(&self) -> Result<AccountConfirmation, ApiError> {
        let response = self
            .api
            .authed(Method::GET, "user/account-confirmation")?
            .send()
            .await?;
        decode(response, StatusCode::OK).await
    }

    pub async fn send_account_confirmation(&self) -> Result<(), ApiError> {
        let response = self
            .api
            .authed(Method::POST, "user/account-confirmation")?
            .json(&Empty {})
            .send()
            .await?;
        expect_status(response, StatusCode::CREATED).await?;
        Ok(())
    }

    /// Returns the user fields the server changed, to be merged into the
    /// cached profile with [`UserProfile::merged`].
    pub async fn confirm_account(&self) -> Result<serde_json::Value, ApiError> {
        let response = self
            .api
            .authed(Method::POST, "user/account-confirmation/confirm")?
            .json(&Empty {})
            .send()
            .await?;
        decode(response, StatusCode::OK).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_up_requires_matching_passwords() {
        let form = SignUp {
            name: "Ana".into(),
            email: "ana@example.com".into(),
            password: "secret1".into(),
            password_confirmation: Some("secret2".into()),
        };
        assert_eq!(form.validate(), Err(FormError::PasswordMismatch));
    }

    #[test]
    fn basic_info_rejects_bad_email_and_long_names() {
        let form = BasicInfo {
            name: "Ana".into(),
            email: "not-an-email".into(),
        };
        assert_eq!(form.validate(), Err(FormError::InvalidEmail));

        let form = BasicInfo {
            name: "x".repeat(81),
            email: "ana@example.com".into(),
        };
        assert_eq!(form.validate(), Err(FormError::NameTooLong));
    }

    #[test]
    fn password_bounds() {
        assert_eq!(check_password("12345"), Err(FormError::PasswordTooShort));
        assert_eq!(check_password("123456"), Ok(()));
        assert_eq!(check_password(&"a".repeat(81)), Err(FormError::PasswordTooLong));
    }

    #[test]
    fn confirmation_expiry_compares_against_now() {
        let confirmation = AccountConfirmation {
            is_confirmed: false,
            expiry_date: Some(time::macros::datetime!(2024-01-01 0:00 UTC)),
        };
        assert!(confirmation.is_expired_at(time::macros::datetime!(2024-01-02 0:00 UTC)));
        assert!(!confirmation.is_expired_at(time::macros::datetime!(2023-12-31 0:00 UTC)));
    }

    #[test]
    fn merge_keeps_fields_missing_from_patch() {
        let cached = UserProfile {
            email: "ana@example.com".into(),
            name: "Ana".into(),
            account_confirmation: AccountConfirmationState::default(),
        };
        let merged = cached
            .merged(serde_json::json!({
                "accountConfirmation": { "email": true, "isConfirmed": true }
            }))
            .unwrap();
        assert_eq!(merged.name, "Ana");
        assert_eq!(merged.email, "ana@example.com");
        assert!(merged.account_confirmation.is_confirmed);
    }
}
