use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;

use crate::config::ApiOptions;

pub mod user;

pub use user::{
    AccountConfirmation, AccountConfirmationState, AuthResponse, BasicInfo, FormError,
    PasswordChange, SignIn, SignUp, UserApi, UserProfile,
};

/// Scheme the API expects in the `authorization` header. The server only
/// accepts this exact spelling.
const AUTH_SCHEME: &str = "Baerer";

pub const NEW_NOTE_TITLE: &str = "New note";
pub const NEW_NOTE_BODY: &str = "<p>New note</p>";

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("not signed in")]
    MissingToken,
    #[error("unauthorized")]
    Unauthorized,
    #[error("permission denied")]
    Forbidden,
    #[error("not found")]
    NotFound,
    #[error("unexpected status {status}: {message}")]
    Status { status: u16, message: String },
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error(transparent)]
    Invalid(#[from] FormError),
}

impl ApiError {
    fn from_status(status: StatusCode, message: String) -> Self {
        match status {
            StatusCode::UNAUTHORIZED => ApiError::Unauthorized,
            StatusCode::FORBIDDEN => ApiError::Forbidden,
            StatusCode::NOT_FOUND => ApiError::NotFound,
            other => ApiError::Status {
                status: other.as_u16(),
                message,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    #[serde(rename = "_id")]
    pub id: String,
    pub title: String,
    pub body: String,
    pub privacy: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Note {
    pub fn was_edited(&self) -> bool {
        self.updated_at > self.created_at
    }

    pub fn contents(&self) -> UpdateNote {
        UpdateNote {
            title: self.title.clone(),
            body: self.body.clone(),
            privacy: self.privacy,
        }
    }
}

/// Editable part of a note, sent as the body of create and update calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateNote {
    pub title: String,
    pub body: String,
    pub privacy: bool,
}

impl UpdateNote {
    pub fn placeholder() -> Self {
        Self {
            title: NEW_NOTE_TITLE.to_string(),
            body: NEW_NOTE_BODY.to_string(),
            privacy: true,
        }
    }
}

#[derive(Debug, Serialize)]
struct PasswordBody<'a> {
    password: &'a str,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

/// Shared HTTP plumbing for the note and user endpoints.
#[derive(Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    base_url: Arc<str>,
    token: Option<Arc<str>>,
}

impl ApiClient {
    pub fn new(options: &ApiOptions) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(options.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: options.base_url.trim_end_matches('/').into(),
            token: None,
        })
    }

    pub fn from_base_url(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').into(),
            token: None,
        }
    }

    pub fn with_token(mut self, token: Option<&str>) -> Self {
        self.token = token.map(Into::into);
        self
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    pub(crate) fn public(&self, method: Method, path: &str) -> RequestBuilder {
        self.client.request(method, self.url(path))
    }

    pub(crate) fn authed(&self, method: Method, path: &str) -> Result<RequestBuilder, ApiError> {
        let token = self.token.as_deref().ok_or(ApiError::MissingToken)?;
        Ok(self
            .public(method, path)
            .header("authorization", format!("{AUTH_SCHEME} {token}")))
    }
}

pub(crate) async fn expect_status(
    response: Response,
    expected: StatusCode,
) -> Result<Response, ApiError> {
    let status = response.status();
    if status == expected {
        return Ok(response);
    }
    let raw = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&raw)
        .ok()
        .and_then(|body| body.message)
        .unwrap_or(raw);
    tracing::debug!(status = status.as_u16(), %message, "api request rejected");
    Err(ApiError::from_status(status, message))
}

pub(crate) async fn decode<T: DeserializeOwned>(
    response: Response,
    expected: StatusCode,
) -> Result<T, ApiError> {
    let response = expect_status(response, expected).await?;
    Ok(response.json::<T>().await?)
}

/// The remote resource an edit session reads from and persists to.
#[async_trait]
pub trait NoteStore: Send + Sync {
    async fn get_my_note(&self, id: &str) -> Result<Note, ApiError>;

    async fn update_note(&self, id: &str, note: &UpdateNote) -> Result<Note, ApiError>;

    async fn delete_note(&self, id: &str, password: &str) -> Result<(), ApiError>;
}

#[derive(Clone)]
pub struct HttpNoteStore {
    api: ApiClient,
}

impl HttpNoteStore {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    pub async fn list_my_notes(&self) -> Result<Vec<Note>, ApiError> {
        let response = self.api.authed(Method::GET, "note/my/all")?.send().await?;
        decode(response, StatusCode::OK).await
    }

    /// Fetches a note without credentials; only public notes are readable.
    pub async fn get_note(&self, id: &str) -> Result<Note, ApiError> {
        let response = self
            .api
            .public(Method::GET, &format!("note/{id}"))
            .send()
            .await?;
        decode(response, StatusCode::OK).await
    }

    /// Uses the owner's endpoint when signed in, the public one otherwise.
    pub async fn read_note(&self, id: &str) -> Result<Note, ApiError> {
        if self.api.token().is_some() {
            self.get_my_note(id).await
        } else {
            self.get_note(id).await
        }
    }

    pub async fn create_note(&self) -> Result<Note, ApiError> {
        let response = self
            .api
            .authed(Method::POST, "note/")?
            .json(&UpdateNote::placeholder())
            .send()
            .await?;
        decode(response, StatusCode::CREATED).await
    }
}

#[async_trait]
impl NoteStore for HttpNoteStore {
    async fn get_my_note(&self, id: &str) -> Result<Note, ApiError> {
        let response = self
            .api
            .authed(Method::GET, &format!("note/my/{id}"))?
            .send()
            .await?;
        decode(response, StatusCode::OK).await
    }

    async fn update_note(&self, id: &str, note: &UpdateNote) -> Result<Note, ApiError> {
        let response = self
            .api
            .authed(Method::PUT, &format!("note/{id}"))?
            .json(note)
            .send()
            .await?;
        decode(response, StatusCode::OK).await
    }

    async fn delete_note(&self, id: &str, password: &str) -> Result<(), ApiError> {
        let response = self
            .api
            .authed(Method::DELETE, &format!("note/{id}"))?
            .json(&PasswordBody { password })
            .send()
            .await?;
        expect_status(response, StatusCode::CREATED).await?;
        Ok(())
    }
}
