//!
//! Staff accounts, sessions and request authentication.
//!
use super::Clinic;
use crate::auth::{bearer_token, password, Principal, TokenError};
use crate::error::{AuthenticationError, Error, NotFoundError};
use crate::log::AUTHENTICATION;
use crate::model::{Role, User, UserView};
use crate::prometheus::AUTHENTICATION_FAILURES_TOTAL;
use crate::store::Filter;
use chrono::Utc;
use metrics::counter;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

const EMAIL: &str = "email";
const REFRESH_TOKEN: &str = "refreshToken";
const UPDATED_AT: &str = "updatedAt";

pub const MIN_PASSWORD_LENGTH: usize = 6;

#[derive(Clone, Debug, Default, Deserialize)]
pub struct SignupRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub role: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogoutRequest {
    pub refresh_token: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    pub user: UserView,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessToken {
    pub access_token: String,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl Clinic {
    pub async fn signup(&self, request: SignupRequest) -> Result<Session, Error> {
        let (Some(name), Some(email), Some(password)) = (
            non_empty(request.name),
            non_empty(request.email).map(|e| e.to_lowercase()),
            request.password.filter(|p| !p.is_empty()),
        ) else {
            return Err(Error::validation("Name, email and password are required"));
        };

        if password.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(Error::validation(format!(
                "Password must be at least {MIN_PASSWORD_LENGTH} characters"
            )));
        }

        let role = match non_empty(request.role) {
            Some(role) => role.parse::<Role>().map_err(Error::Validation)?,
            None => Role::default(),
        };

        if self
            .users
            .find_one(&Filter::all().eq(EMAIL, email.as_str()))
            .await?
            .is_some()
        {
            return Err(Error::validation("User already exists"));
        }

        let iterations = self.password_hash_iterations;
        let hash = tokio::task::spawn_blocking(move || password::hash(&password, iterations)).await?;

        let mut user = User::new(name, email, hash, role);
        let session = self.start_session(&mut user).await?;

        info!(target: AUTHENTICATION, msg = "User registered", user = %user.id, role = %user.role);
        Ok(session)
    }

    pub async fn login(&self, request: LoginRequest) -> Result<Session, Error> {
        let (Some(email), Some(password)) = (
            non_empty(request.email).map(|e| e.to_lowercase()),
            request.password.filter(|p| !p.is_empty()),
        ) else {
            return Err(Error::validation("Email and password are required"));
        };

        let Some(mut user) = self
            .users
            .find_one(&Filter::all().eq(EMAIL, email.as_str()))
            .await?
        else {
            return Err(failure(NotFoundError::User.into()));
        };

        let stored = user.password_hash.clone();
        let verified = tokio::task::spawn_blocking(move || password::verify(&password, &stored)).await?;
        if !verified {
            return Err(failure(AuthenticationError::InvalidPassword.into()));
        }

        let session = self.start_session(&mut user).await?;

        info!(target: AUTHENTICATION, msg = "User logged in", user = %user.id);
        Ok(session)
    }

    ///
    /// Exchange a refresh token for a new access token.
    /// The token must verify and still be the one stored on the user.
    ///
    pub async fn refresh(&self, request: RefreshRequest) -> Result<AccessToken, Error> {
        let Some(token) = non_empty(request.refresh_token) else {
            return Err(failure(AuthenticationError::MissingRefreshToken.into()));
        };

        let claims = self
            .tokens
            .verify_refresh(&token)
            .map_err(|_| failure(AuthenticationError::InvalidRefreshToken.into()))?;

        let user = self.users.find_by_id(claims.id).await?;
        let user = match user {
            Some(user) if user.refresh_token.as_deref() == Some(token.as_str()) => user,
            _ => return Err(failure(AuthenticationError::InvalidRefreshToken.into())),
        };

        let access_token = self.tokens.access_token(user.id, user.role)?;

        debug!(target: AUTHENTICATION, msg = "Access token refreshed", user = %user.id);
        Ok(AccessToken { access_token })
    }

    /// Clears the refresh token wherever it is held. Unknown tokens are ignored.
    pub async fn logout(&self, request: LogoutRequest) -> Result<(), Error> {
        let Some(token) = non_empty(request.refresh_token) else {
            return Ok(());
        };

        let mut set = Map::new();
        set.insert(REFRESH_TOKEN.to_string(), Value::Null);
        set.insert(UPDATED_AT.to_string(), serde_json::to_value(Utc::now())?);

        let cleared = self
            .users
            .update_many(&Filter::all().eq(REFRESH_TOKEN, token), &set)
            .await?;

        debug!(target: AUTHENTICATION, msg = "User logged out", sessions = cleared);
        Ok(())
    }

    ///
    /// Resolve the principal behind an `Authorization` header value.
    ///
    pub async fn authenticate(&self, header: Option<&str>) -> Result<Principal, Error> {
        self.resolve_principal(header).await.map_err(failure)
    }

    async fn resolve_principal(&self, header: Option<&str>) -> Result<Principal, Error> {
        let token = bearer_token(header)?;

        let claims = self.tokens.verify_access(token).map_err(|err| match err {
            TokenError::Expired => AuthenticationError::ExpiredToken,
            TokenError::Invalid => AuthenticationError::InvalidToken,
        })?;

        let user = self
            .users
            .find_by_id(claims.id)
            .await?
            .ok_or(AuthenticationError::UnknownPrincipal)?;

        Ok(Principal::from(&user))
    }

    async fn start_session(&self, user: &mut User) -> Result<Session, Error> {
        let access_token = self.tokens.access_token(user.id, user.role)?;
        let refresh_token = self.tokens.refresh_token(user.id)?;

        user.set_refresh_token(Some(refresh_token.clone()));
        self.users.save(user).await?;

        Ok(Session {
            access_token,
            refresh_token,
            user: user.view(),
        })
    }
}

/// Count and log rejected credentials, other errors pass through
fn failure(err: Error) -> Error {
    match &err {
        Error::Authentication(reason) => {
            counter!(AUTHENTICATION_FAILURES_TOTAL).increment(1);
            warn!(target: AUTHENTICATION, msg = "Authentication failed", reason = reason.to_string());
        }
        Error::NotFound(NotFoundError::User) => {
            counter!(AUTHENTICATION_FAILURES_TOTAL).increment(1);
            warn!(target: AUTHENTICATION, msg = "Authentication failed", reason = "unknown user");
        }
        _ => {}
    }
    err
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clinic::test_support::clinic;

    fn signup_request(email: &str, role: Option<&str>) -> SignupRequest {
        SignupRequest {
            name: Some("Dr Grey".to_string()),
            email: Some(email.to_string()),
            password: Some("secret-password".to_string()),
            role: role.map(str::to_string),
        }
    }

    fn login_request(email: &str, password: &str) -> LoginRequest {
        LoginRequest {
            email: Some(email.to_string()),
            password: Some(password.to_string()),
        }
    }

    fn bearer(session: &Session) -> String {
        format!("Bearer {}", session.access_token)
    }

    #[tokio::test]
    async fn signup_defaults_to_nurse_and_authenticates() {
        let dir = tempfile::tempdir().unwrap();
        let clinic = clinic(dir.path()).await;

        let session = clinic
            .signup(signup_request(" Grey@Example.com ", None))
            .await
            .unwrap();

        assert_eq!(session.user.role, Role::Nurse);
        assert_eq!(session.user.email, "grey@example.com");

        let principal = clinic.authenticate(Some(&bearer(&session))).await.unwrap();
        assert_eq!(principal.id, session.user.id);
        assert_eq!(principal.role, Role::Nurse);

        let stored = clinic.users.find_by_id(session.user.id).await.unwrap().unwrap();
        assert!(stored.password_hash.starts_with("pbkdf2-sha256$"));
        assert_eq!(stored.refresh_token, Some(session.refresh_token));
    }

    #[tokio::test]
    async fn signup_rejects_duplicates_and_short_passwords() {
        let dir = tempfile::tempdir().unwrap();
        let clinic = clinic(dir.path()).await;

        clinic
            .signup(signup_request("grey@example.com", Some("doctor")))
            .await
            .unwrap();

        match clinic.signup(signup_request("GREY@example.com", None)).await {
            Err(Error::Validation(message)) => assert_eq!(message, "User already exists"),
            other => panic!("unexpected {other:?}"),
        }

        let mut short = signup_request("short@example.com", None);
        short.password = Some("12345".to_string());
        assert!(matches!(clinic.signup(short).await, Err(Error::Validation(_))));

        let mut missing = signup_request("missing@example.com", None);
        missing.name = Some("  ".to_string());
        match clinic.signup(missing).await {
            Err(Error::Validation(message)) => {
                assert_eq!(message, "Name, email and password are required")
            }
            other => panic!("unexpected {other:?}"),
        }

        assert!(matches!(
            clinic
                .signup(signup_request("surgeon@example.com", Some("surgeon")))
                .await,
            Err(Error::Validation(_))
        ));
    }

    #[tokio::test]
    async fn login_distinguishes_unknown_user_and_wrong_password() {
        let dir = tempfile::tempdir().unwrap();
        let clinic = clinic(dir.path()).await;

        let first = clinic
            .signup(signup_request("grey@example.com", Some("admin")))
            .await
            .unwrap();

        assert!(matches!(
            clinic.login(login_request("nobody@example.com", "whatever")).await,
            Err(Error::NotFound(NotFoundError::User))
        ));
        assert!(matches!(
            clinic.login(login_request("grey@example.com", "wrong-password")).await,
            Err(Error::Authentication(AuthenticationError::InvalidPassword))
        ));
        assert!(matches!(
            clinic.login(login_request("", "secret-password")).await,
            Err(Error::Validation(_))
        ));

        let session = clinic
            .login(login_request("GREY@example.com", "secret-password"))
            .await
            .unwrap();
        assert_eq!(session.user.id, first.user.id);
        assert_eq!(session.user.role, Role::Admin);
    }

    #[tokio::test]
    async fn refresh_requires_the_stored_token() {
        let dir = tempfile::tempdir().unwrap();
        let clinic = clinic(dir.path()).await;

        let session = clinic
            .signup(signup_request("grey@example.com", None))
            .await
            .unwrap();

        let refreshed = clinic
            .refresh(RefreshRequest {
                refresh_token: Some(session.refresh_token.clone()),
            })
            .await
            .unwrap();
        let header = format!("Bearer {}", refreshed.access_token);
        assert!(clinic.authenticate(Some(&header)).await.is_ok());

        assert!(matches!(
            clinic.refresh(RefreshRequest::default()).await,
            Err(Error::Authentication(AuthenticationError::MissingRefreshToken))
        ));

        // an access token is not a refresh token
        assert!(matches!(
            clinic
                .refresh(RefreshRequest {
                    refresh_token: Some(session.access_token.clone()),
                })
                .await,
            Err(Error::Authentication(AuthenticationError::InvalidRefreshToken))
        ));

        clinic
            .logout(LogoutRequest {
                refresh_token: Some(session.refresh_token.clone()),
            })
            .await
            .unwrap();

        assert!(matches!(
            clinic
                .refresh(RefreshRequest {
                    refresh_token: Some(session.refresh_token.clone()),
                })
                .await,
            Err(Error::Authentication(AuthenticationError::InvalidRefreshToken))
        ));

        let stored = clinic.users.find_by_id(session.user.id).await.unwrap().unwrap();
        assert_eq!(stored.refresh_token, None);
    }

    #[tokio::test]
    async fn logout_with_unknown_token_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        let clinic = clinic(dir.path()).await;

        assert!(clinic.logout(LogoutRequest::default()).await.is_ok());
        assert!(clinic
            .logout(LogoutRequest {
                refresh_token: Some("unknown".to_string()),
            })
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn authenticate_reports_distinct_reasons() {
        let dir = tempfile::tempdir().unwrap();
        let clinic = clinic(dir.path()).await;

        let cases = [
            (None, AuthenticationError::MissingToken),
            (Some("Basic abc"), AuthenticationError::MalformedHeader),
            (Some("Bearer "), AuthenticationError::EmptyToken),
            (Some("Bearer not.a.token"), AuthenticationError::InvalidToken),
        ];

        for (header, expected) in cases {
            match clinic.authenticate(header).await {
                Err(Error::Authentication(reason)) => assert_eq!(reason, expected),
                other => panic!("unexpected {other:?} for {header:?}"),
            }
        }

        // valid signature for a user that no longer exists
        let token = clinic
            .tokens
            .access_token(uuid::Uuid::new_v4(), Role::Admin)
            .unwrap();
        let header = format!("Bearer {token}");
        assert!(matches!(
            clinic.authenticate(Some(&header)).await,
            Err(Error::Authentication(AuthenticationError::UnknownPrincipal))
        ));
    }
}
