use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::domain::{DashConfig, DashError};
use crate::storage::{LocalStorage, USER_SESSION_KEY};

pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum AuthError {
    #[error("Username is required")]
    MissingUsername,
    #[error("OTP is required")]
    MissingOtp,
    #[error("Invalid OTP")]
    InvalidOtp,
    #[error("{0}")]
    Rejected(String),
    #[error("Authentication request failed: {0}")]
    Transport(String),
    #[error("No login in progress")]
    NoPendingLogin,
    #[error("Could not store the session: {0}")]
    Storage(String),
}

/// Persisted under `userSession`. `expiry` is epoch milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub user: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub expiry: DateTime<Utc>,
    pub logged_in_at: DateTime<Utc>,
}

impl Session {
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expiry
    }
}

pub trait Authenticator {
    /// Ask for an OTP to be sent. Returns the backend's message.
    fn login(&self, username: &str) -> Result<String, AuthError>;
    fn verify_otp(&self, username: &str, otp: &str) -> Result<(), AuthError>;
}

#[derive(Debug, Deserialize)]
struct AuthReply {
    success: bool,
    #[serde(default)]
    message: String,
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct VerifyOtpRequest<'a> {
    otp: &'a str,
    mobile_number: &'a str,
}

pub struct RemoteAuthenticator {
    base_url: String,
    mobile_number: String,
    client: reqwest::blocking::Client,
}

impl RemoteAuthenticator {
    pub fn new(config: &DashConfig) -> Self {
        Self {
            base_url: config.schema_url.trim_end_matches('/').to_string(),
            mobile_number: config.mobile_number.clone(),
            client: reqwest::blocking::Client::new(),
        }
    }

    fn post<T: Serialize>(&self, path: &str, body: &T) -> Result<AuthReply, AuthError> {
        let url = format!("{}/{path}", self.base_url);
        debug!("POST {url}");
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .map_err(|e| AuthError::Transport(e.to_string()))?;
        if !response.status().is_success() {
            return Err(AuthError::Transport(format!(
                "status {}",
                response.status().as_u16()
            )));
        }
        response
            .json()
            .map_err(|e| AuthError::Transport(e.to_string()))
    }
}

impl Authenticator for RemoteAuthenticator {
    fn login(&self, username: &str) -> Result<String, AuthError> {
        let reply = self.post("login", &LoginRequest { username })?;
        if reply.success {
            Ok(reply.message)
        } else {
            Err(AuthError::Rejected(reply.message))
        }
    }

    fn verify_otp(&self, _username: &str, otp: &str) -> Result<(), AuthError> {
        let reply = self.post(
            "verifyOtp",
            &VerifyOtpRequest {
                otp,
                mobile_number: &self.mobile_number,
            },
        )?;
        if reply.success {
            Ok(())
        } else if reply.message.is_empty() {
            Err(AuthError::InvalidOtp)
        } else {
            Err(AuthError::Rejected(reply.message))
        }
    }
}

/// Accepts every username and one fixed OTP.
pub struct LocalAuthenticator {
    otp: String,
}

impl LocalAuthenticator {
    pub fn new(otp: &str) -> Self {
        Self {
            otp: otp.to_string(),
        }
    }
}

impl Authenticator for LocalAuthenticator {
    fn login(&self, _username: &str) -> Result<String, AuthError> {
        Ok("OTP sent".to_string())
    }

    fn verify_otp(&self, _username: &str, otp: &str) -> Result<(), AuthError> {
        if otp == self.otp {
            Ok(())
        } else {
            Err(AuthError::InvalidOtp)
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AuthFlow {
    SignedOut,
    AwaitingOtp { user: String },
    SignedIn(Session),
}

/// Login state of the operator, backed by the `userSession` key.
pub struct SessionManager {
    flow: AuthFlow,
    storage: LocalStorage,
    clock: Box<dyn Clock>,
    auth: Box<dyn Authenticator>,
    duration: Duration,
}

impl SessionManager {
    pub fn new(
        storage: LocalStorage,
        clock: Box<dyn Clock>,
        auth: Box<dyn Authenticator>,
        session_minutes: u64,
    ) -> Self {
        Self {
            flow: AuthFlow::SignedOut,
            storage,
            clock,
            auth,
            duration: Duration::minutes(i64::try_from(session_minutes).unwrap_or(i64::MAX / 60_000)),
        }
    }

    pub fn flow(&self) -> &AuthFlow {
        &self.flow
    }

    pub fn is_signed_in(&self) -> bool {
        matches!(self.flow, AuthFlow::SignedIn(_))
    }

    pub fn user(&self) -> Option<&str> {
        match &self.flow {
            AuthFlow::SignedOut => None,
            AuthFlow::AwaitingOtp { user } => Some(user),
            AuthFlow::SignedIn(session) => Some(&session.user),
        }
    }

    pub fn remaining(&self) -> Option<Duration> {
        match &self.flow {
            AuthFlow::SignedIn(session) => Some(session.expiry - self.clock.now()),
            _ => None,
        }
    }

    /// Pick up a stored session. An expired one is removed.
    pub fn restore(&mut self) -> Result<bool, DashError> {
        let stored: Option<Session> = match self.storage.get(USER_SESSION_KEY) {
            Ok(stored) => stored,
            Err(e) => {
                warn!("Ignoring unreadable session: {e}");
                self.storage.remove(USER_SESSION_KEY)?;
                None
            }
        };
        match stored {
            Some(session) if session.is_valid_at(self.clock.now()) => {
                info!("Restored session of {}", session.user);
                self.flow = AuthFlow::SignedIn(session);
                Ok(true)
            }
            Some(session) => {
                info!("Stored session of {} expired", session.user);
                self.storage.remove(USER_SESSION_KEY)?;
                Ok(false)
            }
            None => Ok(false),
        }
    }

    pub fn login(&mut self, username: &str) -> Result<String, AuthError> {
        let username = username.trim();
        if username.is_empty() {
            return Err(AuthError::MissingUsername);
        }
        let message = self.auth.login(username)?;
        info!("OTP requested for {username}");
        self.flow = AuthFlow::AwaitingOtp {
            user: username.to_string(),
        };
        Ok(message)
    }

    /// The session only starts, and is only stored, after a verified OTP.
    pub fn verify_otp(&mut self, otp: &str) -> Result<Session, AuthError> {
        let user = match &self.flow {
            AuthFlow::AwaitingOtp { user } => user.clone(),
            _ => return Err(AuthError::NoPendingLogin),
        };
        let otp = otp.trim();
        if otp.is_empty() {
            return Err(AuthError::MissingOtp);
        }
        self.auth.verify_otp(&user, otp)?;

        let now = self.clock.now();
        let session = Session {
            user,
            expiry: now + self.duration,
            logged_in_at: now,
        };
        self.storage
            .set(USER_SESSION_KEY, &session)
            .map_err(|e| AuthError::Storage(e.to_string()))?;
        info!("Signed in {} until {}", session.user, session.expiry);
        self.flow = AuthFlow::SignedIn(session.clone());
        Ok(session)
    }

    /// Compare the clock against the expiry. Returns true when the session just ended.
    pub fn check_expiry(&mut self) -> Result<bool, DashError> {
        let expired = match &self.flow {
            AuthFlow::SignedIn(session) => !session.is_valid_at(self.clock.now()),
            _ => false,
        };
        if expired {
            info!("Session expired");
            self.flow = AuthFlow::SignedOut;
            self.storage.remove(USER_SESSION_KEY)?;
        }
        Ok(expired)
    }

    pub fn sign_out(&mut self) -> Result<(), DashError> {
        info!("Signing out {:?}", self.user());
        self.flow = AuthFlow::SignedOut;
        self.storage.remove(USER_SESSION_KEY)
    }
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    /// A clock the test moves by hand.
    #[derive(Clone)]
    pub struct FixedClock(pub Rc<Cell<DateTime<Utc>>>);

    impl FixedClock {
        pub fn at(now: DateTime<Utc>) -> Self {
            Self(Rc::new(Cell::new(now)))
        }

        pub fn advance(&self, by: Duration) {
            self.0.set(self.0.get() + by);
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.0.get()
        }
    }
}
