//! Race tokens: short-lived bearer tokens binding a connection to exactly one
//! (session, player, role). The role claim is fixed at mint time and is never
//! trusted for privileged actions; start/finish re-check the live host.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::types::{PlayerId, SessionId, UserId};

pub const ROLE_HOST: &str = "host";
pub const ROLE_PLAYER: &str = "player";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RaceClaims {
    pub sub: String, // user_id
    pub sid: String, // session_id
    pub pid: String, // player_id
    pub role: String,
    pub exp: i64,    // expiration time
    pub iat: i64,    // issued at
    pub jti: String, // JWT ID
}

impl RaceClaims {
    pub fn new(
        user_id: UserId,
        session_id: SessionId,
        player_id: PlayerId,
        role: &str,
        expiration_hours: u64,
    ) -> Self {
        let now = Utc::now();
        let exp = now + Duration::hours(expiration_hours as i64);

        Self {
            sub: user_id.to_string(),
            sid: session_id.to_string(),
            pid: player_id.to_string(),
            role: role.to_string(),
            exp: exp.timestamp(),
            iat: now.timestamp(),
            jti: Uuid::new_v4().to_string(),
        }
    }

    pub fn user_id(&self) -> Result<UserId, AppError> {
        self.sub
            .parse()
            .map_err(|_| AppError::Unauthorized("Invalid token subject".to_string()))
    }

    pub fn session_id(&self) -> Result<SessionId, AppError> {
        self.sid
            .parse()
            .map_err(|_| AppError::Unauthorized("Invalid token session".to_string()))
    }

    /// The token only binds an identity to one session; a mismatched session
    /// id is an authorization failure before any business logic runs.
    pub fn ensure_session(&self, session_id: SessionId) -> Result<(), AppError> {
        if self.session_id()? != session_id {
            return Err(AppError::Unauthorized(
                "Token is not valid for this session".to_string(),
            ));
        }
        Ok(())
    }
}

pub fn create_race_token(claims: &RaceClaims, secret: &str) -> anyhow::Result<String> {
    let token = encode(
        &Header::default(),
        claims,
        &EncodingKey::from_secret(secret.as_ref()),
    )?;

    Ok(token)
}

pub fn verify_race_token(token: &str, secret: &str) -> anyhow::Result<RaceClaims> {
    let validation = Validation::default();
    let token_data = decode::<RaceClaims>(
        token,
        &DecodingKey::from_secret(secret.as_ref()),
        &validation,
    )?;

    Ok(token_data.claims)
}
