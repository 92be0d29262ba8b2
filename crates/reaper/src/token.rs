//! Signed action tokens and the links that carry them
//!
//! A token is `base64url(payload).base64url(hmac_sha256(secret, payload))`
//! where `payload` is the JSON encoding of an [`ActionToken`]. Links put the
//! action name and the token in two query parameters of the action endpoint
//! URL. Tokens carry no expiry; a verified token always takes effect.

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use url::Url;

use crate::error::ReaperError;

type HmacSha256 = Hmac<Sha256>;

/// Something an owner can do to a resource from a notification link
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Action {
    Terminate,
    Stop,
    ForceStop,
    Whitelist,
    /// Snooze escalation for `duration_secs`
    Ignore { duration_secs: u64 },
    /// Bind a scale-down/scale-up cron expression pair
    Schedule { scale_down: String, scale_up: String },
}

impl Action {
    /// Snooze for a duration, truncated to whole seconds
    pub fn ignore_for(duration: Duration) -> Self {
        Action::Ignore {
            duration_secs: duration.as_secs(),
        }
    }

    /// Name placed in the link's action query parameter
    pub fn name(&self) -> &'static str {
        match self {
            Action::Terminate => "terminate",
            Action::Stop => "stop",
            Action::ForceStop => "forcestop",
            Action::Whitelist => "whitelist",
            Action::Ignore { .. } => "ignore",
            Action::Schedule { .. } => "schedule",
        }
    }
}

/// Decoded token payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionToken {
    pub action: Action,
    pub region: String,
    pub id: String,
    pub issued_at: DateTime<Utc>,
}

impl ActionToken {
    pub fn new(
        action: Action,
        region: impl Into<String>,
        id: impl Into<String>,
        issued_at: DateTime<Utc>,
    ) -> Self {
        Self {
            action,
            region: region.into(),
            id: id.into(),
            issued_at: reaper_common::whole_seconds(issued_at),
        }
    }

    /// Serialize and sign with `secret`
    pub fn sign(&self, secret: &[u8]) -> Result<String, ReaperError> {
        let payload = serde_json::to_vec(self)
            .map_err(|e| ReaperError::InvalidToken(format!("cannot encode payload: {e}")))?;
        let tag = mac(secret, &payload)?;
        Ok(format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(&payload),
            URL_SAFE_NO_PAD.encode(tag)
        ))
    }

    /// Check the integrity tag in constant time, then decode the payload.
    pub fn verify(token: &str, secret: &[u8]) -> Result<Self, ReaperError> {
        let (payload_b64, tag_b64) = token
            .split_once('.')
            .ok_or_else(|| ReaperError::InvalidToken("missing signature".into()))?;

        let payload = URL_SAFE_NO_PAD
            .decode(payload_b64)
            .map_err(|e| ReaperError::InvalidToken(format!("payload: {e}")))?;
        let presented = URL_SAFE_NO_PAD
            .decode(tag_b64)
            .map_err(|e| ReaperError::InvalidToken(format!("signature: {e}")))?;

        let expected = mac(secret, &payload)?;
        if presented.len() != expected.len() || !bool::from(presented.ct_eq(&expected)) {
            return Err(ReaperError::InvalidToken("signature mismatch".into()));
        }

        // A token is only valid in its canonical encoding
        if URL_SAFE_NO_PAD.encode(&payload) != payload_b64
            || URL_SAFE_NO_PAD.encode(&presented) != tag_b64
        {
            return Err(ReaperError::InvalidToken("non-canonical encoding".into()));
        }

        serde_json::from_slice(&payload)
            .map_err(|e| ReaperError::InvalidToken(format!("payload: {e}")))
    }
}

fn mac(secret: &[u8], payload: &[u8]) -> Result<Vec<u8>, ReaperError> {
    let mut mac = HmacSha256::new_from_slice(secret)
        .map_err(|e| ReaperError::InvalidToken(format!("bad secret: {e}")))?;
    mac.update(payload);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Mints and checks action links against one action endpoint
#[derive(Clone)]
pub struct LinkSigner {
    secret: Vec<u8>,
    api_url: Url,
    action_param: String,
    token_param: String,
}

impl std::fmt::Debug for LinkSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkSigner")
            .field("api_url", &self.api_url.as_str())
            .field("action_param", &self.action_param)
            .field("token_param", &self.token_param)
            .finish_non_exhaustive()
    }
}

impl LinkSigner {
    pub fn new(
        secret: impl Into<Vec<u8>>,
        api_url: Url,
        action_param: impl Into<String>,
        token_param: impl Into<String>,
    ) -> Self {
        Self {
            secret: secret.into(),
            api_url,
            action_param: action_param.into(),
            token_param: token_param.into(),
        }
    }

    /// Build the URL an owner clicks to apply `action` to `(region, id)`
    pub fn make_link(
        &self,
        action: Action,
        region: &str,
        id: &str,
        now: DateTime<Utc>,
    ) -> Result<Url, ReaperError> {
        let name = action.name();
        let token = ActionToken::new(action, region, id, now).sign(&self.secret)?;

        let mut url = self.api_url.clone();
        url.query_pairs_mut()
            .append_pair(&self.action_param, name)
            .append_pair(&self.token_param, &token);
        Ok(url)
    }

    /// Verify a token received by the action endpoint
    pub fn verify(&self, token: &str) -> Result<ActionToken, ReaperError> {
        ActionToken::verify(token, &self.secret)
    }

    /// Pull `(action name, token)` back out of a link's query string
    pub fn parse_link(&self, link: &Url) -> Result<(String, String), ReaperError> {
        let mut action = None;
        let mut token = None;
        for (key, value) in link.query_pairs() {
            if key == self.action_param.as_str() {
                action = Some(value.into_owned());
            } else if key == self.token_param.as_str() {
                token = Some(value.into_owned());
            }
        }
        match (action, token) {
            (Some(action), Some(token)) => Ok((action, token)),
            _ => Err(ReaperError::InvalidToken(format!(
                "link lacks '{}' or '{}' parameter",
                self.action_param, self.token_param
            ))),
        }
    }
}
