//! Message and queue records plus the core domain identifiers they carry.

use crate::error::ValidationError;
use bytes::Bytes;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::str::FromStr;

// ============================================================================
// Core Domain Identifiers
// ============================================================================

/// Validated queue name with length and character restrictions
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct QueueName(String);

impl QueueName {
    /// Create new queue name with validation
    pub fn new(name: String) -> Result<Self, ValidationError> {
        // Validate length
        if name.is_empty() || name.len() > 260 {
            return Err(ValidationError::OutOfRange {
                field: "queue_name".to_string(),
                message: "must be 1-260 characters".to_string(),
            });
        }

        // Validate characters (ASCII alphanumeric, hyphens, underscores)
        if !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(ValidationError::InvalidFormat {
                field: "queue_name".to_string(),
                message: "only ASCII alphanumeric, hyphens, and underscores allowed".to_string(),
            });
        }

        // Validate no consecutive hyphens or leading/trailing hyphens
        if name.starts_with('-') || name.ends_with('-') || name.contains("--") {
            return Err(ValidationError::InvalidFormat {
                field: "queue_name".to_string(),
                message: "no leading/trailing hyphens or consecutive hyphens".to_string(),
            });
        }

        Ok(Self(name))
    }

    /// Get queue name as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for QueueName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for QueueName {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

impl TryFrom<String> for QueueName {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<QueueName> for String {
    fn from(name: QueueName) -> Self {
        name.0
    }
}

/// Store-assigned identifier of a queue record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QueueId(i64);

impl QueueId {
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for QueueId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Store-assigned identifier of a message record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MessageId(i64);

impl MessageId {
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque handle proving a claim on a leased message.
///
/// A fresh token is generated for every successful claim, so a message that
/// is re-leased after expiry never carries its previous token again.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LeaseToken(String);

impl LeaseToken {
    /// Generate a new random lease token
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    /// Wrap an existing token presented by a caller
    pub fn new(token: String) -> Result<Self, ValidationError> {
        if token.trim().is_empty() {
            return Err(ValidationError::Required {
                field: "lease_token".to_string(),
            });
        }

        Ok(Self(token))
    }

    /// Get token as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for LeaseToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for LeaseToken {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

impl TryFrom<String> for LeaseToken {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<LeaseToken> for String {
    fn from(token: LeaseToken) -> Self {
        token.0
    }
}

/// Timestamp wrapper for consistent time handling
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Create timestamp for current time
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Create timestamp from DateTime
    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// Create timestamp from milliseconds since the Unix epoch
    pub fn from_millis(millis: i64) -> Option<Self> {
        Utc.timestamp_millis_opt(millis).single().map(Self)
    }

    /// Get underlying DateTime
    pub fn as_datetime(&self) -> DateTime<Utc> {
        self.0
    }

    /// Milliseconds since the Unix epoch
    pub fn as_millis(&self) -> i64 {
        self.0.timestamp_millis()
    }

    /// Timestamp shifted forward by `duration`, saturating at the latest
    /// representable instant
    pub fn plus(&self, duration: Duration) -> Self {
        self.0
            .checked_add_signed(duration)
            .map(Self)
            .unwrap_or(Self(DateTime::<Utc>::MAX_UTC))
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d %H:%M:%S%.3f UTC"))
    }
}

impl FromStr for Timestamp {
    type Err = chrono::ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let dt = s.parse::<DateTime<Utc>>()?;
        Ok(Self::from_datetime(dt))
    }
}

/// How long a claimed message stays hidden from other claimers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct VisibilityTimeout(Duration);

impl VisibilityTimeout {
    /// Queue default when none is configured
    pub const DEFAULT_SECONDS: u32 = 30;

    /// Largest accepted timeout, the range of a stored queue default
    pub const MAX_SECONDS: i64 = u32::MAX as i64;

    /// Create from whole seconds; must be in `1..=MAX_SECONDS`
    pub fn from_secs(seconds: i64) -> Result<Self, ValidationError> {
        if seconds <= 0 {
            return Err(ValidationError::OutOfRange {
                field: "visibility_timeout".to_string(),
                message: format!("must be a positive number of seconds, got {seconds}"),
            });
        }
        if seconds > Self::MAX_SECONDS {
            return Err(Self::too_large(format!("{seconds} seconds")));
        }

        Ok(Self(Duration::seconds(seconds)))
    }

    /// Create from an arbitrary duration; must be positive and at most
    /// `MAX_SECONDS`
    pub fn from_duration(duration: Duration) -> Result<Self, ValidationError> {
        if duration <= Duration::zero() {
            return Err(ValidationError::OutOfRange {
                field: "visibility_timeout".to_string(),
                message: "must be positive".to_string(),
            });
        }
        if duration > Duration::seconds(Self::MAX_SECONDS) {
            return Err(Self::too_large(format!("{}ms", duration.num_milliseconds())));
        }

        Ok(Self(duration))
    }

    fn too_large(value: String) -> ValidationError {
        ValidationError::OutOfRange {
            field: "visibility_timeout".to_string(),
            message: format!(
                "{value} exceeds the maximum of {} seconds",
                Self::MAX_SECONDS
            ),
        }
    }

    pub fn as_duration(&self) -> Duration {
        self.0
    }

    pub fn as_millis(&self) -> i64 {
        self.0.num_milliseconds()
    }

    /// Whole seconds, rounded up so sub-second timeouts never become zero
    pub fn whole_seconds(&self) -> u32 {
        let millis = u64::try_from(self.0.num_milliseconds()).unwrap_or(0);
        u32::try_from(millis.div_ceil(1000)).unwrap_or(u32::MAX)
    }
}

impl Default for VisibilityTimeout {
    fn default() -> Self {
        Self(Duration::seconds(i64::from(Self::DEFAULT_SECONDS)))
    }
}

impl std::fmt::Display for VisibilityTimeout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}ms", self.0.num_milliseconds())
    }
}

/// Content hash of a message body (lowercase hex SHA-256)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Checksum(String);

impl Checksum {
    /// Hash a message body
    pub fn compute(body: &[u8]) -> Self {
        Self(hex::encode(Sha256::digest(body)))
    }

    /// Wrap a checksum read back from a store
    pub(crate) fn from_stored(value: String) -> Self {
        Self(value)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Checksum {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Records
// ============================================================================

/// A named queue as persisted by a backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueRecord {
    pub id: QueueId,
    pub name: QueueName,
    pub default_timeout_seconds: u32,
}

impl QueueRecord {
    /// The queue's default visibility timeout
    pub fn default_timeout(&self) -> VisibilityTimeout {
        VisibilityTimeout::from_secs(i64::from(self.default_timeout_seconds)).unwrap_or_default()
    }
}

/// A message as persisted by a backend, including its current lease.
///
/// `body` and `checksum` never change after send; only `lease_token` and
/// `lease_expires_at` move while the message lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: MessageId,
    pub queue_id: QueueId,
    #[serde(with = "bytes_serde")]
    pub body: Bytes,
    pub checksum: Checksum,
    pub created_at: Timestamp,
    pub lease_token: Option<LeaseToken>,
    pub lease_expires_at: Option<Timestamp>,
}

/// Custom serialization for Bytes
mod bytes_serde {
    use base64::{engine::general_purpose, Engine as _};
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(bytes: &Bytes, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let encoded = general_purpose::STANDARD.encode(bytes);
        encoded.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Bytes, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        let decoded = general_purpose::STANDARD
            .decode(encoded)
            .map_err(serde::de::Error::custom)?;
        Ok(Bytes::from(decoded))
    }
}

impl MessageRecord {
    /// Check whether the message may be claimed at `now`.
    ///
    /// Mirrors the store predicate `handle IS NULL OR lease_expires_at < now`,
    /// including its treatment of a token without an expiry as not claimable.
    pub fn is_claimable_at(&self, now: Timestamp) -> bool {
        match (&self.lease_token, &self.lease_expires_at) {
            (None, _) => true,
            (Some(_), Some(expires_at)) => *expires_at < now,
            (Some(_), None) => false,
        }
    }

    /// Check whether the message currently carries a lease token
    pub fn is_leased(&self) -> bool {
        self.lease_token.is_some()
    }

    /// Recompute the body hash and compare it with the stored checksum
    pub fn verify_checksum(&self) -> bool {
        Checksum::compute(&self.body) == self.checksum
    }

    /// Body as UTF-8 text, if it is valid UTF-8
    pub fn body_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.body).ok()
    }
}

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;
