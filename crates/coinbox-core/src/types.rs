use crate::{
    Result,
    constants::{DEFAULT_DENOMINATIONS, MAX_DEVICE_ID_LENGTH, MAX_SESSION_ID_LENGTH},
    error::Error,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Database identifier of a kiosk user (registered or guest).
pub type UserId = i64;

/// Coin acceptor identifier (for example `ESP32_COIN_001`).
///
/// Keys the shared health record and the pending coin total, and is
/// written onto every coin ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub struct DeviceId(String);

impl DeviceId {
    /// Create a new device ID with validation.
    ///
    /// # Errors
    /// Returns `Error::InvalidIdentifier` if the trimmed ID is empty or longer
    /// than 50 characters.
    pub fn new(id: &str) -> Result<Self> {
        let id = id.trim();

        if id.is_empty() {
            return Err(Error::InvalidIdentifier(
                "Device ID must not be empty".to_string(),
            ));
        }

        if id.len() > MAX_DEVICE_ID_LENGTH {
            return Err(Error::InvalidIdentifier(format!(
                "Device ID must be at most {MAX_DEVICE_ID_LENGTH} chars, got {}",
                id.len()
            )));
        }

        Ok(DeviceId(id.to_string()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for DeviceId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        DeviceId::new(s)
    }
}

impl TryFrom<String> for DeviceId {
    type Error = Error;

    fn try_from(id: String) -> Result<Self> {
        DeviceId::new(&id)
    }
}

/// Web session identifier held by the kiosk front end.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub struct SessionId(String);

impl SessionId {
    /// Create a new session ID with validation.
    ///
    /// # Errors
    /// Returns `Error::InvalidIdentifier` if the ID is empty or longer than
    /// 100 characters.
    pub fn new(id: &str) -> Result<Self> {
        if id.is_empty() {
            return Err(Error::InvalidIdentifier(
                "Session ID must not be empty".to_string(),
            ));
        }

        if id.len() > MAX_SESSION_ID_LENGTH {
            return Err(Error::InvalidIdentifier(format!(
                "Session ID must be at most {MAX_SESSION_ID_LENGTH} chars, got {}",
                id.len()
            )));
        }

        Ok(SessionId(id.to_string()))
    }

    /// Generate a fresh random session ID.
    #[must_use]
    pub fn generate() -> Self {
        SessionId(uuid::Uuid::new_v4().simple().to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for SessionId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        SessionId::new(s)
    }
}

impl TryFrom<String> for SessionId {
    type Error = Error;

    fn try_from(id: String) -> Result<Self> {
        SessionId::new(&id)
    }
}

/// Business whitelist of coin values accepted for credit.
///
/// This is independent of the raw `(0, 100]` range the line parser
/// enforces: `COIN:3.00` parses fine but is not a denomination of the
/// default set. Values compare numerically, so `5` and `5.00` are the
/// same denomination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Decimal>")]
pub struct Denominations(BTreeSet<Decimal>);

impl Denominations {
    /// Build a whitelist from explicit values.
    ///
    /// # Errors
    /// Returns `Error::InvalidDenomination` if the set is empty or any value
    /// is zero or negative.
    pub fn new(values: impl IntoIterator<Item = Decimal>) -> Result<Self> {
        let mut set = BTreeSet::new();

        for value in values {
            if value <= Decimal::ZERO {
                return Err(Error::InvalidDenomination(format!(
                    "Denomination must be positive, got {value}"
                )));
            }
            set.insert(value.normalize());
        }

        if set.is_empty() {
            return Err(Error::InvalidDenomination(
                "At least one denomination is required".to_string(),
            ));
        }

        Ok(Denominations(set))
    }

    /// Parse a comma-separated list such as `"1,5,10,20"`.
    ///
    /// # Errors
    /// Returns `Error::InvalidDenomination` if an item is not a number or the
    /// resulting set is invalid.
    pub fn parse(input: &str) -> Result<Self> {
        let values = input
            .split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(|item| {
                item.parse::<Decimal>().map_err(|_| {
                    Error::InvalidDenomination(format!("Not a number: {item}"))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Self::new(values)
    }

    /// Whether `value` is an accepted coin.
    #[must_use]
    pub fn contains(&self, value: Decimal) -> bool {
        self.0.contains(&value.normalize())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Decimal> {
        self.0.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for Denominations {
    fn default() -> Self {
        Denominations(
            DEFAULT_DENOMINATIONS
                .iter()
                .map(|d| Decimal::from(*d))
                .collect(),
        )
    }
}

impl fmt::Display for Denominations {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let items: Vec<String> = self.0.iter().map(|d| d.to_string()).collect();
        write!(f, "{}", items.join(","))
    }
}

impl std::str::FromStr for Denominations {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Denominations::parse(s)
    }
}

impl TryFrom<Vec<Decimal>> for Denominations {
    type Error = Error;

    fn try_from(values: Vec<Decimal>) -> Result<Self> {
        Denominations::new(values)
    }
}
