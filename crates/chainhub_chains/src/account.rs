use std::fmt;
use std::str::FromStr;

use ethers::types::Address;
use serde::{Deserialize, Serialize};

use crate::error::ChainError;

const ADDRESS_HEX_LEN: usize = 40;

/// A wallet account: `0x` followed by 20 bytes of hex.
///
/// Stored lowercase so that checksum casing differences coming from a wallet
/// never look like an account change.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AccountId(String);

impl AccountId {
    /// Parse and normalize an address.
    pub fn parse(raw: &str) -> Result<Self, ChainError> {
        let trimmed = raw.trim();
        let hex = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .ok_or_else(|| ChainError::InvalidAccount(raw.to_string()))?;

        if hex.len() != ADDRESS_HEX_LEN {
            return Err(ChainError::InvalidAccount(raw.to_string()));
        }
        let address =
            Address::from_str(hex).map_err(|_| ChainError::InvalidAccount(raw.to_string()))?;
        Ok(Self::from(address))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `0x1234...abcd` form for compact display.
    pub fn short(&self) -> String {
        format!("{}...{}", &self.0[..6], &self.0[self.0.len() - 4..])
    }
}

impl From<Address> for AccountId {
    fn from(address: Address) -> Self {
        Self(format!("{address:#x}"))
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for AccountId {
    type Err = ChainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for AccountId {
    type Error = ChainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<AccountId> for String {
    fn from(value: AccountId) -> Self {
        value.0
    }
}
