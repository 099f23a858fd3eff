//! PingOne regions and service URLs.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// A PingOne deployment region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Region {
    /// North America.
    #[default]
    #[serde(rename = "NA")]
    NorthAmerica,
    /// Europe.
    #[serde(rename = "EU")]
    Europe,
    /// Asia-Pacific.
    #[serde(rename = "ASIA")]
    AsiaPacific,
    /// Canada.
    #[serde(rename = "CA")]
    Canada,
}

impl Region {
    /// All supported regions.
    pub const ALL: [Self; 4] = [Self::NorthAmerica, Self::Europe, Self::AsiaPacific, Self::Canada];

    /// Returns the region code used in configuration.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::NorthAmerica => "NA",
            Self::Europe => "EU",
            Self::AsiaPacific => "ASIA",
            Self::Canada => "CA",
        }
    }

    /// Returns the top-level domain of the region.
    #[must_use]
    pub const fn tld(self) -> &'static str {
        match self {
            Self::NorthAmerica => "pingone.com",
            Self::Europe => "pingone.eu",
            Self::AsiaPacific => "pingone.asia",
            Self::Canada => "pingone.ca",
        }
    }

    /// Returns the management API base URL.
    #[must_use]
    pub fn api_url(self) -> String {
        format!("https://api.{}/v1", self.tld())
    }

    /// Returns the token endpoint of `environment_id`.
    #[must_use]
    pub fn auth_url(self, environment_id: &str) -> String {
        format!("https://auth.{}/{environment_id}/as/token", self.tld())
    }
}

impl FromStr for Region {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|r| r.code().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ConfigError::InvalidValue {
                key: String::from("regionCode"),
                message: format!("'{s}' is not one of NA, EU, ASIA, CA"),
            })
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_urls() {
        assert_eq!(Region::Europe.api_url(), "https://api.pingone.eu/v1");
        assert_eq!(
            Region::Canada.auth_url("env"),
            "https://auth.pingone.ca/env/as/token"
        );
    }

    #[test]
    fn test_region_parse() {
        assert_eq!("asia".parse::<Region>().ok(), Some(Region::AsiaPacific));
        assert_eq!("NA".parse::<Region>().ok(), Some(Region::NorthAmerica));
        assert!("AU".parse::<Region>().is_err());
    }
}
