//! Models module.
use std::fmt;
use std::str::FromStr;

use super::ConfigError;

pub mod content;
pub mod factorization;
pub mod neighborhood;

/// Which item text the content-based model builds its profiles from.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum ProfileType {
    /// Free-text plot summaries.
    Plot,
    /// Free-text metadata (genres, cast, keywords).
    Metadata,
}

impl FromStr for ProfileType {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_lowercase().as_str() {
            "plot" => Ok(ProfileType::Plot),
            "metadata" => Ok(ProfileType::Metadata),
            _ => Err(ConfigError::UnknownProfileType(value.to_owned())),
        }
    }
}

impl fmt::Display for ProfileType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ProfileType::Plot => write!(f, "plot"),
            ProfileType::Metadata => write!(f, "metadata"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_profile_type() {
        assert_eq!("plot".parse::<ProfileType>(), Ok(ProfileType::Plot));
        assert_eq!("Metadata".parse::<ProfileType>(), Ok(ProfileType::Metadata));
        assert_eq!(
            "genres".parse::<ProfileType>(),
            Err(ConfigError::UnknownProfileType("genres".to_owned()))
        );
        assert_eq!(ProfileType::Metadata.to_string(), "metadata");
    }
}
