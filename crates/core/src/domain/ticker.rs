use serde::{Deserialize, Serialize};
use std::fmt;

/// Case-normalized instrument code. Construct through [`TickerSymbol::parse`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TickerSymbol(String);

impl TickerSymbol {
    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        let normalized = raw.trim().to_ascii_uppercase();
        anyhow::ensure!(!normalized.is_empty(), "ticker must be non-empty");
        anyhow::ensure!(
            !normalized.chars().any(char::is_whitespace),
            "ticker must not contain whitespace: {normalized:?}"
        );
        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TickerSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for TickerSymbol {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<TickerSymbol> for String {
    fn from(value: TickerSymbol) -> Self {
        value.0
    }
}

impl std::str::FromStr for TickerSymbol {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
