//! Supported blockchains and the tables that back them.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A blockchain with its own transactions and labels tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Blockchain {
    Ethereum,
    Polygon,
    Mumbai,
    Xdai,
}

impl Blockchain {
    pub const ALL: [Blockchain; 4] = [
        Blockchain::Ethereum,
        Blockchain::Polygon,
        Blockchain::Mumbai,
        Blockchain::Xdai,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ethereum => "ethereum",
            Self::Polygon => "polygon",
            Self::Mumbai => "mumbai",
            Self::Xdai => "xdai",
        }
    }

    pub fn transactions_table(&self) -> &'static str {
        match self {
            Self::Ethereum => "ethereum_transactions",
            Self::Polygon => "polygon_transactions",
            Self::Mumbai => "mumbai_transactions",
            Self::Xdai => "xdai_transactions",
        }
    }

    pub fn labels_table(&self) -> &'static str {
        match self {
            Self::Ethereum => "ethereum_labels",
            Self::Polygon => "polygon_labels",
            Self::Mumbai => "mumbai_labels",
            Self::Xdai => "xdai_labels",
        }
    }

    /// Event type served by this chain's transaction provider.
    pub fn blockchain_event_type(&self) -> String {
        format!("{}_blockchain", self.as_str())
    }

    /// Event type served by this chain's label provider.
    pub fn smartcontract_event_type(&self) -> String {
        format!("{}_smartcontract", self.as_str())
    }
}

impl fmt::Display for Blockchain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Blockchain {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown blockchain '{s}'"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tables_and_event_types() {
        let chain = Blockchain::Polygon;
        assert_eq!(chain.transactions_table(), "polygon_transactions");
        assert_eq!(chain.labels_table(), "polygon_labels");
        assert_eq!(chain.blockchain_event_type(), "polygon_blockchain");
        assert_eq!(chain.smartcontract_event_type(), "polygon_smartcontract");
    }

    #[test]
    fn parses_case_insensitively() {
        assert_eq!("XDai".parse::<Blockchain>().unwrap(), Blockchain::Xdai);
        assert!("solana".parse::<Blockchain>().is_err());
    }
}
