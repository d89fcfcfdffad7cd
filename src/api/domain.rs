//! Market data domains and their per-domain quirks

use crate::error::AppError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A backend data domain (`/api/{domain}/...`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    Bonds,
    Funds,
    Futures,
    Options,
    Currencies,
    Cryptos,
    Stocks,
}

/// How the remote-sync request body names its fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPayloadStyle {
    /// `remote_host`, `remote_username`, ... `batch_size`
    RemotePrefixed,
    /// `host`, `username`, ... `batchSize`
    Plain,
}

impl Domain {
    pub const ALL: [Domain; 7] = [
        Domain::Bonds,
        Domain::Funds,
        Domain::Futures,
        Domain::Options,
        Domain::Currencies,
        Domain::Cryptos,
        Domain::Stocks,
    ];

    /// URL path segment
    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Bonds => "bonds",
            Domain::Funds => "funds",
            Domain::Futures => "futures",
            Domain::Options => "options",
            Domain::Currencies => "currencies",
            Domain::Cryptos => "cryptos",
            Domain::Stocks => "stocks",
        }
    }

    /// Singular label used as the prefix of operator notices
    pub fn label(&self) -> &'static str {
        match self {
            Domain::Bonds => "Bond",
            Domain::Funds => "Fund",
            Domain::Futures => "Futures",
            Domain::Options => "Option",
            Domain::Currencies => "Currency",
            Domain::Cryptos => "Crypto",
            Domain::Stocks => "Stock",
        }
    }

    /// Base path of every collection endpoint in this domain
    pub fn collections_path(&self) -> String {
        format!("/api/{}/collections", self.as_str())
    }

    /// Path of the paged data endpoint for one collection
    pub fn data_path(&self, collection: &str) -> String {
        let base = format!("{}/{}", self.collections_path(), encode(collection));
        match self {
            Domain::Stocks => format!("{}/data", base),
            _ => base,
        }
    }

    /// Path of a sub-resource of one collection (`stats`, `refresh`, ...)
    pub fn collection_path(&self, collection: &str, tail: &str) -> String {
        format!(
            "{}/{}/{}",
            self.collections_path(),
            encode(collection),
            tail.trim_start_matches('/')
        )
    }

    /// Path of an endpoint that belongs to the domain rather than a collection
    pub fn domain_path(&self, tail: &str) -> String {
        format!("/api/{}/{}", self.as_str(), tail.trim_start_matches('/'))
    }

    /// Only funds publish a fund company list
    pub fn has_fund_companies(&self) -> bool {
        matches!(self, Domain::Funds)
    }

    /// Only currencies publish domain settings
    pub fn has_domain_config(&self) -> bool {
        matches!(self, Domain::Currencies)
    }

    /// Whether a collection keeps the column order the backend sends
    pub fn preserves_field_order(&self, collection: &str) -> bool {
        matches!(self, Domain::Funds) && collection == "fund_hk_hist_em"
    }

    /// Whether a string `year` parameter is sent as an integer
    pub fn coerces_numeric_year(&self) -> bool {
        matches!(self, Domain::Funds)
    }

    pub fn sync_payload_style(&self) -> SyncPayloadStyle {
        match self {
            Domain::Bonds => SyncPayloadStyle::RemotePrefixed,
            _ => SyncPayloadStyle::Plain,
        }
    }
}

fn encode(segment: &str) -> String {
    urlencoding::encode(segment).into_owned()
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Domain {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bonds" | "bond" => Ok(Domain::Bonds),
            "funds" | "fund" => Ok(Domain::Funds),
            "futures" => Ok(Domain::Futures),
            "options" | "option" => Ok(Domain::Options),
            "currencies" | "currency" => Ok(Domain::Currencies),
            "cryptos" | "crypto" => Ok(Domain::Cryptos),
            "stocks" | "stock" => Ok(Domain::Stocks),
            _ => Err(AppError::Validation(format!("Unknown domain: {}", s))),
        }
    }
}
