use std::time::UNIX_EPOCH;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

/// The network an operation was submitted to. Collateral lives on Sepolia,
/// loans are issued on Kopli.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter, AsRefStr,
)]
#[strum(ascii_case_insensitive)]
pub enum Chain {
    #[default]
    #[serde(rename = "sepolia")]
    #[strum(serialize = "sepolia")]
    Sepolia,
    #[serde(rename = "Kopli")]
    #[strum(serialize = "Kopli")]
    Kopli,
}

/// The economic action behind a record.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter, AsRefStr,
)]
#[strum(ascii_case_insensitive)]
pub enum TxType {
    #[default]
    #[serde(rename = "Deposit Collateral")]
    #[strum(to_string = "Deposit Collateral", serialize = "deposit-collateral", serialize = "deposit")]
    DepositCollateral,
    #[serde(rename = "Borrow")]
    #[strum(to_string = "Borrow", serialize = "borrow")]
    Borrow,
    #[serde(rename = "Repay")]
    #[strum(to_string = "Repay", serialize = "repay")]
    Repay,
    #[serde(rename = "Release Collateral")]
    #[strum(to_string = "Release Collateral", serialize = "release-collateral", serialize = "release")]
    ReleaseCollateral,
}

/// Unit of the `amount` field.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter, AsRefStr,
)]
#[strum(ascii_case_insensitive)]
pub enum Token {
    /// Collateral asset
    #[default]
    #[serde(rename = "ETH")]
    #[strum(serialize = "ETH")]
    Eth,
    /// Loan asset
    #[serde(rename = "MATIC")]
    #[strum(serialize = "MATIC")]
    Matic,
}

impl Token {
    /// Number of fractional digits shown when rendering an amount of this token.
    pub fn display_decimals(&self) -> usize {
        match self {
            Token::Eth => 4,
            Token::Matic => 2,
        }
    }
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Status {
    #[default]
    Pending,
    Completed,
}

/// A stored ledger entry. Every field carries a default so that entries written
/// by older versions of the dashboard, which may lack fields or hold `null` or
/// values this version does not know, still load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Transaction {
    #[serde(deserialize_with = "lenient::or_default")]
    pub id: String,
    #[serde(deserialize_with = "lenient::or_default")]
    pub chain: Chain,
    #[serde(rename = "type", deserialize_with = "lenient::or_default")]
    pub kind: TxType,
    #[serde(deserialize_with = "lenient::or_default")]
    pub amount: f64,
    #[serde(deserialize_with = "lenient::or_default")]
    pub token: Token,
    #[serde(with = "iso_date")]
    pub date: DateTime<Utc>,
    #[serde(deserialize_with = "lenient::or_default")]
    pub status: Status,
    #[serde(deserialize_with = "lenient::or_default")]
    pub tx_hash: String,
}

impl Default for Transaction {
    fn default() -> Self {
        Self {
            id: String::new(),
            chain: Chain::default(),
            kind: TxType::default(),
            amount: 0.0,
            token: Token::default(),
            date: DateTime::<Utc>::from(UNIX_EPOCH),
            status: Status::default(),
            tx_hash: String::new(),
        }
    }
}

/// A record as handed to the ledger, before it gets its id and date.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTransaction {
    pub chain: Chain,
    pub kind: TxType,
    pub amount: f64,
    pub token: Token,
    pub status: Status,
    pub tx_hash: String,
}

impl NewTransaction {
    pub fn into_transaction(self, id: String, date: DateTime<Utc>) -> Transaction {
        Transaction {
            id,
            chain: self.chain,
            kind: self.kind,
            amount: self.amount,
            token: self.token,
            date,
            status: self.status,
            tx_hash: self.tx_hash,
        }
    }
}

mod lenient {
    use serde::de::DeserializeOwned;
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    /// Falls back to `T::default()` when the value is `null` or of the wrong shape.
    pub fn or_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
    where
        D: Deserializer<'de>,
        T: DeserializeOwned + Default,
    {
        let value = Value::deserialize(deserializer)?;
        Ok(serde_json::from_value(value).unwrap_or_default())
    }
}

/// Dates use the `Date.prototype.toISOString` shape (millisecond precision, `Z`
/// suffix) on write and accept any RFC 3339 timestamp on read. Anything else
/// reads as the epoch.
mod iso_date {
    use std::time::UNIX_EPOCH;

    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};
    use serde_json::Value;

    pub fn serialize<S: Serializer>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&date.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let date = match Value::deserialize(deserializer)? {
            Value::String(raw) => DateTime::parse_from_rfc3339(&raw)
                .map(|date| date.with_timezone(&Utc))
                .ok(),
            _ => None,
        };
        Ok(date.unwrap_or_else(|| DateTime::<Utc>::from(UNIX_EPOCH)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn sample() -> Transaction {
        Transaction {
            id: "k3j9x0a1b".into(),
            chain: Chain::Kopli,
            kind: TxType::Repay,
            amount: 150.5,
            token: Token::Matic,
            date: Utc.with_ymd_and_hms(2024, 11, 2, 9, 30, 0).unwrap(),
            status: Status::Completed,
            tx_hash: "0xfeed".into(),
        }
    }

    #[test]
    fn serializes_with_dashboard_field_names() {
        let value = serde_json::to_value(sample()).unwrap();
        assert_eq!(
            value,
            json!({
                "id": "k3j9x0a1b",
                "chain": "Kopli",
                "type": "Repay",
                "amount": 150.5,
                "token": "MATIC",
                "date": "2024-11-02T09:30:00.000Z",
                "status": "completed",
                "txHash": "0xfeed",
            })
        );
    }

    #[test]
    fn reads_records_written_by_the_dashboard() {
        let tx: Transaction = serde_json::from_value(json!({
            "chain": "sepolia",
            "type": "Deposit Collateral",
            "amount": 0.75,
            "token": "ETH",
            "status": "pending",
            "txHash": "0xabc",
            "id": "x1y2z3",
            "date": "2024-03-05T12:00:01.250Z",
        }))
        .unwrap();
        assert_eq!(tx.chain, Chain::Sepolia);
        assert_eq!(tx.kind, TxType::DepositCollateral);
        assert_eq!(tx.token, Token::Eth);
        assert_eq!(tx.status, Status::Pending);
        assert_eq!(tx.date.timestamp_millis() % 1000, 250);
    }

    #[test]
    fn missing_fields_take_defaults() {
        let tx: Transaction = serde_json::from_value(json!({ "id": "old", "txHash": "0x1" })).unwrap();
        assert_eq!(tx.id, "old");
        assert_eq!(tx.tx_hash, "0x1");
        assert_eq!(tx.status, Status::Pending);
        assert_eq!(tx.amount, 0.0);
        assert_eq!(tx.date.timestamp(), 0);
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let tx: Transaction = serde_json::from_value(json!({ "id": "a", "note": "added later" })).unwrap();
        assert_eq!(tx.id, "a");
    }

    #[test]
    fn unknown_and_null_values_take_defaults() {
        // JSON.stringify writes a NaN amount as null
        let tx: Transaction = serde_json::from_value(json!({
            "id": "old1",
            "chain": "mainnet",
            "type": 7,
            "amount": null,
            "token": "DAI",
            "date": "yesterday",
            "status": "failed",
            "txHash": "0x9",
        }))
        .unwrap();
        assert_eq!(tx.id, "old1");
        assert_eq!(tx.tx_hash, "0x9");
        assert_eq!(tx.chain, Chain::Sepolia);
        assert_eq!(tx.kind, TxType::DepositCollateral);
        assert_eq!(tx.amount, 0.0);
        assert_eq!(tx.token, Token::Eth);
        assert_eq!(tx.date.timestamp(), 0);
        assert_eq!(tx.status, Status::Pending);
    }

    #[test]
    fn non_objects_are_not_records() {
        assert!(serde_json::from_value::<Transaction>(json!(42)).is_err());
        assert!(serde_json::from_value::<Transaction>(json!("0x1")).is_err());
    }

    #[test]
    fn parses_cli_spellings() {
        assert_eq!("kopli".parse::<Chain>().unwrap(), Chain::Kopli);
        assert_eq!("Sepolia".parse::<Chain>().unwrap(), Chain::Sepolia);
        assert_eq!("deposit".parse::<TxType>().unwrap(), TxType::DepositCollateral);
        assert_eq!("Release Collateral".parse::<TxType>().unwrap(), TxType::ReleaseCollateral);
        assert_eq!("matic".parse::<Token>().unwrap(), Token::Matic);
        assert_eq!("COMPLETED".parse::<Status>().unwrap(), Status::Completed);
        assert!("stake".parse::<TxType>().is_err());
    }

    #[test]
    fn display_matches_wire_names() {
        assert_eq!(Chain::Kopli.to_string(), "Kopli");
        assert_eq!(TxType::DepositCollateral.to_string(), "Deposit Collateral");
        assert_eq!(Token::Eth.to_string(), "ETH");
        assert_eq!(Status::Completed.to_string(), "completed");
    }
}
