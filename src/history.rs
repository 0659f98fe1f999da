//! Read side of the ledger: an in-memory copy of the history that is thrown away
//! and re-read whenever the store reports a change, plus the formatting used to
//! show it.

use chrono::{DateTime, Utc};
use itertools::Itertools;
use strum::{Display, EnumString};

use crate::config::SectionExplorer;
use crate::ledger::TransactionLedger;
use crate::notify::StorageEvent;
use crate::storage::Storage;
use crate::transaction::{Chain, Status, Token, Transaction, TxType};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display, EnumString)]
#[strum(ascii_case_insensitive)]
pub enum ChainFilter {
    #[default]
    #[strum(serialize = "all")]
    All,
    #[strum(serialize = "sepolia")]
    Sepolia,
    #[strum(serialize = "Kopli")]
    Kopli,
}

impl ChainFilter {
    pub fn matches(&self, chain: Chain) -> bool {
        match self {
            ChainFilter::All => true,
            ChainFilter::Sepolia => chain == Chain::Sepolia,
            ChainFilter::Kopli => chain == Chain::Kopli,
        }
    }
}

/// One formatted line of the history table.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryRow {
    pub id: String,
    pub date: String,
    pub chain: Chain,
    pub kind: TxType,
    pub amount: String,
    pub status: Status,
    pub short_hash: String,
    pub link: String,
}

#[derive(Debug, Default)]
pub struct HistoryView {
    filter: ChainFilter,
    records: Vec<Transaction>,
}

impl HistoryView {
    pub fn load<S: Storage>(ledger: &TransactionLedger<S>, filter: ChainFilter) -> Self {
        Self {
            filter,
            records: ledger.list(),
        }
    }

    pub fn refresh<S: Storage>(&mut self, ledger: &TransactionLedger<S>) {
        self.records = ledger.list();
    }

    /// Re-reads the history if `event` is about the ledger's key. Returns
    /// whether it did.
    pub fn handle_event<S: Storage>(&mut self, event: &StorageEvent, ledger: &TransactionLedger<S>) -> bool {
        if event.key != ledger.key() {
            return false;
        }
        self.refresh(ledger);
        true
    }

    pub fn filter(&self) -> ChainFilter {
        self.filter
    }

    pub fn set_filter(&mut self, filter: ChainFilter) {
        self.filter = filter;
    }

    /// Records passing the filter, newest first.
    pub fn records(&self) -> impl Iterator<Item = &Transaction> + '_ {
        self.records.iter().filter(|r| self.filter.matches(r.chain))
    }

    pub fn is_empty(&self) -> bool {
        self.records().next().is_none()
    }

    pub fn rows(&self, explorer: &SectionExplorer) -> Vec<HistoryRow> {
        self.records()
            .map(|tx| HistoryRow {
                id: tx.id.clone(),
                date: format_date(&tx.date),
                chain: tx.chain,
                kind: tx.kind,
                amount: format_amount(tx.amount, tx.token),
                status: tx.status,
                short_hash: short_hash(&tx.tx_hash),
                link: explorer.link(tx.chain, &tx.tx_hash),
            })
            .collect()
    }
}

/// `1500` MATIC becomes `1,500.00 MATIC`, `2.5` ETH becomes `2.5000 ETH`.
pub fn format_amount(amount: f64, token: Token) -> String {
    let fixed = format!("{:.*}", token.display_decimals(), amount.abs());
    let (whole, fraction) = fixed.split_once('.').unwrap_or((fixed.as_str(), ""));
    let grouped = whole
        .as_bytes()
        .rchunks(3)
        .rev()
        .map(|chunk| String::from_utf8_lossy(chunk))
        .join(",");
    let sign = if amount < 0.0 { "-" } else { "" };
    if fraction.is_empty() {
        format!("{sign}{grouped} {token}")
    } else {
        format!("{sign}{grouped}.{fraction} {token}")
    }
}

/// Keeps the first 6 and last 4 characters of a hash.
pub fn short_hash(hash: &str) -> String {
    let chars: Vec<char> = hash.chars().collect();
    // Deliberately shown whole: the two halves would overlap or meet
    if chars.len() <= 10 {
        return hash.to_string();
    }
    let head: String = chars[..6].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}...{tail}")
}

pub fn format_date(date: &DateTime<Utc>) -> String {
    date.format("%Y-%m-%d %H:%M").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use crate::transaction::NewTransaction;

    fn new_tx(chain: Chain, kind: TxType, token: Token, amount: f64, tx_hash: &str) -> NewTransaction {
        NewTransaction {
            chain,
            kind,
            amount,
            token,
            status: Status::Completed,
            tx_hash: tx_hash.to_string(),
        }
    }

    fn seeded() -> TransactionLedger<MemoryStorage> {
        let ledger = TransactionLedger::new(MemoryStorage::new());
        ledger
            .append(new_tx(Chain::Sepolia, TxType::DepositCollateral, Token::Eth, 2.5, "0xaaaa1111bbbb2222"))
            .unwrap();
        ledger
            .append(new_tx(Chain::Kopli, TxType::Repay, Token::Matic, 1500.0, "0xcccc3333dddd4444"))
            .unwrap();
        ledger
    }

    #[test]
    fn filter_by_chain() {
        let ledger = seeded();
        let mut view = HistoryView::load(&ledger, ChainFilter::All);
        assert_eq!(view.records().count(), 2);

        view.set_filter(ChainFilter::Kopli);
        let kinds: Vec<TxType> = view.records().map(|r| r.kind).collect();
        assert_eq!(kinds, vec![TxType::Repay]);

        view.set_filter("sepolia".parse().unwrap());
        assert_eq!(view.filter(), ChainFilter::Sepolia);
        assert_eq!(view.records().count(), 1);
    }

    #[test]
    fn rows_are_formatted() {
        let ledger = seeded();
        let view = HistoryView::load(&ledger, ChainFilter::All);
        let rows = view.rows(&SectionExplorer::default());
        assert_eq!(rows.len(), 2);

        assert_eq!(rows[0].amount, "1,500.00 MATIC");
        assert_eq!(rows[0].short_hash, "0xcccc...4444");
        assert_eq!(rows[0].link, "https://kopli.reactscan.net/tx/0xcccc3333dddd4444");
        assert_eq!(rows[1].amount, "2.5000 ETH");
        assert_eq!(rows[1].link, "https://sepolia.etherscan.io/tx/0xaaaa1111bbbb2222");
    }

    #[test]
    fn matching_event_triggers_reload() {
        let storage = MemoryStorage::new();
        let writer = TransactionLedger::new(&storage);
        let reader = TransactionLedger::new(&storage);
        let mut view = HistoryView::load(&reader, ChainFilter::All);
        assert!(view.is_empty());

        writer
            .append(new_tx(Chain::Kopli, TxType::Borrow, Token::Matic, 10.0, "0x1"))
            .unwrap();
        // Nothing changes until an event arrives
        assert!(view.is_empty());

        let other = StorageEvent { key: "darkMode".into() };
        assert!(!view.handle_event(&other, &reader));
        assert!(view.is_empty());

        let ours = StorageEvent { key: reader.key().to_string() };
        assert!(view.handle_event(&ours, &reader));
        assert_eq!(view.records().count(), 1);
    }

    #[test]
    fn amount_formatting() {
        assert_eq!(format_amount(0.0, Token::Eth), "0.0000 ETH");
        assert_eq!(format_amount(1234567.891, Token::Matic), "1,234,567.89 MATIC");
        assert_eq!(format_amount(999.999, Token::Matic), "1,000.00 MATIC");
        assert_eq!(format_amount(-12.5, Token::Matic), "-12.50 MATIC");
    }

    #[test]
    fn short_hashes() {
        assert_eq!(short_hash("0xabc"), "0xabc");
        assert_eq!(short_hash("0x0123456789abcdef"), "0x0123...cdef");
    }

    #[test]
    fn dates_are_minute_precision() {
        let date = DateTime::parse_from_rfc3339("2024-05-06T07:08:09.123Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(format_date(&date), "2024-05-06 07:08");
    }
}
