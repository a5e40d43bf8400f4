//! Governance object model.
//!
//! A governance object is either a funding `Proposal` or a `Superblock`
//! (the "trigger" the chain pays out at a cycle height). Both share the
//! hash and vote-tally header held by [`GovernanceObject`]; the type-specific
//! part lives in [`ObjectBody`] and is dispatched with a plain `match`.

use super::{GovernanceError, GovernanceResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Satoshis per coin.
pub const COIN: u64 = 100_000_000;

/// Chain-assigned 32-byte object identifier, held as 64 lowercase hex chars.
///
/// Because the representation is fixed-width lowercase hex, the derived
/// string ordering is the same as ordering the hashes as 256-bit integers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ObjectHash(String);

impl ObjectHash {
    pub fn parse(s: &str) -> GovernanceResult<Self> {
        let trimmed = s.trim();
        if trimmed.is_empty()
            || trimmed.len() > 64
            || !trimmed.chars().all(|c| c.is_ascii_hexdigit())
        {
            return Err(GovernanceError::InvalidHash(s.to_string()));
        }
        Ok(Self(format!("{:0>64}", trimmed.to_ascii_lowercase())))
    }

    pub fn from_digest(bytes: &[u8; 32]) -> Self {
        Self(hex::encode(bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ObjectHash {
    type Error = GovernanceError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<ObjectHash> for String {
    fn from(h: ObjectHash) -> Self {
        h.0
    }
}

/// Wire code of a governance object type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectType {
    Proposal,
    Superblock,
}

impl ObjectType {
    pub fn code(self) -> i64 {
        match self {
            ObjectType::Proposal => 1,
            ObjectType::Superblock => 2,
        }
    }

    pub fn from_code(code: i64) -> GovernanceResult<Self> {
        match code {
            1 => Ok(ObjectType::Proposal),
            2 => Ok(ObjectType::Superblock),
            other => Err(GovernanceError::UnknownObjectType(other)),
        }
    }
}

/// What a vote is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteSignal {
    Funding,
    Valid,
    Delete,
}

impl VoteSignal {
    pub fn as_str(self) -> &'static str {
        match self {
            VoteSignal::Funding => "funding",
            VoteSignal::Valid => "valid",
            VoteSignal::Delete => "delete",
        }
    }
}

impl fmt::Display for VoteSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VoteSignal {
    type Err = GovernanceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "funding" => Ok(VoteSignal::Funding),
            "valid" => Ok(VoteSignal::Valid),
            "delete" => Ok(VoteSignal::Delete),
            _ => Err(GovernanceError::MalformedPayload(format!(
                "unknown vote signal '{}'",
                s
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteOutcome {
    Yes,
    No,
}

impl VoteOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            VoteOutcome::Yes => "yes",
            VoteOutcome::No => "no",
        }
    }
}

impl fmt::Display for VoteOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VoteOutcome {
    type Err = GovernanceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "yes" => Ok(VoteOutcome::Yes),
            "no" => Ok(VoteOutcome::No),
            _ => Err(GovernanceError::MalformedPayload(format!(
                "unknown vote outcome '{}'",
                s
            ))),
        }
    }
}

/// A vote this masternode has cast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vote {
    pub object_hash: ObjectHash,
    pub signal: VoteSignal,
    pub outcome: VoteOutcome,
    pub cast_at: i64,
}

/// Fixed-point coin amount with 8 decimals, stored as satoshis.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Amount(u64);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    pub fn from_sat(sat: u64) -> Self {
        Self(sat)
    }

    pub fn from_coins(coins: u64) -> Self {
        Self(coins * COIN)
    }

    pub fn as_sat(self) -> u64 {
        self.0
    }

    pub fn checked_add(self, other: Amount) -> Option<Amount> {
        self.0.checked_add(other.0).map(Amount)
    }

    /// Parse a decimal coin string such as `"12.5"` or `"100.00000000"`.
    pub fn parse_decimal(s: &str) -> GovernanceResult<Self> {
        let invalid = || GovernanceError::InvalidAmount(s.to_string());
        let s = s.trim();
        let (whole, frac) = match s.split_once('.') {
            Some((w, f)) => (w, f),
            None => (s, ""),
        };
        if whole.is_empty() && frac.is_empty() {
            return Err(invalid());
        }
        if frac.len() > 8
            || !whole.chars().all(|c| c.is_ascii_digit())
            || !frac.chars().all(|c| c.is_ascii_digit())
        {
            return Err(invalid());
        }
        let whole: u64 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| invalid())?
        };
        let frac: u64 = if frac.is_empty() {
            0
        } else {
            format!("{:0<8}", frac).parse().map_err(|_| invalid())?
        };
        whole
            .checked_mul(COIN)
            .and_then(|w| w.checked_add(frac))
            .map(Amount)
            .ok_or_else(invalid)
    }

    /// Parse a JSON number or numeric string.
    ///
    /// Strings must be plain decimals with at most 8 fractional digits.
    /// Numbers are exact when their decimal form is; a float written with an
    /// exponent or with sub-satoshi digits is rounded to the nearest satoshi.
    pub fn from_json(value: &Value) -> GovernanceResult<Self> {
        let invalid = || GovernanceError::InvalidAmount(value.to_string());
        match value {
            Value::Number(n) => {
                if let Some(coins) = n.as_u64() {
                    return coins.checked_mul(COIN).map(Amount).ok_or_else(invalid);
                }
                if let Ok(amount) = Self::parse_decimal(&n.to_string()) {
                    return Ok(amount);
                }
                let coins = n.as_f64().ok_or_else(invalid)?;
                let sat = (coins * COIN as f64).round();
                if !sat.is_finite() || sat < 0.0 || sat >= u64::MAX as f64 {
                    return Err(invalid());
                }
                Ok(Amount(sat as u64))
            }
            Value::String(s) => Self::parse_decimal(s),
            _ => Err(invalid()),
        }
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:08}", self.0 / COIN, self.0 % COIN)
    }
}

/// Funding request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Proposal {
    pub name: String,
    pub url: String,
    pub payment_address: String,
    pub payment_amount: Amount,
    pub start_epoch: i64,
    pub end_epoch: i64,
}

/// One line of a superblock payout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payment {
    pub address: String,
    pub amount: Amount,
    pub proposal_hash: ObjectHash,
}

/// Payout record for one cycle height.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Superblock {
    pub event_block_height: u64,
    pub payments: Vec<Payment>,
}

#[derive(Debug, Deserialize)]
struct ProposalPayload {
    name: String,
    #[serde(default)]
    url: String,
    payment_address: String,
    payment_amount: Value,
    start_epoch: i64,
    end_epoch: i64,
}

#[derive(Debug, Deserialize)]
struct SuperblockPayload {
    event_block_height: u64,
    payment_addresses: String,
    payment_amounts: String,
    proposal_hashes: String,
}

impl Proposal {
    pub fn from_payload(data: &str) -> GovernanceResult<Self> {
        let raw: ProposalPayload = serde_json::from_str(data)
            .map_err(|e| GovernanceError::MalformedPayload(format!("proposal: {}", e)))?;
        Ok(Self {
            name: raw.name,
            url: raw.url,
            payment_address: raw.payment_address,
            payment_amount: Amount::from_json(&raw.payment_amount)?,
            start_epoch: raw.start_epoch,
            end_epoch: raw.end_epoch,
        })
    }
}

impl Superblock {
    pub fn from_payload(data: &str) -> GovernanceResult<Self> {
        let raw: SuperblockPayload = serde_json::from_str(data)
            .map_err(|e| GovernanceError::MalformedPayload(format!("superblock: {}", e)))?;
        Self::from_columns(
            raw.event_block_height,
            &raw.payment_addresses,
            &raw.payment_amounts,
            &raw.proposal_hashes,
        )
    }

    /// Rebuild from the pipe-separated column form used on the wire and in
    /// the store.
    pub fn from_columns(
        event_block_height: u64,
        addresses: &str,
        amounts: &str,
        proposal_hashes: &str,
    ) -> GovernanceResult<Self> {
        let split = |s: &str| -> Vec<String> {
            if s.is_empty() {
                Vec::new()
            } else {
                s.split('|').map(str::to_string).collect()
            }
        };
        let addresses = split(addresses);
        let amounts = split(amounts);
        let hashes = split(proposal_hashes);

        if addresses.len() != amounts.len() || amounts.len() != hashes.len() {
            return Err(GovernanceError::MalformedPayload(format!(
                "superblock column lengths differ ({} addresses, {} amounts, {} hashes)",
                addresses.len(),
                amounts.len(),
                hashes.len()
            )));
        }

        let payments = addresses
            .into_iter()
            .zip(amounts)
            .zip(hashes)
            .map(|((address, amount), hash)| {
                Ok(Payment {
                    address,
                    amount: Amount::parse_decimal(&amount)?,
                    proposal_hash: ObjectHash::parse(&hash)?,
                })
            })
            .collect::<GovernanceResult<Vec<_>>>()?;

        Ok(Self {
            event_block_height,
            payments,
        })
    }

    pub fn payment_addresses(&self) -> String {
        self.payments
            .iter()
            .map(|p| p.address.as_str())
            .collect::<Vec<_>>()
            .join("|")
    }

    pub fn payment_amounts(&self) -> String {
        self.payments
            .iter()
            .map(|p| p.amount.to_string())
            .collect::<Vec<_>>()
            .join("|")
    }

    pub fn proposal_hashes(&self) -> String {
        self.payments
            .iter()
            .map(|p| p.proposal_hash.as_str())
            .collect::<Vec<_>>()
            .join("|")
    }
}

/// Type-specific part of a governance object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObjectBody {
    Proposal(Proposal),
    Superblock(Superblock),
}

impl ObjectBody {
    pub fn parse(object_type: ObjectType, data: &str) -> GovernanceResult<Self> {
        match object_type {
            ObjectType::Proposal => Proposal::from_payload(data).map(ObjectBody::Proposal),
            ObjectType::Superblock => Superblock::from_payload(data).map(ObjectBody::Superblock),
        }
    }

    pub fn object_type(&self) -> ObjectType {
        match self {
            ObjectBody::Proposal(_) => ObjectType::Proposal,
            ObjectBody::Superblock(_) => ObjectType::Superblock,
        }
    }
}

/// Synced governance object: header, tallies and parsed body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GovernanceObject {
    pub object_hash: ObjectHash,
    /// Raw JSON payload as broadcast.
    pub data_string: String,
    /// Net yes-minus-no weight reported by the daemon.
    pub absolute_yes_count: i64,
    pub yes_count: i64,
    pub no_count: i64,
    pub abstain_count: i64,
    pub body: ObjectBody,
}

impl GovernanceObject {
    pub fn object_type(&self) -> ObjectType {
        self.body.object_type()
    }

    pub fn as_proposal(&self) -> Option<&Proposal> {
        match &self.body {
            ObjectBody::Proposal(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_superblock(&self) -> Option<&Superblock> {
        match &self.body {
            ObjectBody::Superblock(s) => Some(s),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HASH_A: &str = "aa00000000000000000000000000000000000000000000000000000000000001";

    #[test]
    fn test_object_hash_normalises_case_and_width() {
        let h = ObjectHash::parse("ABC").unwrap();
        assert_eq!(h.as_str().len(), 64);
        assert!(h.as_str().ends_with("abc"));
        assert!(h.as_str().starts_with("000"));
    }

    #[test]
    fn test_object_hash_rejects_garbage() {
        assert!(ObjectHash::parse("").is_err());
        assert!(ObjectHash::parse("xyz").is_err());
        assert!(ObjectHash::parse(&"f".repeat(65)).is_err());
    }

    #[test]
    fn test_object_hash_order_is_numeric() {
        let small = ObjectHash::parse("ff").unwrap();
        let large = ObjectHash::parse("100").unwrap();
        assert!(large > small);
    }

    #[test]
    fn test_amount_parse_and_display() {
        assert_eq!(Amount::parse_decimal("12.5").unwrap().as_sat(), 1_250_000_000);
        assert_eq!(Amount::parse_decimal("100").unwrap(), Amount::from_coins(100));
        assert_eq!(Amount::parse_decimal(".00000001").unwrap().as_sat(), 1);
        assert_eq!(Amount::from_sat(1_250_000_000).to_string(), "12.50000000");
        assert!(Amount::parse_decimal("1.123456789").is_err());
        assert!(Amount::parse_decimal("-1").is_err());
        assert!(Amount::parse_decimal("").is_err());
    }

    #[test]
    fn test_amount_from_json_number() {
        let v: Value = serde_json::from_str("7.25").unwrap();
        assert_eq!(Amount::from_json(&v).unwrap().as_sat(), 725_000_000);

        let v: Value = serde_json::from_str("250").unwrap();
        assert_eq!(Amount::from_json(&v).unwrap(), Amount::from_coins(250));
    }

    #[test]
    fn test_amount_from_json_rounds_floats() {
        let v: Value = serde_json::from_str("1e-7").unwrap();
        assert_eq!(Amount::from_json(&v).unwrap().as_sat(), 10);

        let v: Value = serde_json::from_str("2.5e3").unwrap();
        assert_eq!(Amount::from_json(&v).unwrap(), Amount::from_coins(2_500));

        let v: Value = serde_json::from_str("0.123456789").unwrap();
        assert_eq!(Amount::from_json(&v).unwrap().as_sat(), 12_345_679);

        let v: Value = serde_json::from_str("-1.5").unwrap();
        assert!(Amount::from_json(&v).is_err());

        // Strings stay strict.
        assert!(Amount::from_json(&Value::String("0.123456789".into())).is_err());
    }

    #[test]
    fn test_vote_signal_roundtrip_strings() {
        for s in [VoteSignal::Funding, VoteSignal::Valid, VoteSignal::Delete] {
            assert_eq!(s.as_str().parse::<VoteSignal>().unwrap(), s);
        }
        assert!("endorsed".parse::<VoteSignal>().is_err());
    }

    #[test]
    fn test_proposal_payload_parse() {
        let data = r#"{"type":1,"name":"dev-fund","url":"https://example.org","payment_address":"sys1qxyz","payment_amount":25.5,"start_epoch":1000,"end_epoch":2000}"#;
        let body = ObjectBody::parse(ObjectType::Proposal, data).unwrap();
        let p = match body {
            ObjectBody::Proposal(p) => p,
            _ => panic!("expected proposal"),
        };
        assert_eq!(p.name, "dev-fund");
        assert_eq!(p.payment_amount, Amount::parse_decimal("25.5").unwrap());
        assert_eq!(p.end_epoch, 2000);
    }

    #[test]
    fn test_superblock_payload_parse() {
        let data = format!(
            r#"{{"type":2,"event_block_height":1000,"payment_addresses":"addr1","payment_amounts":"10.00000000","proposal_hashes":"{}"}}"#,
            HASH_A
        );
        let sb = Superblock::from_payload(&data).unwrap();
        assert_eq!(sb.event_block_height, 1000);
        assert_eq!(sb.payments.len(), 1);
        assert_eq!(sb.payment_amounts(), "10.00000000");
        assert_eq!(sb.proposal_hashes(), HASH_A);
    }

    #[test]
    fn test_superblock_column_mismatch_rejected() {
        let err = Superblock::from_columns(10, "a|b", "1", HASH_A).unwrap_err();
        assert!(matches!(err, GovernanceError::MalformedPayload(_)));
    }
}
