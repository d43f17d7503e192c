//! Actor addresses in their textual form (`f01000`, `t3...`) and the sending
//! address policy built from the `[Addresses]` config section.

use std::fmt;
use std::str::FromStr;

use blake2::digest::consts::U4;
use blake2::{Blake2b, Digest};
use data_encoding::BASE32_NOPAD;
use thiserror::Error;

use crate::config::AddressesConfig;

type Blake2b32 = Blake2b<U4>;

const BASE32_ALPHABET: &str = "abcdefghijklmnopqrstuvwxyz234567";
const CHECKSUM_LEN: usize = 4;
/// base32 length of a 20-byte payload plus the 4-byte checksum.
const KEY_HASH_ENCODED_LEN: usize = 39;
/// base32 length of a 48-byte BLS public key plus the 4-byte checksum.
const BLS_ENCODED_LEN: usize = 84;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Network {
    Mainnet,
    Testnet,
}

impl Network {
    fn prefix(self) -> char {
        match self {
            Network::Mainnet => 'f',
            Network::Testnet => 't',
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Protocol {
    Id = 0,
    Secp256k1 = 1,
    Actor = 2,
    Bls = 3,
    Delegated = 4,
}

impl Protocol {
    fn digit(self) -> char {
        match self {
            Protocol::Id => '0',
            Protocol::Secp256k1 => '1',
            Protocol::Actor => '2',
            Protocol::Bls => '3',
            Protocol::Delegated => '4',
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Payload {
    Id(u64),
    /// Lowercase base32 of payload and checksum, kept verbatim.
    Encoded(String),
    Delegated { namespace: u64, encoded: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address {
    network: Network,
    protocol: Protocol,
    payload: Payload,
}

impl Address {
    pub fn new_id(network: Network, id: u64) -> Self {
        Self {
            network,
            protocol: Protocol::Id,
            payload: Payload::Id(id),
        }
    }

    pub fn network(&self) -> Network {
        self.network
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    /// Actor ID for protocol-0 addresses.
    pub fn id(&self) -> Option<u64> {
        match self.payload {
            Payload::Id(id) => Some(id),
            _ => None,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("address is too short")]
    TooShort,
    #[error("unknown network prefix `{0}`")]
    UnknownNetwork(char),
    #[error("unknown address protocol `{0}`")]
    UnknownProtocol(char),
    #[error("invalid actor id: {0}")]
    InvalidId(String),
    #[error("payload is not lowercase base32")]
    InvalidPayload,
    #[error("payload has length {actual}, expected {expected}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("checksum mismatch")]
    InvalidChecksum,
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let mut chars = raw.chars();
        let (Some(net), Some(proto)) = (chars.next(), chars.next()) else {
            return Err(AddressError::TooShort);
        };
        let network = match net {
            'f' => Network::Mainnet,
            't' => Network::Testnet,
            other => return Err(AddressError::UnknownNetwork(other)),
        };
        let rest = chars.as_str();
        if rest.is_empty() {
            return Err(AddressError::TooShort);
        }

        let (protocol, payload) = match proto {
            '0' => (Protocol::Id, Payload::Id(parse_actor_id(rest)?)),
            '1' => (
                Protocol::Secp256k1,
                encoded(Protocol::Secp256k1, rest, KEY_HASH_ENCODED_LEN)?,
            ),
            '2' => (
                Protocol::Actor,
                encoded(Protocol::Actor, rest, KEY_HASH_ENCODED_LEN)?,
            ),
            '3' => (Protocol::Bls, encoded(Protocol::Bls, rest, BLS_ENCODED_LEN)?),
            '4' => {
                let (namespace, sub) = rest.split_once('f').ok_or(AddressError::InvalidPayload)?;
                let namespace = parse_actor_id(namespace)?;
                let mut prefix = vec![Protocol::Delegated as u8];
                prefix.extend(leb128(namespace));
                verify_checksum(&prefix, sub)?;
                (
                    Protocol::Delegated,
                    Payload::Delegated {
                        namespace,
                        encoded: sub.to_string(),
                    },
                )
            }
            other => return Err(AddressError::UnknownProtocol(other)),
        };

        Ok(Self {
            network,
            protocol,
            payload,
        })
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.network.prefix(), self.protocol.digit())?;
        match &self.payload {
            Payload::Id(id) => write!(f, "{id}"),
            Payload::Encoded(encoded) => f.write_str(encoded),
            Payload::Delegated { namespace, encoded } => write!(f, "{namespace}f{encoded}"),
        }
    }
}

fn parse_actor_id(raw: &str) -> Result<u64, AddressError> {
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(AddressError::InvalidId(raw.to_string()));
    }
    if raw.len() > 1 && raw.starts_with('0') {
        return Err(AddressError::InvalidId(raw.to_string()));
    }
    let id: u64 = raw
        .parse()
        .map_err(|_| AddressError::InvalidId(raw.to_string()))?;
    if id > i64::MAX as u64 {
        return Err(AddressError::InvalidId(raw.to_string()));
    }
    Ok(id)
}

fn encoded(protocol: Protocol, raw: &str, expected: usize) -> Result<Payload, AddressError> {
    if !is_base32(raw) {
        return Err(AddressError::InvalidPayload);
    }
    if raw.len() != expected {
        return Err(AddressError::InvalidLength {
            expected,
            actual: raw.len(),
        });
    }
    verify_checksum(&[protocol as u8], raw)?;
    Ok(Payload::Encoded(raw.to_string()))
}

/// Decodes `raw` as payload followed by a 4-byte blake2b checksum over
/// `prefix || payload` and checks that the two agree.
fn verify_checksum(prefix: &[u8], raw: &str) -> Result<(), AddressError> {
    if raw.is_empty() || !is_base32(raw) {
        return Err(AddressError::InvalidPayload);
    }
    let bytes = BASE32_NOPAD
        .decode(raw.to_ascii_uppercase().as_bytes())
        .map_err(|_| AddressError::InvalidPayload)?;
    if bytes.len() <= CHECKSUM_LEN {
        return Err(AddressError::InvalidPayload);
    }
    let (payload, checksum) = bytes.split_at(bytes.len() - CHECKSUM_LEN);
    let expected = Blake2b32::new()
        .chain_update(prefix)
        .chain_update(payload)
        .finalize();
    if expected.as_slice() != checksum {
        return Err(AddressError::InvalidChecksum);
    }
    Ok(())
}

fn leb128(mut value: u64) -> Vec<u8> {
    let mut out = Vec::new();
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            return out;
        }
        out.push(byte | 0x80);
    }
}

fn is_base32(raw: &str) -> bool {
    raw.chars().all(|c| BASE32_ALPHABET.contains(c))
}

/// Address of a miner actor served by this node.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MinerAddress(Address);

impl MinerAddress {
    pub fn address(&self) -> &Address {
        &self.0
    }
}

impl From<Address> for MinerAddress {
    fn from(value: Address) -> Self {
        Self(value)
    }
}

impl fmt::Display for MinerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid address `{value}` in Addresses.{field}: {source}")]
pub struct AddressSelectorError {
    pub field: &'static str,
    pub value: String,
    #[source]
    pub source: AddressError,
}

/// Parses every entry; the first malformed one fails the whole list.
pub fn parse_miner_addresses(raw: &[String]) -> Result<Vec<MinerAddress>, AddressSelectorError> {
    parse_list("MinerAddresses", raw).map(|list| list.into_iter().map(MinerAddress).collect())
}

fn parse_list(field: &'static str, raw: &[String]) -> Result<Vec<Address>, AddressSelectorError> {
    raw.iter()
        .map(|value| {
            value
                .parse()
                .map_err(|source| AddressSelectorError {
                    field,
                    value: value.clone(),
                    source,
                })
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressUse {
    PreCommit,
    Commit,
    Terminate,
}

/// Control addresses to send messages from, per use.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddressSelector {
    pre_commit: Vec<Address>,
    commit: Vec<Address>,
    terminate: Vec<Address>,
    disable_owner_fallback: bool,
    disable_worker_fallback: bool,
}

impl AddressSelector {
    pub fn from_config(config: &AddressesConfig) -> Result<Self, AddressSelectorError> {
        Ok(Self {
            pre_commit: parse_list("PreCommitControl", &config.pre_commit_control)?,
            commit: parse_list("CommitControl", &config.commit_control)?,
            terminate: parse_list("TerminateControl", &config.terminate_control)?,
            disable_owner_fallback: config.disable_owner_fallback,
            disable_worker_fallback: config.disable_worker_fallback,
        })
    }

    pub fn candidates(&self, purpose: AddressUse) -> &[Address] {
        match purpose {
            AddressUse::PreCommit => &self.pre_commit,
            AddressUse::Commit => &self.commit,
            AddressUse::Terminate => &self.terminate,
        }
    }

    pub fn owner_fallback(&self) -> bool {
        !self.disable_owner_fallback
    }

    pub fn worker_fallback(&self) -> bool {
        !self.disable_worker_fallback
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECP: &str = "f15ihq5ibzwki2b4ep2f46avlkrqzhpqgtga7pdrq";
    const BLS: &str = "t3vvmn62lofvhjd2ugzca6sof2j2ubwok6cj4xxbfzz4yuxfkgobpihhd2thlanmsh3w2ptld2gqkn2jvlss4a";
    const ACTOR: &str = "t24vg6ut43yw2h2jqydgbg2xq7x6f4kub3bg6as6i";
    const DELEGATED: &str = "f410faebagbafaydqqcikbmga2dqpcaireeyumdtfc4y";

    fn strings(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parses_id_addresses() {
        let addr: Address = "f01000".parse().expect("id address");
        assert_eq!(addr.network(), Network::Mainnet);
        assert_eq!(addr.protocol(), Protocol::Id);
        assert_eq!(addr.id(), Some(1000));
        assert_eq!(addr.to_string(), "f01000");
        assert_eq!(Address::new_id(Network::Testnet, 7).to_string(), "t07");
    }

    #[test]
    fn parses_key_addresses() {
        let secp: Address = SECP.parse().expect("secp address");
        assert_eq!(secp.protocol(), Protocol::Secp256k1);
        assert_eq!(secp.to_string(), SECP);

        let bls: Address = BLS.parse().expect("bls address");
        assert_eq!(bls.protocol(), Protocol::Bls);
        assert_eq!(bls.network(), Network::Testnet);

        let actor: Address = ACTOR.parse().expect("actor address");
        assert_eq!(actor.protocol(), Protocol::Actor);
    }

    #[test]
    fn parses_delegated_addresses() {
        let addr: Address = DELEGATED.parse().expect("delegated address");
        assert_eq!(addr.protocol(), Protocol::Delegated);
        assert_eq!(addr.to_string(), DELEGATED);
    }

    #[test]
    fn rejects_checksum_mismatches() {
        let well_formed = format!("f1{}", "a".repeat(KEY_HASH_ENCODED_LEN));
        assert_eq!(
            well_formed.parse::<Address>(),
            Err(AddressError::InvalidChecksum)
        );
        assert_eq!(
            SECP.replace("ihq5", "ihq6").parse::<Address>(),
            Err(AddressError::InvalidChecksum)
        );
        assert_eq!(
            DELEGATED.replace("aebag", "aebah").parse::<Address>(),
            Err(AddressError::InvalidChecksum)
        );
        assert_eq!(
            "f410fabcdefgh".parse::<Address>(),
            Err(AddressError::InvalidChecksum)
        );
    }

    #[test]
    fn id_payload_must_be_plain_digits() {
        for raw in ["f0+1000", "f0 1000", "f0-1", "f4+10f"] {
            assert!(
                matches!(raw.parse::<Address>(), Err(AddressError::InvalidId(_))),
                "{raw} should be rejected"
            );
        }
    }

    #[test]
    fn rejects_malformed_addresses() {
        assert_eq!("f".parse::<Address>(), Err(AddressError::TooShort));
        assert_eq!("f0".parse::<Address>(), Err(AddressError::TooShort));
        assert_eq!(
            "x01000".parse::<Address>(),
            Err(AddressError::UnknownNetwork('x'))
        );
        assert_eq!(
            "f91000".parse::<Address>(),
            Err(AddressError::UnknownProtocol('9'))
        );
        assert!(matches!(
            "f0010".parse::<Address>(),
            Err(AddressError::InvalidId(_))
        ));
        assert!(matches!(
            "f0abc".parse::<Address>(),
            Err(AddressError::InvalidId(_))
        ));
        assert_eq!(
            "f1ABC".parse::<Address>(),
            Err(AddressError::InvalidPayload)
        );
        assert!(matches!(
            "f1abc".parse::<Address>(),
            Err(AddressError::InvalidLength { expected: 39, .. })
        ));
        assert!("not-an-address".parse::<Address>().is_err());
    }

    #[test]
    fn miner_list_keeps_order() {
        let parsed = parse_miner_addresses(&strings(&["f01000", "f01001"])).expect("list parses");
        let rendered: Vec<String> = parsed.iter().map(ToString::to_string).collect();
        assert_eq!(rendered, vec!["f01000", "f01001"]);
    }

    #[test]
    fn one_bad_miner_address_fails_the_list() {
        let err = parse_miner_addresses(&strings(&["f01000", "not-an-address"])).unwrap_err();
        assert_eq!(err.field, "MinerAddresses");
        assert_eq!(err.value, "not-an-address");
    }

    #[test]
    fn selector_reads_control_addresses() {
        let config = AddressesConfig {
            pre_commit_control: strings(&[SECP]),
            commit_control: strings(&["f01234"]),
            disable_owner_fallback: true,
            ..AddressesConfig::default()
        };
        let selector = AddressSelector::from_config(&config).expect("selector builds");
        assert_eq!(selector.candidates(AddressUse::PreCommit).len(), 1);
        assert_eq!(
            selector.candidates(AddressUse::Commit)[0].id(),
            Some(1234)
        );
        assert!(selector.candidates(AddressUse::Terminate).is_empty());
        assert!(!selector.owner_fallback());
        assert!(selector.worker_fallback());
    }

    #[test]
    fn selector_rejects_invalid_policy() {
        let config = AddressesConfig {
            terminate_control: strings(&["f0-1"]),
            ..AddressesConfig::default()
        };
        let err = AddressSelector::from_config(&config).unwrap_err();
        assert_eq!(err.field, "TerminateControl");
        assert!(err.to_string().contains("Addresses.TerminateControl"));
    }
}
