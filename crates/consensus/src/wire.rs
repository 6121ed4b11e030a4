//! Wire payloads exchanged with the consensus contract and embedded in
//! block headers. All of them are RLP lists.
//!
//! | Payload | Fields |
//! |---------|--------|
//! | [`ConsensusHint`] | behaviour |
//! | [`TriggerInformation`] | pubkey, behaviour, in value, previous in value, random number |
//! | [`HeaderInformation`] | sender pubkey, behaviour, round |
//! | [`IrreversibleBlockFound`] | offset |
//!
//! Behaviour discriminants outside the known set decode as
//! [`Behaviour::Nothing`].

use crate::behaviour::Behaviour;
use crate::round::{append_optional_hash, optional_hash_at, Round};
use dposcore_types::Hash;
use rlp::{Decodable, DecoderError, Encodable, Rlp, RlpStream};
use serde::{Deserialize, Serialize};

/// Header extra-data key the consensus payload is stored under.
pub const CONSENSUS_EXTRA_DATA_KEY: &str = "Consensus";

/// Event name of the finality marker emitted by the consensus contract.
pub const IRREVERSIBLE_BLOCK_FOUND_EVENT: &str = "IrreversibleBlockFound";

fn behaviour_at(rlp: &Rlp<'_>, index: usize) -> Result<Behaviour, DecoderError> {
    let raw: u64 = rlp.val_at(index)?;
    Ok(u8::try_from(raw)
        .map(Behaviour::from_u8)
        .unwrap_or(Behaviour::Nothing))
}

/// Behaviour hint carried inside a consensus command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsensusHint {
    /// Behaviour to carry out
    pub behaviour: Behaviour,
}

impl ConsensusHint {
    /// Encodes the hint.
    pub fn to_bytes(&self) -> Vec<u8> {
        rlp::encode(self).to_vec()
    }

    /// Decodes a hint.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DecoderError> {
        rlp::decode(bytes)
    }
}

impl Encodable for ConsensusHint {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(1);
        s.append(&self.behaviour.as_u8());
    }
}

impl Decodable for ConsensusHint {
    fn decode(rlp: &Rlp<'_>) -> Result<Self, DecoderError> {
        if rlp.item_count()? != 1 {
            return Err(DecoderError::RlpIncorrectListLen);
        }
        Ok(Self {
            behaviour: behaviour_at(rlp, 0)?,
        })
    }
}

/// Payload handed to the consensus contract when producing a block.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TriggerInformation {
    /// Producing miner
    pub pubkey: String,
    /// Behaviour of the block
    pub behaviour: Behaviour,
    /// Secret committed to this round
    pub in_value: Option<Hash>,
    /// Secret committed to the previous round, now revealed
    pub previous_in_value: Option<Hash>,
    /// Signature over the previous random hash
    #[serde(default)]
    pub random_number: Vec<u8>,
}

impl TriggerInformation {
    /// Encodes the trigger information.
    pub fn to_bytes(&self) -> Vec<u8> {
        rlp::encode(self).to_vec()
    }

    /// Decodes trigger information.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DecoderError> {
        rlp::decode(bytes)
    }
}

impl Encodable for TriggerInformation {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(5);
        s.append(&self.pubkey);
        s.append(&self.behaviour.as_u8());
        append_optional_hash(s, &self.in_value);
        append_optional_hash(s, &self.previous_in_value);
        s.append(&self.random_number);
    }
}

impl Decodable for TriggerInformation {
    fn decode(rlp: &Rlp<'_>) -> Result<Self, DecoderError> {
        if rlp.item_count()? != 5 {
            return Err(DecoderError::RlpIncorrectListLen);
        }
        Ok(Self {
            pubkey: rlp.val_at(0)?,
            behaviour: behaviour_at(rlp, 1)?,
            in_value: optional_hash_at(rlp, 2)?,
            previous_in_value: optional_hash_at(rlp, 3)?,
            random_number: rlp.val_at(4)?,
        })
    }
}

/// Consensus payload stored in a block header's extra data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderInformation {
    /// Miner that produced the block
    pub sender_pubkey: String,
    /// Behaviour the block carried out
    pub behaviour: Behaviour,
    /// Round as it stands after the block
    pub round: Round,
}

impl HeaderInformation {
    /// Encodes the header information.
    pub fn to_bytes(&self) -> Vec<u8> {
        rlp::encode(self).to_vec()
    }

    /// Decodes header information.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DecoderError> {
        rlp::decode(bytes)
    }
}

impl Encodable for HeaderInformation {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(3);
        s.append(&self.sender_pubkey);
        s.append(&self.behaviour.as_u8());
        s.append(&self.round);
    }
}

impl Decodable for HeaderInformation {
    fn decode(rlp: &Rlp<'_>) -> Result<Self, DecoderError> {
        if rlp.item_count()? != 3 {
            return Err(DecoderError::RlpIncorrectListLen);
        }
        Ok(Self {
            sender_pubkey: rlp.val_at(0)?,
            behaviour: behaviour_at(rlp, 1)?,
            round: rlp.val_at(2)?,
        })
    }
}

/// Data of the finality marker log.
///
/// The irreversible candidate is `block height - offset`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IrreversibleBlockFound {
    /// Distance below the emitting block
    pub offset: u64,
}

impl IrreversibleBlockFound {
    /// Encodes the log data.
    pub fn to_bytes(&self) -> Vec<u8> {
        rlp::encode(self).to_vec()
    }

    /// Decodes the log data.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DecoderError> {
        rlp::decode(bytes)
    }
}

impl Encodable for IrreversibleBlockFound {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(1);
        s.append(&self.offset);
    }
}

impl Decodable for IrreversibleBlockFound {
    fn decode(rlp: &Rlp<'_>) -> Result<Self, DecoderError> {
        if rlp.item_count()? != 1 {
            return Err(DecoderError::RlpIncorrectListLen);
        }
        Ok(Self {
            offset: rlp.val_at(0)?,
        })
    }
}
