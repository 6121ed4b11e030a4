//! Trigger information: the miner's secrets and randomness for a block.

use crate::behaviour::Behaviour;
use crate::command::ConsensusCommand;
use crate::error::ConsensusResult;
use crate::wire::TriggerInformation;
use dposcore_core::Signer;
use dposcore_types::Hash;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Default)]
struct SecretCache {
    /// Secret committed by the last value-publishing block
    last_in_value: Option<Hash>,
    /// Hash of the last random number handed out
    previous_random_hash: Hash,
}

/// Builds [`TriggerInformation`] for the local miner.
///
/// Each value-publishing block commits to a fresh secret derived from the
/// signature over its arranged mining time; the secret of the previous one
/// is revealed alongside it.
pub struct TriggerInformationProvider {
    signer: Arc<dyn Signer>,
    cache: Mutex<SecretCache>,
}

impl TriggerInformationProvider {
    /// Creates a provider around the node's signer.
    pub fn new(signer: Arc<dyn Signer>) -> Self {
        Self {
            signer,
            cache: Mutex::new(SecretCache::default()),
        }
    }

    /// Hex public key of the local miner.
    pub fn pubkey(&self) -> String {
        self.signer.public_key().to_hex()
    }

    /// Trigger information for producing a block under `command`.
    pub fn get_trigger_information(
        &self,
        command: &ConsensusCommand,
    ) -> ConsensusResult<TriggerInformation> {
        let pubkey = self.pubkey();
        let behaviour = command.hint;

        let info = match behaviour {
            Behaviour::UpdateValue | Behaviour::UpdateValueWithoutPreviousInValue => {
                let message = command.arranged_mining_time.as_millis().to_be_bytes();
                let in_value = Hash::sha256(self.signer.sign(&message)?.as_bytes());
                let random_number = self.next_random_number()?;

                let mut cache = self.cache.lock();
                let previous_in_value = match behaviour {
                    Behaviour::UpdateValue => cache.last_in_value,
                    _ => None,
                };
                cache.last_in_value = Some(in_value);

                TriggerInformation {
                    pubkey,
                    behaviour,
                    in_value: Some(in_value),
                    previous_in_value,
                    random_number,
                }
            }
            Behaviour::NextRound | Behaviour::NextTerm => TriggerInformation {
                pubkey,
                behaviour,
                random_number: self.next_random_number()?,
                ..Default::default()
            },
            Behaviour::TinyBlock | Behaviour::Nothing => TriggerInformation {
                pubkey,
                behaviour,
                ..Default::default()
            },
        };

        debug!(
            pubkey = %info.pubkey,
            behaviour = %info.behaviour,
            reveals = info.previous_in_value.is_some(),
            "Built trigger information"
        );
        Ok(info)
    }

    /// Signs the previous random hash and chains to the result under one
    /// lock, so each caller gets a distinct number.
    fn next_random_number(&self) -> ConsensusResult<Vec<u8>> {
        let mut cache = self.cache.lock();
        let random_number = self
            .signer
            .sign(cache.previous_random_hash.as_bytes())?
            .as_bytes()
            .to_vec();
        cache.previous_random_hash = Hash::sha256(&random_number);
        Ok(random_number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConsensusError;
    use dposcore_core::memory::DeterministicSigner;
    use dposcore_core::{CryptoError, CryptoResult, PublicKey, Signature};
    use dposcore_types::Timestamp;
    use std::collections::HashSet;

    fn command(hint: Behaviour, arranged: u64) -> ConsensusCommand {
        ConsensusCommand {
            hint,
            arranged_mining_time: Timestamp::from_millis(arranged),
            mining_due_time: Timestamp::from_millis(arranged + 4000),
            limit_ms_of_mining_block: 300,
        }
    }

    fn provider() -> TriggerInformationProvider {
        TriggerInformationProvider::new(Arc::new(DeterministicSigner::from_seed(b"miner")))
    }

    #[test]
    fn test_reveals_previous_secret() {
        let provider = provider();
        let first = provider
            .get_trigger_information(&command(Behaviour::UpdateValueWithoutPreviousInValue, 4000))
            .unwrap();
        assert!(first.in_value.is_some());
        assert!(first.previous_in_value.is_none());

        let second = provider
            .get_trigger_information(&command(Behaviour::UpdateValue, 24_000))
            .unwrap();
        assert_eq!(second.previous_in_value, first.in_value);
        assert_ne!(second.in_value, first.in_value);
    }

    #[test]
    fn test_tiny_block_carries_no_secrets() {
        let provider = provider();
        let info = provider
            .get_trigger_information(&command(Behaviour::TinyBlock, 4000))
            .unwrap();
        assert_eq!(info.pubkey, provider.pubkey());
        assert!(info.in_value.is_none());
        assert!(info.random_number.is_empty());
    }

    #[test]
    fn test_random_number_chains() {
        let provider = provider();
        let a = provider
            .get_trigger_information(&command(Behaviour::NextRound, 4000))
            .unwrap();
        let b = provider
            .get_trigger_information(&command(Behaviour::NextRound, 4000))
            .unwrap();
        assert!(!a.random_number.is_empty());
        assert_ne!(a.random_number, b.random_number);
    }

    #[test]
    fn test_concurrent_callers_get_distinct_random_numbers() {
        let provider = provider();
        let numbers: Vec<Vec<u8>> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    scope.spawn(|| {
                        (0..16)
                            .map(|_| {
                                provider
                                    .get_trigger_information(&command(Behaviour::NextRound, 4000))
                                    .unwrap()
                                    .random_number
                            })
                            .collect::<Vec<_>>()
                    })
                })
                .collect();
            handles
                .into_iter()
                .flat_map(|handle| handle.join().unwrap())
                .collect()
        });

        let distinct: HashSet<&Vec<u8>> = numbers.iter().collect();
        assert_eq!(distinct.len(), numbers.len());
    }

    struct FailingSigner;

    impl Signer for FailingSigner {
        fn sign(&self, _message: &[u8]) -> CryptoResult<Signature> {
            Err(CryptoError::Internal("key unavailable".into()))
        }

        fn public_key(&self) -> PublicKey {
            PublicKey::from_bytes(vec![0x04, 0x01])
        }
    }

    #[test]
    fn test_signer_failure_is_reported() {
        let provider = TriggerInformationProvider::new(Arc::new(FailingSigner));
        let result = provider.get_trigger_information(&command(Behaviour::UpdateValue, 4000));
        assert!(matches!(result, Err(ConsensusError::Crypto(CryptoError::Internal(_)))));

        // Blocks that need no signature are unaffected.
        assert!(provider
            .get_trigger_information(&command(Behaviour::TinyBlock, 4000))
            .is_ok());
    }
}
