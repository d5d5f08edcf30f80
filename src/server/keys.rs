//! The ledger of generated keys.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use log::{debug, info};
use uuid::Uuid;
use crate::api::kmip::{ClusterId, CryptoKeyId};
use crate::commons::KmipResult;
use crate::commons::error::Error;
use super::effective_limit;
use super::registry::ProviderRegistry;


//------------ KeyLedger -----------------------------------------------------

/// Keeps track of which provider issued which key.
///
/// No key material is involved: generating a key only hands out a fresh
/// identifier and remembers the provider it was generated against. Keys
/// are never removed.
///
/// The ledger consults the [`ProviderRegistry`] to find the provider to
/// generate a key with, but never changes it.
#[derive(Debug)]
pub struct KeyLedger {
    registry: Arc<ProviderRegistry>,
    keys: RwLock<HashMap<String, ClusterId>>,
}

impl KeyLedger {
    pub fn new(registry: Arc<ProviderRegistry>) -> Self {
        KeyLedger {
            registry,
            keys: RwLock::new(HashMap::new()),
        }
    }

    /// Generates a new key.
    ///
    /// The key is generated with the given provider or, if none is given,
    /// with the global default provider. Keys cannot be generated with
    /// native providers.
    pub fn generate_key(
        &self, cluster_id: Option<&ClusterId>
    ) -> KmipResult<CryptoKeyId> {
        // The key is recorded while the provider is still registered as
        // resolved.
        self.registry.with_provider(cluster_id, |provider| {
            if provider.management_type.is_native() {
                return Err(Error::NativeProviderUnsupported(
                    provider.cluster_id.clone()
                ))
            }

            let key_id = Uuid::new_v4().to_string();
            self.keys.write().unwrap().insert(
                key_id.clone(), provider.cluster_id.clone()
            );
            info!(
                "Generated key '{}' with provider '{}'",
                key_id, provider.cluster_id
            );

            Ok(CryptoKeyId {
                key_id,
                provider_id: provider.cluster_id.clone(),
            })
        })
    }

    /// Returns up to `limit` keys in no particular order.
    ///
    /// A missing, negative, or too large limit returns all keys.
    pub fn list_keys(&self, limit: Option<i32>) -> Vec<CryptoKeyId> {
        let keys = self.keys.read().unwrap();
        let len = effective_limit(limit, keys.len());
        debug!("Listing {} of {} key(s)", len, keys.len());
        keys.iter().take(len).map(|(key_id, provider_id)| {
            CryptoKeyId {
                key_id: key_id.clone(),
                provider_id: provider_id.clone(),
            }
        }).collect()
    }

    /// Returns the provider that issued a key.
    pub fn key_provider(&self, key_id: &str) -> Option<ClusterId> {
        self.keys.read().unwrap().get(key_id).cloned()
    }

    pub fn is_valid_key(&self, key_id: &str) -> bool {
        self.list_keys(None).iter().any(|key| key.key_id == key_id)
    }
}


//============ Tests =========================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::kmip::ManagementType;
    use crate::commons::error::ErrorKind;
    use crate::test::cluster;

    fn ledger() -> KeyLedger {
        let registry = Arc::new(ProviderRegistry::new());
        registry.register_cluster(
            cluster("pA"), ManagementType::from("KmsServer")
        ).unwrap();
        registry.register_cluster(
            cluster("native"), ManagementType::NativeProvider
        ).unwrap();
        KeyLedger::new(registry)
    }

    #[test]
    fn generate_with_explicit_provider() {
        let ledger = ledger();
        let key = ledger.generate_key(Some(&cluster("pA"))).unwrap();
        assert_eq!(key.provider_id, cluster("pA"));
        assert!(ledger.is_valid_key(&key.key_id));
        assert_eq!(ledger.key_provider(&key.key_id), Some(cluster("pA")));

        let listed: Vec<_> = ledger.list_keys(None).into_iter()
            .filter(|k| k.key_id == key.key_id)
            .collect();
        assert_eq!(listed, [key]);
    }

    #[test]
    fn generate_needs_a_provider() {
        let ledger = ledger();
        assert_eq!(
            ledger.generate_key(None).unwrap_err(),
            Error::NoDefaultProvider
        );
        assert_eq!(
            ledger.generate_key(Some(&cluster("pX"))).unwrap_err(),
            Error::NoDefaultProvider
        );
        assert!(ledger.list_keys(None).is_empty());
    }

    #[test]
    fn generate_refuses_native_provider() {
        let ledger = ledger();
        assert_eq!(
            ledger.generate_key(Some(&cluster("native"))).unwrap_err(),
            Error::NativeProviderUnsupported(cluster("native"))
        );
        ledger.registry.mark_default(&cluster("native")).unwrap();
        assert_eq!(
            ledger.generate_key(None).unwrap_err().kind(),
            ErrorKind::NativeProviderUnsupported
        );
        assert!(ledger.list_keys(None).is_empty());
    }

    #[test]
    fn keys_are_unique_and_limited() {
        let ledger = ledger();
        ledger.registry.mark_default(&cluster("pA")).unwrap();
        for _ in 0..5 {
            ledger.generate_key(None).unwrap();
        }
        let mut ids: Vec<_> = ledger.list_keys(None).into_iter()
            .map(|k| k.key_id)
            .collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 5);
        assert_eq!(ledger.list_keys(Some(3)).len(), 3);
        assert_eq!(ledger.list_keys(Some(-1)).len(), 5);
        assert_eq!(ledger.list_keys(Some(0)).len(), 0);
        assert!(!ledger.is_valid_key("no-such-key"));
    }
}
