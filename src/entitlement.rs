use crate::error::PersistenceError;
use crate::store::{KeyValueStore, IS_PAID_KEY};

/// Source of the premium flag. Premium unlocks reverb, doubler width and
/// saturation.
pub trait EntitlementProvider {
    fn is_paid(&self) -> bool;
    /// Record a confirmed upgrade. The flag flips even if persisting it fails.
    fn on_upgrade_confirmed(&mut self) -> Result<(), PersistenceError>;
}

/// Flag kept in a [`KeyValueStore`] as the string `"true"`.
pub struct StoredEntitlement<S: KeyValueStore> {
    store: S,
    paid: bool,
}

impl<S: KeyValueStore> StoredEntitlement<S> {
    pub fn load(store: S) -> Self {
        let paid = match store.get(IS_PAID_KEY) {
            Ok(v) => v.as_deref() == Some("true"),
            Err(e) => {
                log::warn!("could not read entitlement: {e}");
                false
            }
        };
        Self { store, paid }
    }
}

impl<S: KeyValueStore> EntitlementProvider for StoredEntitlement<S> {
    fn is_paid(&self) -> bool {
        self.paid
    }

    fn on_upgrade_confirmed(&mut self) -> Result<(), PersistenceError> {
        self.paid = true;
        log::info!("premium unlocked");
        self.store.set(IS_PAID_KEY, "true")
    }
}

/// Outcome of a checkout, as reported by the redirect back into the app.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectMarker {
    PaymentSuccess,
    PaymentCancel,
}

impl RedirectMarker {
    /// Look for `payment_success` / `payment_cancel` with a non-empty value in
    /// the query of `url`. Success wins when both are present.
    pub fn from_url(url: &str) -> Option<Self> {
        let query = url.split_once('?')?.1;
        let query = query.split('#').next().unwrap_or_default();
        let flagged = |key: &str| {
            query
                .split('&')
                .filter_map(|pair| pair.split_once('='))
                .any(|(k, v)| k == key && !v.is_empty())
        };
        if flagged("payment_success") {
            Some(Self::PaymentSuccess)
        } else if flagged("payment_cancel") {
            Some(Self::PaymentCancel)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use std::sync::Arc;

    #[test]
    fn test_redirect_markers() {
        assert_eq!(
            RedirectMarker::from_url("https://booth.app/?payment_success=true"),
            Some(RedirectMarker::PaymentSuccess)
        );
        assert_eq!(
            RedirectMarker::from_url("https://booth.app/?a=1&payment_cancel=true#top"),
            Some(RedirectMarker::PaymentCancel)
        );
        assert_eq!(RedirectMarker::from_url("https://booth.app/?payment_success="), None);
        assert_eq!(RedirectMarker::from_url("https://booth.app/payment_success=true"), None);
        assert_eq!(RedirectMarker::from_url("https://booth.app/"), None);
    }

    #[test]
    fn test_upgrade_persists_flag() {
        let store = Arc::new(MemoryStore::new());
        let mut ent = StoredEntitlement::load(store.clone());
        assert!(!ent.is_paid());
        ent.on_upgrade_confirmed().unwrap();
        assert!(ent.is_paid());
        assert!(StoredEntitlement::load(store).is_paid());
    }

    #[test]
    fn test_upgrade_survives_failed_write() {
        let store = Arc::new(MemoryStore::new());
        store.set_fail_writes(true);
        let mut ent = StoredEntitlement::load(store.clone());
        assert!(ent.on_upgrade_confirmed().is_err());
        assert!(ent.is_paid(), "flag set for this run");
        assert!(!StoredEntitlement::load(store).is_paid());
    }
}
