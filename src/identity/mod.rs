//! Kiosk identity
//!
//! The backend attributes every check-in to a colaboradorID. The kiosk
//! holds exactly one, seeded from the environment and replaceable over
//! the API when the device is re-paired.

use std::sync::RwLock;

/// Read side of the stored identity
pub trait IdentityProvider: Send + Sync {
    /// Stored colaboradorID, if the kiosk is paired.
    fn current(&self) -> Option<String>;
}

pub struct StoredIdentity {
    colaborador_id: RwLock<Option<String>>,
}

impl StoredIdentity {
    pub fn new(colaborador_id: Option<String>) -> Self {
        Self {
            colaborador_id: RwLock::new(colaborador_id),
        }
    }

    /// Replace the stored identity.
    pub fn set(&self, colaborador_id: String) {
        if let Ok(mut guard) = self.colaborador_id.write() {
            tracing::info!(colaborador_id = %colaborador_id, "Kiosk identity updated");
            *guard = Some(colaborador_id);
        }
    }
}

impl IdentityProvider for StoredIdentity {
    fn current(&self) -> Option<String> {
        self.colaborador_id
            .read()
            .map(|guard| guard.clone())
            .unwrap_or(None)
    }
}
