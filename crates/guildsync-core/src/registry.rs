//! Name-keyed registry of service integrations.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info};

use crate::{ServiceError, ServiceIntegration, ServiceResult};

/// Registered integrations, resolved by name from configuration.
#[derive(Default)]
pub struct ServiceRegistry {
    services: BTreeMap<String, Arc<dyn ServiceIntegration>>,
}

impl std::fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceRegistry")
            .field("services", &self.services.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ServiceRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an integration under its own name.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::DuplicateService`] if the name is taken.
    pub fn register(&mut self, service: Arc<dyn ServiceIntegration>) -> ServiceResult<()> {
        let name = service.name().to_string();
        if self.services.contains_key(&name) {
            return Err(ServiceError::DuplicateService(name));
        }
        info!(service = %name, "Registered service integration");
        self.services.insert(name, service);
        Ok(())
    }

    /// Look up an integration.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn ServiceIntegration>> {
        self.services.get(name).cloned()
    }

    /// Registered names in sorted order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.services.keys().map(String::as_str).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.services.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// Resolve the integrations enabled by configuration, in the given order.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::UnknownService`] for the first name that is not
    /// registered.
    pub fn resolve<S: AsRef<str>>(
        &self,
        enabled: &[S],
    ) -> ServiceResult<Vec<Arc<dyn ServiceIntegration>>> {
        enabled
            .iter()
            .map(|name| {
                let name = name.as_ref();
                debug!(service = name, "Resolving service integration");
                self.get(name)
                    .ok_or_else(|| ServiceError::UnknownService(name.to_string()))
            })
            .collect()
    }
}
