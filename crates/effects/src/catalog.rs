use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::builtin::builtin_effects;
use crate::descriptor::EffectDescriptor;
use crate::error::{CatalogError, ValidationError};

/// Ordered registry of effects. Insertion order drives next/previous cycling.
#[derive(Debug, Clone, Default)]
pub struct EffectCatalog {
    entries: Vec<Arc<EffectDescriptor>>,
}

impl EffectCatalog {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Catalog pre-populated with the shipped effects.
    pub fn builtin() -> Self {
        let mut catalog = Self::empty();
        for descriptor in builtin_effects() {
            if let Err(err) = catalog.add_custom(descriptor) {
                tracing::error!(error = %err, "built-in effect rejected");
            }
        }
        catalog
    }

    pub fn list(&self) -> &[Arc<EffectDescriptor>] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.position(id).is_some()
    }

    pub fn get(&self, id: &str) -> Result<&Arc<EffectDescriptor>, CatalogError> {
        self.entries
            .iter()
            .find(|entry| entry.id() == id)
            .ok_or_else(|| CatalogError::NotFound(id.to_string()))
    }

    pub fn first(&self) -> Option<&Arc<EffectDescriptor>> {
        self.entries.first()
    }

    /// Registers a descriptor. Rejected descriptors leave the catalog unchanged.
    pub fn add_custom(&mut self, descriptor: EffectDescriptor) -> Result<(), ValidationError> {
        descriptor.validate()?;
        if self.contains(descriptor.id()) {
            return Err(ValidationError::DuplicateId(descriptor.id().to_string()));
        }
        tracing::debug!(id = descriptor.id(), name = descriptor.name(), "registered effect");
        self.entries.push(Arc::new(descriptor));
        Ok(())
    }

    /// Builds a descriptor with a generated `custom_<millis>` id and registers it.
    pub fn create_custom<I, K>(
        &mut self,
        name: &str,
        shader_source: &str,
        parameters: I,
    ) -> Result<Arc<EffectDescriptor>, ValidationError>
    where
        I: IntoIterator<Item = (K, f32)>,
        K: Into<String>,
    {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis())
            .unwrap_or_default();
        let base = format!("custom_{millis}");
        let mut id = base.clone();
        let mut suffix = 1;
        while self.contains(&id) {
            id = format!("{base}_{suffix}");
            suffix += 1;
        }

        let descriptor =
            EffectDescriptor::new(id.as_str(), name, shader_source).with_parameters(parameters);
        self.add_custom(descriptor)?;
        let created = self.get(&id).map_err(|_| ValidationError::EmptyId)?;
        Ok(Arc::clone(created))
    }

    pub fn remove(&mut self, id: &str) -> Result<Arc<EffectDescriptor>, CatalogError> {
        let index = self
            .position(id)
            .ok_or_else(|| CatalogError::NotFound(id.to_string()))?;
        Ok(self.entries.remove(index))
    }

    /// Entry after `id`, wrapping to the start. Unknown ids yield the first entry.
    pub fn next_after(&self, id: &str) -> Option<&Arc<EffectDescriptor>> {
        match self.position(id) {
            Some(index) => self.entries.get((index + 1) % self.entries.len()),
            None => self.entries.first(),
        }
    }

    /// Entry before `id`, wrapping to the end. Unknown ids yield the first entry.
    pub fn previous_before(&self, id: &str) -> Option<&Arc<EffectDescriptor>> {
        match self.position(id) {
            Some(index) => {
                let len = self.entries.len();
                self.entries.get((index + len - 1) % len)
            }
            None => self.entries.first(),
        }
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.entries.iter().position(|entry| entry.id() == id)
    }
}
