use std::sync::Arc;

use visiongate_provider_core::ProviderRegistry;

use crate::{OpenRouterProvider, ZhipuProvider};

pub fn register_builtin_providers(registry: &mut ProviderRegistry) {
    registry.register(Arc::new(ZhipuProvider::new()));
    registry.register(Arc::new(OpenRouterProvider::new()));
}

pub fn build_registry() -> ProviderRegistry {
    let mut registry = ProviderRegistry::new();
    register_builtin_providers(&mut registry);
    registry
}
