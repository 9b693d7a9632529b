use std::collections::HashMap;
use std::sync::Arc;

use visiongate_protocol::ProviderKind;

use crate::VisionProvider;

#[derive(Default, Clone)]
pub struct ProviderRegistry {
    providers: HashMap<ProviderKind, Arc<dyn VisionProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, provider: Arc<dyn VisionProvider>) {
        self.providers.insert(provider.kind(), provider);
    }

    pub fn get(&self, kind: ProviderKind) -> Option<Arc<dyn VisionProvider>> {
        self.providers.get(&kind).cloned()
    }
}
