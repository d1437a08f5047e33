// SPDX-License-Identifier: MIT

//! Selects a connector by the service tag declared in its capabilities,
//! matching the worker's configured tag-to-backend mapping.

use std::collections::HashMap;
use std::sync::Arc;

use crate::connector::Connector;

#[derive(Default)]
pub struct ConnectorRegistry {
    by_service_tag: HashMap<String, Arc<dyn Connector>>,
}

impl ConnectorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, connector: Arc<dyn Connector>) {
        let tag = connector.capabilities().service_tag;
        self.by_service_tag.insert(tag, connector);
    }

    pub fn get(&self, service_tag: &str) -> Option<Arc<dyn Connector>> {
        self.by_service_tag.get(service_tag).cloned()
    }

    pub fn service_tags(&self) -> Vec<String> {
        self.by_service_tag.keys().cloned().collect()
    }
}
