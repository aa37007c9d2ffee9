//! Product catalog lookups for order snapshots.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::ProductUuid;
use common::services::PRODUCT_SERVICE;
use domain::ProductSnapshot;
use rpc::{RpcError, ServiceClient};
use serde_json::Value;

use super::unreachable_peer;

#[async_trait]
pub trait ProductCatalog: Send + Sync {
    /// Looks up display details of a product. `Ok(None)` means the catalog
    /// does not know it.
    async fn lookup(&self, product_uuid: ProductUuid) -> Result<Option<ProductSnapshot>, RpcError>;
}

/// Product catalog over HTTP.
#[derive(Clone)]
pub struct HttpProductCatalog {
    client: ServiceClient,
}

impl HttpProductCatalog {
    pub fn new(client: ServiceClient) -> Self {
        Self { client }
    }
}

/// Reads name and image from a product payload, accepting the alternative
/// field names some catalogs use.
fn snapshot_from(data: &Value) -> Option<ProductSnapshot> {
    let field = |names: &[&str]| {
        names
            .iter()
            .find_map(|name| data.get(*name).and_then(Value::as_str))
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };
    let name = field(&["name", "title"])?;
    Some(ProductSnapshot {
        name,
        image: field(&["image", "thumbnail"]),
    })
}

#[async_trait]
impl ProductCatalog for HttpProductCatalog {
    async fn lookup(&self, product_uuid: ProductUuid) -> Result<Option<ProductSnapshot>, RpcError> {
        match self
            .client
            .get(PRODUCT_SERVICE, &format!("/api/products/{product_uuid}"))
            .await
        {
            Ok(response) => {
                let data = rpc::unwrap_data(PRODUCT_SERVICE, response)?;
                Ok(snapshot_from(&data))
            }
            Err(e) if e.status() == Some(404) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[derive(Debug, Default)]
struct InMemoryCatalogState {
    products: HashMap<ProductUuid, ProductSnapshot>,
    unreachable: bool,
}

/// In-memory product catalog for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryProductCatalog {
    state: Arc<RwLock<InMemoryCatalogState>>,
}

impl InMemoryProductCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, product_uuid: ProductUuid, snapshot: ProductSnapshot) {
        self.state
            .write()
            .unwrap()
            .products
            .insert(product_uuid, snapshot);
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.state.write().unwrap().unreachable = unreachable;
    }
}

#[async_trait]
impl ProductCatalog for InMemoryProductCatalog {
    async fn lookup(&self, product_uuid: ProductUuid) -> Result<Option<ProductSnapshot>, RpcError> {
        let state = self.state.read().unwrap();
        if state.unreachable {
            return Err(unreachable_peer(PRODUCT_SERVICE));
        }
        Ok(state.products.get(&product_uuid).cloned())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn snapshot_prefers_name_and_image() {
        let snapshot = snapshot_from(&json!({"name": "Mug", "title": "Cup", "image": "m.png"})).unwrap();
        assert_eq!(snapshot.name, "Mug");
        assert_eq!(snapshot.image.as_deref(), Some("m.png"));
    }

    #[test]
    fn snapshot_falls_back_to_title_and_thumbnail() {
        let snapshot = snapshot_from(&json!({"title": "Cup", "thumbnail": "c.png"})).unwrap();
        assert_eq!(snapshot.name, "Cup");
        assert_eq!(snapshot.image.as_deref(), Some("c.png"));
    }

    #[test]
    fn nameless_payload_has_no_snapshot() {
        assert!(snapshot_from(&json!({"price": "1.00"})).is_none());
    }
}
