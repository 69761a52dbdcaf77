//! Loading a caller's subscriptions from the resource service.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use chainstream_core::error::StreamError;
use chainstream_core::event::{Subscription, UserSubscriptions};
use chainstream_core::registry::ProviderRegistry;

use crate::client::{JournalSearch, Resource};

/// Where a caller's subscriptions come from.
#[async_trait]
pub trait SubscriptionSource: Send + Sync {
    /// All subscriptions visible to the bearer `token`.
    async fn subscriptions(&self, token: &str) -> Result<UserSubscriptions, StreamError>;
}

/// `resource_data` of a stored subscription.
#[derive(Debug, Deserialize)]
struct SubscriptionData {
    subscription_type_id: String,
    address: String,
    #[serde(default)]
    label: Option<String>,
    #[serde(default)]
    color: Option<String>,
    #[serde(default)]
    abi: Option<serde_json::Value>,
}

fn to_subscription(resource: Resource) -> Result<Subscription, serde_json::Error> {
    let data: SubscriptionData = serde_json::from_value(resource.resource_data)?;
    Ok(Subscription {
        id: resource.id,
        subscription_type_id: data.subscription_type_id,
        address: data.address,
        label: data.label,
        color: data.color,
        abi: data.abi.is_some_and(|abi| !abi.is_null()),
    })
}

/// Subscriptions stored as `type=subscription` resources.
pub struct ResourceSubscriptions {
    client: Arc<dyn JournalSearch>,
    registry: Option<Arc<ProviderRegistry>>,
}

impl ResourceSubscriptions {
    pub fn new(client: Arc<dyn JournalSearch>) -> Self {
        Self {
            client,
            registry: None,
        }
    }

    /// Drop subscriptions no provider in `registry` accepts.
    pub fn with_registry(mut self, registry: Arc<ProviderRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }
}

#[async_trait]
impl SubscriptionSource for ResourceSubscriptions {
    async fn subscriptions(&self, token: &str) -> Result<UserSubscriptions, StreamError> {
        let resources = self
            .client
            .list_resources(token, &[("type", "subscription")])
            .await?;

        let mut subscriptions = UserSubscriptions::new();
        for resource in resources {
            let id = resource.id.clone();
            match to_subscription(resource) {
                Ok(sub) => subscriptions.insert(sub),
                Err(e) => warn!(id, error = %e, "skipping malformed subscription resource"),
            }
        }

        if let Some(registry) = &self.registry {
            registry.retain_valid(&mut subscriptions);
        }
        debug!(count = subscriptions.len(), "loaded subscriptions");
        Ok(subscriptions)
    }
}

/// A fixed set of subscriptions, whatever the token.
#[derive(Debug, Clone, Default)]
pub struct StaticSubscriptions {
    subscriptions: UserSubscriptions,
}

impl StaticSubscriptions {
    pub fn new(subscriptions: UserSubscriptions) -> Self {
        Self { subscriptions }
    }
}

#[async_trait]
impl SubscriptionSource for StaticSubscriptions {
    async fn subscriptions(&self, _token: &str) -> Result<UserSubscriptions, StreamError> {
        Ok(self.subscriptions.clone())
    }
}
