use std::collections::HashMap;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::block::{Block, BlockMode};
use crate::doh::Doh;
use crate::prelude::Resolver;
use crate::static_ip::{StaticIpv4, StaticIpv6};
use crate::udp::Udp;

/// Process-wide cache of constructed resolver instances, keyed by the
/// upstream specification that produced them, so HTTP clients and sockets
/// are amortized across rules sharing the same upstream.
#[derive(Debug, Default)]
pub struct ResolverRegistry {
    resolvers: Mutex<HashMap<String, Arc<dyn Resolver>>>,
}

impl ResolverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn block(&self, mode: BlockMode) -> Arc<dyn Resolver> {
        let key = format!("block:{mode:?}");
        self.get_or_insert(key, || Arc::new(Block::new(mode)))
            .await
    }

    pub async fn ipv4(&self, addr: Ipv4Addr) -> Arc<dyn Resolver> {
        let key = format!("ipv4:{addr}");
        self.get_or_insert(key, || Arc::new(StaticIpv4::new(addr)))
            .await
    }

    pub async fn ipv6(&self, addr: Ipv6Addr) -> Arc<dyn Resolver> {
        let key = format!("ipv6:{addr}");
        self.get_or_insert(key, || Arc::new(StaticIpv6::new(addr)))
            .await
    }

    pub async fn udp(&self, server: SocketAddr) -> Arc<dyn Resolver> {
        let key = format!("udp:{server}");
        self.get_or_insert(key, || Arc::new(Udp::new(server))).await
    }

    pub async fn doh(&self, url: &str, proxy: Option<&str>) -> Result<Arc<dyn Resolver>, String> {
        let key = format!("doh:{url}|{}", proxy.unwrap_or(""));
        {
            let resolvers = self.resolvers.lock().await;
            if let Some(found) = resolvers.get(&key) {
                return Ok(found.clone());
            }
        }
        let resolver: Arc<dyn Resolver> = Arc::new(Doh::new(url.to_string(), proxy.map(str::to_string))?);
        let mut resolvers = self.resolvers.lock().await;
        Ok(resolvers.entry(key).or_insert(resolver).clone())
    }

    async fn get_or_insert(
        &self,
        key: String,
        build: impl FnOnce() -> Arc<dyn Resolver>,
    ) -> Arc<dyn Resolver> {
        let mut resolvers = self.resolvers.lock().await;
        resolvers.entry(key).or_insert_with(build).clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reuses_the_same_instance_for_the_same_key() {
        let registry = ResolverRegistry::new();
        let first = registry.ipv4(Ipv4Addr::new(1, 1, 1, 1)).await;
        let second = registry.ipv4(Ipv4Addr::new(1, 1, 1, 1)).await;
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn distinct_keys_build_distinct_instances() {
        let registry = ResolverRegistry::new();
        let a = registry.ipv4(Ipv4Addr::new(1, 1, 1, 1)).await;
        let b = registry.ipv4(Ipv4Addr::new(2, 2, 2, 2)).await;
        assert!(!Arc::ptr_eq(&a, &b));
    }
}
