use futures::future::BoxFuture;
use tracing::debug;

use loomflow_core::error::Result;
use loomflow_core::flow::{NodeKind, DATA_PORT};

use crate::api::FlowApi;
use crate::protocol::{NodeHandler, NodeInvocation, NodeOutput};

/// Memoizes its upstream `data` input per node identity.
///
/// A hit never pulls upstream — skipping that work is the point. `ttl` is in
/// seconds; `ttl <= 0` disables caching entirely (always miss, never
/// writes). An `invalidate` watermark (epoch ms) treats any older entry as a
/// miss. Context always passes through unmodified.
pub struct CacheNode;

impl NodeHandler for CacheNode {
    fn kind(&self) -> NodeKind {
        NodeKind::Cache
    }

    fn execute<'a>(
        &'a self,
        api: &'a FlowApi,
        invocation: NodeInvocation,
    ) -> BoxFuture<'a, Result<NodeOutput>> {
        Box::pin(async move {
            let ttl_secs = invocation
                .config
                .get("ttl")
                .and_then(|v| v.as_f64())
                .unwrap_or(0.0);
            let ttl_ms = (ttl_secs * 1000.0) as i64;
            let invalidate_ms = invocation.config.get("invalidate").and_then(|v| v.as_i64());

            if ttl_ms > 0 {
                if let Some(hit) = api.cache_lookup(ttl_ms, invalidate_ms).await {
                    debug!(node_id = %invocation.node_id, "Cache hit");
                    return Ok(NodeOutput::success().with_data(hit).with_cached(true));
                }
            }

            let value = match invocation.pushed.data() {
                Some(value) => value,
                None => invocation.inputs.pull(DATA_PORT).await?,
            };
            if ttl_ms > 0 {
                api.cache_store(value.clone()).await;
            }
            debug!(node_id = %invocation.node_id, "Cache miss");
            Ok(NodeOutput::success().with_data(value).with_cached(false))
        })
    }
}
