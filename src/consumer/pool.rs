use futures_util::future::join_all;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use crate::aggregation::OrderProcessor;
use crate::messaging::{MessageSource, MessagingError};
use super::worker::{ConsumptionLoop, WorkerContext, WorkerError};

/// N independent consumption loops sharing one processor (and through it one
/// aggregate store). There is no lock across workers.
pub struct WorkerPool {
    shutdown: watch::Sender<bool>,
    handles: Vec<JoinHandle<Result<(), WorkerError>>>,
}

impl WorkerPool {
    /// Start `count` workers, each with its own source from `make_source`.
    pub fn spawn<S, P, F>(
        count: usize,
        mut make_source: F,
        ctx: WorkerContext<P>,
    ) -> Result<Self, MessagingError>
    where
        S: MessageSource + Sync + 'static,
        P: OrderProcessor + 'static,
        F: FnMut(usize) -> Result<S, MessagingError>,
    {
        let (shutdown, rx) = watch::channel(false);
        let mut handles = Vec::with_capacity(count);

        for id in 0..count {
            let source = make_source(id)?;
            let worker = ConsumptionLoop::new(id, source, ctx.clone(), rx.clone());
            handles.push(tokio::spawn(worker.run()));
        }

        tracing::info!(workers = count, "✅ Worker pool started");

        Ok(Self { shutdown, handles })
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Signal every worker and wait for them to finish. In-flight messages
    /// are left uncommitted.
    pub async fn shutdown(self) {
        tracing::info!("🛑 Stopping worker pool");
        let _ = self.shutdown.send(true);

        for (id, joined) in join_all(self.handles).await.into_iter().enumerate() {
            match joined {
                Ok(Ok(())) => tracing::debug!(worker = id, "Worker exited cleanly"),
                Ok(Err(e)) => tracing::error!(worker = id, error = %e, "Worker halted with error"),
                Err(e) => tracing::error!(worker = id, error = %e, "Worker task panicked"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;
    use crate::aggregation::{AggregateStore, AggregationEngine};
    use crate::messaging::memory::MemoryBroker;
    use crate::messaging::{OutboundRecord, Publisher, Topology};
    use crate::models::OrderEvent;
    use crate::routing::Router;
    use crate::utils::RetryPolicy;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_workers_share_one_store() {
        const PRODUCTS: [&str; 5] = ["Laptop", "Phone", "Monitor", "Keyboard", "Mouse"];
        const PER_PRODUCT: usize = 200;

        let topology = Topology::default();
        let broker = MemoryBroker::new(topology.clone());
        let store = Arc::new(AggregateStore::new());

        for i in 0..PER_PRODUCT {
            for (p, product) in PRODUCTS.iter().enumerate() {
                let event = OrderEvent::new(format!("o-{}-{}", p, i), *product, 4.0);
                broker
                    .publish(OutboundRecord {
                        topic: "orders".to_string(),
                        key: Some(event.order_id.clone()),
                        partition: Some((i % 3) as i32),
                        payload: Some(event.encode().unwrap()),
                        headers: vec![],
                    })
                    .await
                    .unwrap();
            }
        }

        let ctx = WorkerContext {
            processor: Arc::new(AggregationEngine::new(store.clone())),
            router: Arc::new(Router::new(topology, Arc::new(broker.clone()))),
            policy: RetryPolicy::none(),
            metrics: None,
            health: None,
        };
        let source_broker = broker.clone();
        let pool = WorkerPool::spawn(4, move |_| Ok(source_broker.source()), ctx).unwrap();
        assert_eq!(pool.len(), 4);

        let total = (PRODUCTS.len() * PER_PRODUCT) as u64;
        let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
        while store.global().map(|g| g.count).unwrap_or(0) < total {
            assert!(tokio::time::Instant::now() < deadline, "workers stalled");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        pool.shutdown().await;

        for product in PRODUCTS {
            let agg = store.category(product).unwrap();
            assert_eq!(agg.count, PER_PRODUCT as u64);
            assert_eq!(agg.total, PER_PRODUCT as f64 * 4.0);
        }
        assert_eq!(broker.committed().len(), total as usize);
    }
}
