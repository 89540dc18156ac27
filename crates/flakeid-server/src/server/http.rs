use std::sync::Arc;

use axum::{Router, extract::State, http::StatusCode, routing::get};
use flakeid::IdService;

pub type AppState = Arc<IdService>;

pub fn router(service: AppState) -> Router {
    Router::new()
        .route("/id/next", get(next_id))
        .route("/healthz", get(healthz))
        .with_state(service)
}

/// Returns the next ID as decimal text.
///
/// Generation can sleep for a millisecond when the current one is used up,
/// so it runs on the blocking pool.
async fn next_id(State(service): State<AppState>) -> Result<String, (StatusCode, String)> {
    let result = tokio::task::spawn_blocking(move || service.generate_id())
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "id generation task failed");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        })?;

    result.map(|id| id.to_string()).map_err(|e| {
        tracing::error!(error = %e, "id generation failed");
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    })
}

async fn healthz() -> &'static str {
    "ok"
}

#[cfg(test)]
mod tests {
    use super::*;
    use flakeid::{
        DEFAULT_EPOCH, FlakeId, MemoryCheckpointStore, ServiceConfig, SystemClock, ThreadRandom,
        WorkerIdAllocator,
    };

    async fn service(worker_id: u64) -> AppState {
        let allocator = WorkerIdAllocator::fixed(worker_id).unwrap();
        let store = Arc::new(MemoryCheckpointStore::new());
        Arc::new(
            IdService::start(ServiceConfig::default(), &allocator, store, SystemClock, ThreadRandom)
                .await
                .unwrap(),
        )
    }

    #[tokio::test]
    async fn next_id_returns_decimal_ids_for_this_worker() {
        let state = service(42).await;

        let first = next_id(State(Arc::clone(&state))).await.unwrap();
        let second = next_id(State(Arc::clone(&state))).await.unwrap();

        let first = FlakeId::from_raw(first.parse().unwrap());
        let second = FlakeId::from_raw(second.parse().unwrap());
        assert!(first < second);
        assert_eq!(first.worker_id(), 42);
        assert!(first.decode(DEFAULT_EPOCH).timestamp > DEFAULT_EPOCH);
    }

    #[tokio::test]
    async fn healthz_is_ok() {
        assert_eq!(healthz().await, "ok");
    }
}
