use user_service::{UserProjections, build_registry};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    threads_bootstrap::run_projection("config", |infra| {
        let projections = UserProjections::new(infra.counters(), infra.cache()?);
        build_registry(projections)
    })
    .await
}
