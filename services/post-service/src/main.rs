use post_service::{PostProjections, build_registry};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    threads_bootstrap::run_projection("config", |infra| {
        build_registry(PostProjections::new(infra.counters(), infra.index()))
    })
    .await
}
