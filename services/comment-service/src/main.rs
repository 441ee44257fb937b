use comment_service::{CommentProjections, build_registry};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    threads_bootstrap::run_projection("config", |infra| {
        build_registry(CommentProjections::new(infra.index()))
    })
    .await
}
