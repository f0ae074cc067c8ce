pub mod openai;

/// Text embedding capability. One upstream call per invocation.
#[async_trait::async_trait]
pub trait EmbeddingProvider: Send + Sync {
    fn model(&self) -> &str;

    async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>>;
}
