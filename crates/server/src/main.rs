#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tagstream_server::start().await
}
