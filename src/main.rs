#[tokio::main]
async fn main() -> anyhow::Result<()> {
    scribe_lib::run().await
}
