#[tokio::main]
async fn main() -> anyhow::Result<()> {
    mitrafix_lib::run().await
}
