#[tokio::main]
async fn main() -> anyhow::Result<()> {
    equipment_scan_lib::run().await
}
