/// Entry point of the Creo Collector.
///
/// Reads its settings from the environment, serves the consumer API and polls container
/// statistics until interrupted.
///
/// # Examples
///
/// ```bash
/// ROOTFS_MOUNT_PATH=/rootfs RUST_LOG=debug cargo run
/// ```
#[tokio::main]
async fn main() -> std::result::Result<(), creo_collector::error::Error> {
    env_logger::init();
    creo_collector::run().await
}
