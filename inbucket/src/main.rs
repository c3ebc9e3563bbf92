mod controller;

use controller::Inbucket;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let server = match std::env::args().nth(1) {
        Some(path) => Inbucket::from_config(&path)?,
        // No explicit config: use the default file if present, else defaults
        None if std::path::Path::new(controller::DEFAULT_CONFIG).exists() => {
            Inbucket::from_config(controller::DEFAULT_CONFIG)?
        }
        None => Inbucket::default(),
    };

    server.run().await
}
