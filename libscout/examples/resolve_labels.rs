//! Label resolution example for the Scout library.
//!
//! Resolves the labels of an image against a local registry. Start one with
//! `docker run -d -p 5000:5000 registry:2` and push an image to it first.
//!
//! Run with: cargo run --example resolve_labels -- localhost:5000/team/app:1.0
//!
//! Set `RUST_LOG=libscout=debug` to see the registry requests.

use libscout::{AuthorizationType, Config, RegistryConfiguration, Scout};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("libscout=info")),
        )
        .init();

    let image = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "localhost:5000/team/app:1.0".to_string());

    let mut config = Config::load(None)?;
    config.registries.insert(
        "local".to_string(),
        RegistryConfiguration::new("localhost:5000", AuthorizationType::Anonymous)
            .with_insecure(true),
    );
    let scout = Scout::from_config(config).await?;

    let reference = scout.parse(&image)?;
    println!("Image: {}", reference);
    println!("  registry:   {}", reference.registry_host());
    println!("  repository: {}", reference.repository());
    println!("  reference:  {}\n", reference.repository_reference());

    match scout.resolve_labels(&image).await {
        Ok(labels) if labels.is_empty() => println!("Image has no labels"),
        Ok(labels) => {
            let mut labels: Vec<_> = labels.into_iter().collect();
            labels.sort();
            println!("Found {} labels:\n", labels.len());
            for (key, value) in labels {
                println!("  {} = {}", key, value);
            }
        }
        Err(e) => {
            eprintln!("Failed to resolve labels: {}", e);
            if e.is_retryable() {
                eprintln!("  Make sure a registry is running at http://localhost:5000");
            }
        }
    }

    Ok(())
}
