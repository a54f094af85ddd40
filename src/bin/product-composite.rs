//! Product composite CLI tool
//!
//! Cuts the subject out of a product photo and places it, with a contact
//! shadow, on a procedural skyline or a supplied background.

#[cfg(feature = "cli")]
use product_composite::cli;

#[cfg(feature = "cli")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cli::main().await
}

#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!("CLI feature not enabled. Please rebuild with --features cli");
    std::process::exit(1);
}
