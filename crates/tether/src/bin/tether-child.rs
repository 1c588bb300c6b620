//! Minimal tethered child: resolve the locator, register, wait for quit.
//!
//! Used by the integration tests as a real companion process.

#[cfg(unix)]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    use std::path::PathBuf;
    use tracing::info;

    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .try_init();

    let mut locator: Option<PathBuf> = None;
    let mut entry: Option<String> = None;
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--locator" => locator = args.next().map(PathBuf::from),
            "--entry" => entry = args.next(),
            other => anyhow::bail!("unknown argument: {other}"),
        }
    }
    let locator = locator.ok_or_else(|| anyhow::anyhow!("--locator is required"))?;
    let entry = entry.ok_or_else(|| anyhow::anyhow!("--entry is required"))?;

    let mut session = tether::ChildSession::connect(&locator, &entry).await?;
    info!(entry = %entry, "registered with controller");

    session.wait_for_quit().await?;
    info!("quit requested by controller");
    Ok(())
}

#[cfg(not(unix))]
fn main() {
    eprintln!("tether-child is only available on Unix");
    std::process::exit(1);
}
