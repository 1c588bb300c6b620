//! Supervise one run of the `tether-child` shim: launch it via cargo,
//! wait for it to register, then ask it to quit.

#[cfg(unix)]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    use async_trait::async_trait;
    use std::path::PathBuf;
    use std::sync::Arc;
    use tether::{ChildExit, ControllerConfig, ControllerEvents, Phase, Tether};
    use tracing::info;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    struct LoggingEvents;

    #[async_trait]
    impl ControllerEvents for LoggingEvents {
        async fn on_connected(&self) {
            info!("child connected");
        }

        async fn on_quit(&self, exit: ChildExit) {
            info!(%exit, "child quit");
        }

        async fn on_crash_during_startup(&self, exit: ChildExit) {
            info!(%exit, "child crashed during startup");
        }
    }

    // Run the child shim through cargo from the workspace root; the
    // controller appends the --entry/--locator pair after the `--`.
    let config = ControllerConfig::builder()
        .name("simple-supervise")
        .command("cargo")
        .args(["run", "--quiet", "-p", "tether", "--bin", "tether-child", "--"])
        .child_entry("demo.Worker")
        .working_directory(
            PathBuf::from(env!("CARGO_MANIFEST_DIR"))
                .join("..")
                .join(".."),
        )
        .build()?;

    let tether = Tether::new(config, Arc::new(LoggingEvents))?;

    tether.start().await?;
    info!("child launched; waiting for registration");

    while !tether.is_connected() && tether.phase() != Phase::Idle {
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    }

    if tether.is_connected() {
        info!("requesting quit");
        tether.request_quit().await;
    }

    tether.wait_until_idle().await;
    tether.dispose().await;
    Ok(())
}

#[cfg(not(unix))]
fn main() {
    eprintln!("this demo is only available on Unix");
    std::process::exit(1);
}
