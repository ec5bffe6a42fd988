use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use fishare::consent::AutoAcceptOracle;
use fishare::ui::inline_ui_poster;
use fishare::Node;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "fishare=info".into()),
        )
        .init();

    let data_dir = data_dir();
    std::fs::create_dir_all(&data_dir)?;

    let node = Node::start(data_dir, Arc::new(AutoAcceptOracle), inline_ui_poster())?;
    info!(
        device_name = %node.config.device_name,
        listen_port = node.config.listen_port,
        discovery_port = node.config.discovery_port,
        "fishare node started"
    );

    wait_for_ctrl_c();
    info!("shutting down");
    node.shutdown();
    Ok(())
}

fn data_dir() -> PathBuf {
    std::env::var_os("FISHARE_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            let home = std::env::var_os("HOME")
                .or_else(|| std::env::var_os("USERPROFILE"))
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("."));
            home.join(".fishare")
        })
}

/// No signal-handling crate in the dependency stack: Ctrl+C terminates
/// the process via the default SIGINT disposition. This loop exists so a
/// future graceful-shutdown hook (a signal crate, a control socket) has
/// somewhere to plug in without restructuring `main`.
fn wait_for_ctrl_c() {
    loop {
        std::thread::sleep(std::time::Duration::from_secs(3600));
    }
}
