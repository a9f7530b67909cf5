use anyhow::Context;
use stockwatch_channel::ConnectionStatus;
use stockwatch_cli::{WatchSettings, build_channel};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    stockwatch_observability::init();

    let settings = WatchSettings::from_env().context("invalid STOCKWATCH_* configuration")?;

    if !settings.channel.enabled {
        tracing::warn!("STOCKWATCH_SOCKETS_ENABLED is off; not connecting");
        return Ok(());
    }

    let channel = build_channel(&settings);
    let mut changes = channel.status_changes();

    tracing::info!(
        endpoint = %settings.channel.endpoint,
        warehouses = settings.warehouses.len(),
        items = settings.items.len(),
        "watching inventory updates"
    );
    channel.connect();

    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal.context("failed to listen for ctrl-c")?;
                tracing::info!("interrupted; closing channel");
                channel.disconnect();
                break;
            }
            changed = changes.changed() => {
                if changed.is_err() {
                    break;
                }
                let status = *changes.borrow_and_update();
                match status {
                    ConnectionStatus::Connected => tracing::info!("connected"),
                    ConnectionStatus::Connecting => tracing::debug!("connecting"),
                    ConnectionStatus::Disconnected if channel.reconnect_pending() => {
                        tracing::warn!(
                            attempts = channel.reconnect_attempts(),
                            "connection lost; retrying"
                        );
                    }
                    ConnectionStatus::Disconnected => {
                        tracing::error!(
                            attempts = channel.reconnect_attempts(),
                            "connection closed; giving up"
                        );
                        break;
                    }
                }
            }
        }
    }

    Ok(())
}
