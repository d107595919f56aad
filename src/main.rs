//! `winunlock` command line: runs the session monitor and provisions the
//! stored credential.

use anyhow::Result;
use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(author, version, about = "Automatic unlock after a Remote Desktop disconnect")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the session monitor in the foreground until Ctrl+C.
    Monitor,
    /// Read the unlock password from stdin and store it encrypted.
    SetPassword,
    /// Remove the stored password.
    ClearPassword,
    /// Print whether a password is stored and an unlock request is pending.
    Status,
    /// Arm an unlock request by hand.
    Arm,
    /// Clear a pending unlock request.
    Disarm,
}

impl Command {
    fn log_component(&self) -> &'static str {
        match self {
            Command::Monitor => "monitor",
            _ => "winunlock-cli",
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    winunlock::logger::init_logger(cli.command.log_component());
    tracing::debug!("Starting {:?}", cli.command);
    app::run(cli.command).await
}

#[cfg(windows)]
mod app {
    use super::Command;
    use anyhow::{anyhow, bail, Context, Result};
    use serde::Serialize;
    use std::io::Read;
    use std::sync::Arc;
    use tokio::sync::{mpsc, watch};
    use tracing::info;
    use winunlock::core::{
        ConfigStore, CredentialVault, SessionHost, SessionInfo, SessionMonitor, UnlockChannel,
    };
    use winunlock::platform::{
        DpapiProtector, RegistryConfigStore, SessionNotifier, WtsSessionHost,
    };
    use winunlock::{AgentPolicy, MonitorConfig, SecureString};
    use zeroize::Zeroizing;

    #[derive(Debug, Serialize)]
    struct StatusReport {
        provisioned: bool,
        unlock_request_armed: bool,
        require_armed_request: bool,
        allow_legacy_plaintext: bool,
        sessions: Vec<SessionInfo>,
    }

    pub async fn run(command: Command) -> Result<()> {
        let store: Arc<dyn ConfigStore> = Arc::new(RegistryConfigStore::machine());
        let vault = CredentialVault::new(store.clone(), Arc::new(DpapiProtector::new()));
        let channel = UnlockChannel::new(store.clone());

        match command {
            Command::Monitor => run_monitor(channel).await,
            Command::SetPassword => {
                let mut input = Zeroizing::new(String::new());
                std::io::stdin()
                    .read_to_string(&mut input)
                    .context("failed to read password from stdin")?;
                let password = input.trim_end_matches(['\r', '\n']);
                if password.is_empty() {
                    bail!("refusing to store an empty password");
                }
                vault.put(&SecureString::new(password))?;
                println!("Password stored");
                Ok(())
            }
            Command::ClearPassword => {
                vault.clear()?;
                println!("Password cleared");
                Ok(())
            }
            Command::Status => {
                let policy = AgentPolicy::from_store(store.as_ref());
                let sessions = WtsSessionHost::new()
                    .enumerate_sessions()
                    .await
                    .unwrap_or_else(|e| {
                        tracing::warn!("Session enumeration failed: {}", e);
                        Vec::new()
                    });
                let report = StatusReport {
                    provisioned: vault.is_provisioned()?,
                    unlock_request_armed: channel.is_armed(),
                    require_armed_request: policy.require_armed_request,
                    allow_legacy_plaintext: policy.allow_legacy_plaintext,
                    sessions,
                };
                println!("{}", serde_json::to_string_pretty(&report)?);
                Ok(())
            }
            Command::Arm => {
                channel.arm()?;
                println!("Unlock request armed");
                Ok(())
            }
            Command::Disarm => {
                channel.clear()?;
                println!("Unlock request cleared");
                Ok(())
            }
        }
    }

    async fn run_monitor(channel: UnlockChannel) -> Result<()> {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let notifier = SessionNotifier::start(event_tx).map_err(|e| anyhow!(e))?;

        let (stop_tx, stop_rx) = watch::channel(false);
        let monitor = SessionMonitor::new(
            Arc::new(WtsSessionHost::new()),
            channel,
            MonitorConfig::from_env(),
        );
        let task = tokio::spawn(monitor.run(event_rx, stop_rx));

        tokio::signal::ctrl_c()
            .await
            .context("failed to listen for Ctrl+C")?;
        info!("Ctrl+C received, stopping");
        let _ = stop_tx.send(true);

        task.await.context("monitor task failed")?;
        notifier.stop();
        Ok(())
    }
}

#[cfg(not(windows))]
mod app {
    use super::Command;
    use anyhow::{bail, Result};

    pub async fn run(_command: Command) -> Result<()> {
        bail!("winunlock requires Windows")
    }
}
