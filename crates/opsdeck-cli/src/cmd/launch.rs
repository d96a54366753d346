use crate::output::print_json;
use anyhow::Context;
use clap::{Args, ValueEnum};
use opsdeck_core::config::Config;
use opsdeck_server::supervisor::{
    Exposure, LaunchMode, LaunchSpec, Overlay, ProcessState, ProcessStatus, Role, Supervisor,
    SupervisorError, SupervisorSettings,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

const POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Args, Debug)]
pub struct LaunchArgs {
    /// Role to launch: node or wallet
    pub role: Role,

    /// Program name or path (default: hegemon for node, walletd for wallet)
    #[arg(long)]
    pub executable: Option<String>,

    /// Join an existing network through this peer instead of bootstrapping
    #[arg(long, value_name = "PEER")]
    pub join: Option<String>,

    /// Storage path (node database or wallet store)
    #[arg(long)]
    pub storage: Option<PathBuf>,

    /// API bind address
    #[arg(long)]
    pub bind: Option<String>,

    /// API auth token (generated when omitted)
    #[arg(long, env = "OPSDECK_API_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Worker threads (miner workers for node, sync workers for wallet)
    #[arg(long)]
    pub workers: Option<u32>,

    /// Seed material
    #[arg(long, hide_env_values = true)]
    pub seed: Option<String>,

    /// Wallet passphrase
    #[arg(long, env = "OPSDECK_PASSPHRASE", hide_env_values = true)]
    pub passphrase: Option<String>,

    /// Enable transport encryption
    #[arg(long)]
    pub tls: bool,

    /// Require mutual authentication (implies a TLS listener)
    #[arg(long)]
    pub mtls: bool,

    /// Who may connect
    #[arg(long, value_enum, default_value = "local")]
    pub exposure: ExposureArg,

    /// Overlay network routing
    #[arg(long, value_enum, default_value = "none")]
    pub overlay: OverlayArg,

    /// Extra arguments passed through verbatim (after `--`)
    #[arg(last = true)]
    pub extra: Vec<String>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum ExposureArg {
    Local,
    Lan,
    Public,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum OverlayArg {
    None,
    Relay,
    Tor,
}

impl From<ExposureArg> for Exposure {
    fn from(a: ExposureArg) -> Self {
        match a {
            ExposureArg::Local => Exposure::Local,
            ExposureArg::Lan => Exposure::Lan,
            ExposureArg::Public => Exposure::Public,
        }
    }
}

impl From<OverlayArg> for Overlay {
    fn from(a: OverlayArg) -> Self {
        match a {
            OverlayArg::None => Overlay::None,
            OverlayArg::Relay => Overlay::Relay,
            OverlayArg::Tor => Overlay::Tor,
        }
    }
}

impl LaunchArgs {
    fn spec(&self) -> LaunchSpec {
        LaunchSpec {
            executable: self.executable.clone(),
            mode: if self.join.is_some() {
                LaunchMode::Join
            } else {
                LaunchMode::Start
            },
            peer: self.join.clone(),
            storage_path: self.storage.clone(),
            bind_addr: self.bind.clone(),
            token: self.token.clone(),
            workers: self.workers,
            seed: self.seed.clone(),
            passphrase: self.passphrase.clone(),
            tls: self.tls,
            mtls: self.mtls,
            exposure: self.exposure.into(),
            overlay: self.overlay.into(),
            extra_args: self.extra.clone(),
        }
    }
}

pub fn run(root: &Path, args: LaunchArgs, json: bool) -> anyhow::Result<()> {
    let config = Config::load(root).context("failed to load config")?;
    let spec = args.spec();
    // Reject bad flags before starting a runtime or touching the log dir.
    spec.validate()?;

    let settings = Arc::new(SupervisorSettings::from_config(root, &config.supervisor));
    let supervisor = Supervisor::new(args.role, settings)?;

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move {
        let started = match supervisor.start(spec).await {
            Ok(state) => state,
            Err(SupervisorError::StartupFailed(failure)) => {
                if !failure.log_tail.is_empty() {
                    eprintln!("--- last output ---");
                    for line in &failure.log_tail {
                        eprintln!("{line}");
                    }
                }
                eprintln!("log: {}", failure.log_path.display());
                anyhow::bail!("{}", failure.message);
            }
            Err(e) => return Err(e.into()),
        };
        report(&started, json)?;
        if !json {
            println!("Press Ctrl-C to stop.");
        }

        let signal = opsdeck_server::shutdown_signal();
        tokio::pin!(signal);
        let final_state = loop {
            tokio::select! {
                _ = &mut signal => break supervisor.stop().await?,
                _ = tokio::time::sleep(POLL_INTERVAL) => {
                    let state = supervisor.status().await;
                    if !state.is_live() {
                        break state;
                    }
                }
            }
        };
        report(&final_state, json)?;

        if final_state.status == ProcessStatus::Error {
            anyhow::bail!(
                "{} exited with code {}",
                final_state.role,
                final_state.exit_code.unwrap_or(-1)
            );
        }
        Ok(())
    })
}

fn report(state: &ProcessState, json: bool) -> anyhow::Result<()> {
    if json {
        return print_json(state);
    }
    match state.status {
        ProcessStatus::Running => {
            println!(
                "{} running (PID {}) on {}",
                state.role,
                state.pid.map(|p| p.to_string()).unwrap_or_else(|| "?".into()),
                state.address.as_deref().unwrap_or("-")
            );
            if let Some(cmd) = &state.command {
                println!("  command: {cmd}");
            }
            if let Some(token) = &state.token {
                println!("  token:   {token}");
            }
            println!("  log:     {}", state.log_path.display());
        }
        _ => {
            println!(
                "{} {} (exit code {})",
                state.role,
                serde_json::to_value(state.status)?
                    .as_str()
                    .unwrap_or("stopped"),
                state
                    .exit_code
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "-".into())
            );
            if let Some(err) = &state.error {
                println!("  last output: {err}");
            }
        }
    }
    Ok(())
}
