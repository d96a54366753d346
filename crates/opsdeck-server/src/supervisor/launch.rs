use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// Role
// ---------------------------------------------------------------------------

/// A supervised long-running process kind. One supervisor exists per role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Node,
    Wallet,
}

impl Role {
    pub const ALL: [Role; 2] = [Role::Node, Role::Wallet];

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Node => "node",
            Role::Wallet => "wallet",
        }
    }

    /// Executable looked up when the launch request does not name one.
    pub fn default_program(self) -> &'static str {
        match self {
            Role::Node => "hegemon",
            Role::Wallet => "walletd",
        }
    }

    pub fn default_bind_addr(self) -> &'static str {
        match self {
            Role::Node => "127.0.0.1:8080",
            Role::Wallet => "127.0.0.1:8090",
        }
    }

    fn flags(self) -> &'static RoleFlags {
        match self {
            Role::Node => &NODE_FLAGS,
            Role::Wallet => &WALLET_FLAGS,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "node" => Ok(Role::Node),
            "wallet" => Ok(Role::Wallet),
            other => Err(format!("unknown role '{other}' (expected node or wallet)")),
        }
    }
}

struct RoleFlags {
    storage: &'static str,
    bind: &'static str,
    token: &'static str,
    workers: &'static str,
    seed: &'static str,
    peer: &'static str,
    passphrase: &'static str,
}

static NODE_FLAGS: RoleFlags = RoleFlags {
    storage: "--db-path",
    bind: "--api-addr",
    token: "--api-token",
    workers: "--miner-workers",
    seed: "--miner-seed",
    peer: "--seeds",
    passphrase: "--wallet-passphrase",
};

static WALLET_FLAGS: RoleFlags = RoleFlags {
    storage: "--store",
    bind: "--api-addr",
    token: "--api-token",
    workers: "--sync-workers",
    seed: "--seed",
    peer: "--node",
    passphrase: "--passphrase",
};

// ---------------------------------------------------------------------------
// LaunchSpec
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LaunchMode {
    /// Bootstrap a fresh instance.
    #[default]
    Start,
    /// Attach to an existing network through `peer`.
    Join,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Exposure {
    /// Loopback only.
    #[default]
    Local,
    Lan,
    Public,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Overlay {
    #[default]
    None,
    Relay,
    Tor,
}

/// Parameters for a supervised process's start command.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchSpec {
    /// Program name or path; defaults to the role's binary.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executable: Option<String>,
    #[serde(default)]
    pub mode: LaunchMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bind_addr: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workers: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passphrase: Option<String>,
    #[serde(default)]
    pub tls: bool,
    #[serde(default)]
    pub mtls: bool,
    #[serde(default)]
    pub exposure: Exposure,
    #[serde(default)]
    pub overlay: Overlay,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_args: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LaunchError {
    #[error("mode=join requires a peer address")]
    JoinWithoutPeer,

    #[error("mutual TLS requires tls to be enabled")]
    MtlsWithoutTls,

    #[error("exposure=local cannot be combined with the {0:?} overlay")]
    LocalWithOverlay(Overlay),

    #[error("workers must be at least 1")]
    ZeroWorkers,

    #[error("executable must not be empty")]
    EmptyExecutable,
}

pub const REDACTED: &str = "******";

/// Argument vector and display form produced from a validated spec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchPlan {
    pub program: String,
    pub args: Vec<String>,
    /// Program + args with secret values replaced by [`REDACTED`].
    pub display: String,
    pub address: String,
    pub token: String,
}

impl LaunchSpec {
    pub fn validate(&self) -> Result<(), LaunchError> {
        if self.mode == LaunchMode::Join
            && self.peer.as_deref().map_or(true, |p| p.trim().is_empty())
        {
            return Err(LaunchError::JoinWithoutPeer);
        }
        if self.mtls && !self.tls {
            return Err(LaunchError::MtlsWithoutTls);
        }
        if self.exposure == Exposure::Local && self.overlay != Overlay::None {
            return Err(LaunchError::LocalWithOverlay(self.overlay));
        }
        if self.workers == Some(0) {
            return Err(LaunchError::ZeroWorkers);
        }
        if self.executable.as_deref().is_some_and(|e| e.trim().is_empty()) {
            return Err(LaunchError::EmptyExecutable);
        }
        Ok(())
    }

    /// Build the argument vector for `role`. `token` is used when the request
    /// does not carry one.
    pub fn plan(&self, role: Role, token: impl FnOnce() -> String) -> LaunchPlan {
        let flags = role.flags();
        let program = self
            .executable
            .clone()
            .unwrap_or_else(|| role.default_program().to_string());
        let address = self
            .bind_addr
            .clone()
            .unwrap_or_else(|| role.default_bind_addr().to_string());
        let token = self.token.clone().unwrap_or_else(token);

        let mut args = ArgBuilder::default();
        if let Some(path) = &self.storage_path {
            args.pair(flags.storage, path.display().to_string());
        }
        args.pair(flags.bind, address.clone());
        args.secret(flags.token, token.clone());
        if let Some(n) = self.workers {
            args.pair(flags.workers, n.to_string());
        }
        if let Some(peer) = &self.peer {
            args.pair(flags.peer, peer.clone());
        }
        if let Some(seed) = &self.seed {
            args.secret(flags.seed, seed.clone());
        }
        if let Some(pass) = &self.passphrase {
            args.secret(flags.passphrase, pass.clone());
        }
        if self.tls {
            args.flag("--tls");
        }
        if self.mtls {
            args.flag("--mtls");
        }
        if self.exposure != Exposure::Local {
            args.flag("--allow-remote");
        }
        match self.overlay {
            Overlay::None => {}
            Overlay::Relay => args.flag("--relay-enabled"),
            Overlay::Tor => args.flag("--tor"),
        }
        for extra in &self.extra_args {
            args.flag(extra);
        }

        let display = std::iter::once(program.clone())
            .chain(args.display.iter().cloned())
            .collect::<Vec<_>>()
            .join(" ");

        LaunchPlan {
            program,
            args: args.args,
            display,
            address,
            token,
        }
    }
}

#[derive(Default)]
struct ArgBuilder {
    args: Vec<String>,
    display: Vec<String>,
}

impl ArgBuilder {
    fn flag(&mut self, flag: &str) {
        self.args.push(flag.to_string());
        self.display.push(flag.to_string());
    }

    fn pair(&mut self, flag: &str, value: String) {
        self.flag(flag);
        self.display.push(value.clone());
        self.args.push(value);
    }

    fn secret(&mut self, flag: &str, value: String) {
        self.flag(flag);
        self.args.push(value);
        self.display.push(REDACTED.to_string());
    }
}

/// Generate a random alphanumeric token of `len` characters.
pub fn generate_token(len: usize) -> String {
    use rand::{distributions::Alphanumeric, Rng};
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
