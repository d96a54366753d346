use crate::config::Config;
use crate::error::{OpsError, Result};
use crate::paths;
use crate::types::{Action, CommandSpec};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

/// Immutable table of named actions, built once at startup.
#[derive(Debug, Clone)]
pub struct Catalog {
    actions: Vec<Action>,
    index: HashMap<String, usize>,
}

impl Catalog {
    /// Build a catalog, rejecting duplicate slugs, invalid slugs, actions
    /// without commands and commands with an empty argv.
    pub fn new(actions: Vec<Action>) -> Result<Self> {
        let mut index = HashMap::with_capacity(actions.len());
        for (pos, action) in actions.iter().enumerate() {
            paths::validate_slug(&action.slug)?;
            if action.commands.is_empty() {
                return Err(OpsError::EmptyAction(action.slug.clone()));
            }
            if let Some(i) = action.commands.iter().position(|c| c.argv.is_empty()) {
                return Err(OpsError::EmptyCommand {
                    slug: action.slug.clone(),
                    index: i,
                });
            }
            if index.insert(action.slug.clone(), pos).is_some() {
                return Err(OpsError::DuplicateSlug(action.slug.clone()));
            }
        }
        Ok(Self { actions, index })
    }

    /// Built-in workstation actions plus any actions declared in config.
    pub fn load(root: &Path, config: &Config) -> Result<Self> {
        let mut actions = builtin_actions(root);
        actions.extend(config.actions.iter().cloned());
        Self::new(actions)
    }

    pub fn builtin(root: &Path) -> Result<Self> {
        Self::new(builtin_actions(root))
    }

    pub fn lookup(&self, slug: &str) -> Result<&Action> {
        self.index
            .get(slug)
            .map(|&i| &self.actions[i])
            .ok_or_else(|| OpsError::ActionNotFound(slug.to_string()))
    }

    /// All actions sorted by slug.
    pub fn list(&self) -> Vec<&Action> {
        let mut all: Vec<&Action> = self.actions.iter().collect();
        all.sort_by(|a, b| a.slug.cmp(&b.slug));
        all
    }

    /// Actions grouped by category; categories and slugs sorted.
    pub fn grouped(&self) -> BTreeMap<&str, Vec<&Action>> {
        let mut groups: BTreeMap<&str, Vec<&Action>> = BTreeMap::new();
        for action in self.list() {
            groups.entry(action.category.as_str()).or_default().push(action);
        }
        groups
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Built-in actions
// ---------------------------------------------------------------------------

const SETUP: &str = "Setup & demos";
const BUILD: &str = "Build & test";
const BENCH: &str = "Benchmarks";

fn builtin_actions(root: &Path) -> Vec<Action> {
    let wallet_demo = || {
        CommandSpec::new(["./scripts/wallet-demo.sh", "--out", "wallet-demo-artifacts"])
            .in_dir(root)
    };

    vec![
        Action::new(
            "dev-setup",
            "Install toolchains",
            "Run the repo's development setup script to install toolchains and CLI dependencies.",
            SETUP,
            vec![CommandSpec::new(["./scripts/dev-setup.sh"]).in_dir(root)],
        ),
        Action::new(
            "quickstart",
            "Full workstation quickstart",
            "Run dev setup, CI-equivalent checks, benchmarks, and the wallet demo so a new \
             contributor can bootstrap everything in one go.",
            SETUP,
            vec![
                CommandSpec::new(["./scripts/dev-setup.sh"]).in_dir(root),
                CommandSpec::new(["make", "check"]).in_dir(root),
                CommandSpec::new(["make", "bench"]).in_dir(root),
                wallet_demo(),
            ],
        )
        .with_notes(
            "Equivalent to running dev-setup, make check, make bench, and the wallet demo \
             sequentially.",
        ),
        Action::new(
            "wallet-demo",
            "Wallet demo",
            "Generate throwaway wallet artifacts and inspect a sample shielded transfer.",
            SETUP,
            vec![wallet_demo()],
        ),
        Action::new(
            "fmt",
            "Format Rust workspace",
            "Run `cargo fmt --all` to enforce the canonical Rust style across every crate.",
            BUILD,
            vec![CommandSpec::new(["cargo", "fmt", "--all"]).in_dir(root)],
        ),
        Action::new(
            "lint",
            "Lint with Clippy",
            "Execute `cargo clippy` with workspace-wide targets and fail on warnings.",
            BUILD,
            vec![CommandSpec::new([
                "cargo",
                "clippy",
                "--workspace",
                "--all-targets",
                "--all-features",
                "--",
                "-D",
                "warnings",
            ])
            .in_dir(root)],
        ),
        Action::new(
            "test",
            "Run workspace tests",
            "Execute `cargo test --workspace` for all crates.",
            BUILD,
            vec![CommandSpec::new(["cargo", "test", "--workspace"]).in_dir(root)],
        ),
        Action::new(
            "check",
            "Format, lint, and test",
            "Call `make check` which chains the fmt, lint, and test targets enforced in CI.",
            BUILD,
            vec![CommandSpec::new(["make", "check"]).in_dir(root)],
        )
        .with_notes("This target is equivalent to running the fmt, lint, and test actions sequentially."),
        Action::new(
            "bench-circuits",
            "Circuit prover benchmark",
            "Run the STARK prover smoke benchmark with JSON output to capture timing baselines.",
            BENCH,
            vec![CommandSpec::new([
                "cargo",
                "run",
                "-p",
                "circuits-bench",
                "--",
                "--smoke",
                "--prove",
                "--json",
            ])
            .in_dir(root)],
        ),
        Action::new(
            "bench-wallet",
            "Wallet benchmark",
            "Execute the wallet smoke benchmark to profile note management operations.",
            BENCH,
            vec![CommandSpec::new([
                "cargo",
                "run",
                "-p",
                "wallet-bench",
                "--",
                "--smoke",
                "--json",
            ])
            .in_dir(root)],
        ),
        Action::new(
            "bench-network",
            "Network throughput benchmark",
            "Run the Go netbench smoke suite under consensus/bench to capture networking KPIs.",
            BENCH,
            vec![
                CommandSpec::new(["go", "run", "./cmd/netbench", "--smoke", "--json"])
                    .in_dir(root.join("consensus").join("bench")),
            ],
        ),
        Action::new(
            "bench-all",
            "Full benchmark suite",
            "Run the prover, wallet, and network smoke benchmarks sequentially (same as `make bench`).",
            BENCH,
            vec![CommandSpec::new(["make", "bench"]).in_dir(root)],
        ),
    ]
}
