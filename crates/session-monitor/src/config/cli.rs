use std::path::PathBuf;

use clap::Parser;
use clap::Subcommand;
use utils::version;

#[derive(Parser)]
#[command(about, long_about, version = &**version::VERSION)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Watch pods and nodes and publish session tasks
    Run(Box<RunArgs>),
}

#[derive(Parser, Clone, Debug, Default)]
pub struct RunArgs {
    #[arg(
        long,
        env = "CONFIG_PATH",
        value_hint = clap::ValueHint::FilePath,
        help = "Path to the YAML configuration file"
    )]
    pub config: Option<PathBuf>,

    #[arg(
        long,
        env = "SESSION_MONITOR_PORT",
        help = "Port of the liveness/readiness probe server"
    )]
    pub port: Option<u16>,

    #[arg(
        long,
        env = "KUBECONFIG",
        value_hint = clap::ValueHint::FilePath,
        help = "Path to kubeconfig file (defaults to cluster config or ~/.kube/config)"
    )]
    pub kubeconfig: Option<PathBuf>,

    #[arg(
        long,
        env = "POD_NAMESPACE",
        help = "Namespace to watch pods in (empty for all namespaces)"
    )]
    pub pod_namespace: Option<String>,

    #[arg(
        long,
        env = "REDIS_MOCK",
        help = "Use the in-process key-value backend instead of redis",
        action = clap::ArgAction::Set
    )]
    pub redis_mock: Option<bool>,
}
