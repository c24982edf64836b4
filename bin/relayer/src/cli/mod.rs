// This file is part of Relayer.
//
// Relayer is free software: you can redistribute it and/or modify it under the
// terms of the GNU Lesser General Public License as published by the Free Software
// Foundation, either version 3 of the License, or (at your option) any later version.
//
// Relayer is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.
// See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with Relayer.
// If not, see https://www.gnu.org/licenses/.

use alloy_primitives::Address;
use anyhow::Context;
use clap::{Args, Parser, Subcommand};

mod builder;
mod metrics;
mod node;
mod pool;
mod rpc;
mod sim;
mod tracing;

use node::NodeCliArgs;

/// Main entry point for the CLI
///
/// Parses the CLI arguments and runs the appropriate subcommand.
/// Listens for a ctrl-c signal and shuts down all components when received.
pub async fn run() -> anyhow::Result<()> {
    let opt = Cli::parse();
    let _guard = tracing::configure_logging(&opt.logs)?;
    tracing::info!("Parsed CLI options: {:#?}", opt);

    let metrics_addr = format!("{}:{}", opt.metrics.host, opt.metrics.port).parse()?;
    metrics::initialize(metrics_addr, &opt.metrics.tags)
        .context("metrics server should start")?;

    match opt.command {
        Command::Node(args) => node::run(*args, opt.common).await?,
    }

    tracing::info!("Shutdown, goodbye");
    Ok(())
}

/// CLI commands
#[derive(Debug, Subcommand)]
enum Command {
    /// Node command
    ///
    /// Runs the pool, builder, and RPC server in a single process.
    #[command(name = "node")]
    Node(Box<NodeCliArgs>),
}

/// CLI common options
#[derive(Debug, Args)]
#[command(next_help_heading = "COMMON")]
pub struct CommonArgs {
    /// Node RPC URL used for chain reads and, unless `builder.submit_url` is set, submission
    #[arg(
        long = "node_http",
        name = "node_http",
        env = "NODE_HTTP",
        global = true
    )]
    node_http: Option<String>,

    #[arg(
        long = "entry_point",
        name = "entry_point",
        env = "ENTRY_POINT",
        default_value = "0x0000000071727De22E5E9d8BAf0edAc6f37da032",
        global = true
    )]
    entry_point: Address,

    /// Chain id, fetched from the node when unset
    #[arg(long = "chain_id", name = "chain_id", env = "CHAIN_ID", global = true)]
    chain_id: Option<u64>,

    /// Client side timeout of node requests
    #[arg(
        long = "provider_timeout_seconds",
        name = "provider_timeout_seconds",
        env = "PROVIDER_TIMEOUT_SECONDS",
        default_value = "10",
        global = true
    )]
    provider_timeout_seconds: u64,
}

/// CLI options for the metrics server
#[derive(Debug, Args)]
#[command(next_help_heading = "METRICS")]
pub struct MetricsArgs {
    /// Port to listen on for metrics requests
    #[arg(
        long = "metrics.port",
        name = "metrics.port",
        env = "METRICS_PORT",
        default_value = "8080",
        global = true
    )]
    port: u16,

    /// Host to listen on for metrics requests
    #[arg(
        long = "metrics.host",
        name = "metrics.host",
        env = "METRICS_HOST",
        default_value = "0.0.0.0",
        global = true
    )]
    host: String,

    /// Tags for metrics
    ///
    /// Format: key1=value1,key2=value2,...
    #[arg(
        long = "metrics.tags",
        name = "metrics.tags",
        env = "METRICS_TAGS",
        default_values_t = Vec::<String>::new(),
        value_delimiter = ',',
        global = true
    )]
    tags: Vec<String>,
}

/// CLI options for logging
#[derive(Debug, Args)]
#[command(next_help_heading = "LOGGING")]
pub struct LogsArgs {
    /// Log file
    ///
    /// If not provided, logs will be written to stdout
    #[arg(
        long = "log.file",
        name = "log.file",
        env = "LOG_FILE",
        default_value = None,
        global = true
    )]
    file: Option<String>,

    /// Log JSON
    ///
    /// If set, logs will be written in JSON format
    #[arg(
        long = "log.json",
        name = "log.json",
        env = "LOG_JSON",
        required = false,
        num_args = 0,
        global = true
    )]
    json: bool,
}

/// CLI options
#[derive(Debug, Parser)]
#[command(author, version, about = "ERC-4337 bundle relayer", long_about = None)]
struct Cli {
    #[clap(subcommand)]
    command: Command,

    #[clap(flatten)]
    common: CommonArgs,

    #[clap(flatten)]
    metrics: MetricsArgs,

    #[clap(flatten)]
    logs: LogsArgs,
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use alloy_primitives::address;
    use relayer_rpc::ApiNamespace;
    use relayer_types::builder::BundlingMode;

    use super::*;

    const KEY: &str = "0x0101010101010101010101010101010101010101010101010101010101010101";

    fn parse(extra: &[&str]) -> Cli {
        let mut args = vec![
            "relayer",
            "node",
            "--node_http",
            "http://localhost:8545",
            "--builder.private_key",
            KEY,
        ];
        args.extend_from_slice(extra);
        Cli::try_parse_from(args).expect("should parse")
    }

    fn node_args(cli: Cli) -> NodeCliArgs {
        match cli.command {
            Command::Node(args) => *args,
        }
    }

    #[test]
    fn defaults() {
        let cli = parse(&[]);
        assert_eq!(
            cli.common.entry_point,
            address!("0000000071727de22e5e9d8baf0edac6f37da032")
        );
        assert_eq!(cli.common.chain_id, None);
        assert_eq!(cli.metrics.port, 8080);
        assert!(!cli.logs.json);

        let common = cli.common;
        let node = match cli.command {
            Command::Node(args) => *args,
        };
        let builder = node.builder.to_args(1);
        assert_eq!(builder.auto_bundle_interval, Some(Duration::from_secs(3)));
        assert_eq!(builder.auto_bundle_mempool_size, 10);
        assert_eq!(builder.max_bundle_gas, 5_000_000);
        assert_eq!(builder.bundling_mode, BundlingMode::Auto);
        assert_eq!(builder.beneficiary, None);

        let pool = node.pool.pool_config(&common);
        assert_eq!(pool.same_sender_mempool_count, 4);
        assert_eq!(pool.min_replacement_fee_increase_percentage, 10);
        assert_eq!(pool.max_op_age, None);

        let rpc = node.rpc.to_args(1).unwrap();
        assert_eq!(rpc.port, 3000);
        assert_eq!(
            rpc.api_namespaces,
            vec![ApiNamespace::Eth, ApiNamespace::Debug]
        );
    }

    #[test]
    fn zero_interval_disables_timer() {
        let node = node_args(parse(&[
            "--builder.auto_bundle_interval_seconds",
            "0",
            "--builder.bundling_mode",
            "manual",
        ]));
        let builder = node.builder.to_args(1);
        assert_eq!(builder.auto_bundle_interval, None);
        assert_eq!(builder.bundling_mode, BundlingMode::Manual);
    }

    #[test]
    fn pool_lists() {
        let node = node_args(parse(&[
            "--pool.blocklist",
            "0x0000000000000000000000000000000000000001,0x0000000000000000000000000000000000000002",
        ]));
        let (blocklist, allowlist) = node.pool.address_lists().unwrap();
        assert_eq!(blocklist.unwrap().len(), 2);
        assert!(allowlist.is_none());
    }

    #[test]
    fn rejects_unknown_namespace() {
        let result = Cli::try_parse_from([
            "relayer",
            "node",
            "--node_http",
            "http://localhost:8545",
            "--builder.private_key",
            KEY,
            "--rpc.api",
            "eth,admin",
        ]);
        assert!(result.is_err());
    }
}
