use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use secure_flow::options::{OptionMap, parse_option_pair};
use secure_flow::{
    Address, Bandwidth, Experiment, Flow, OpensslRunner, RunStatus, RunnerBase, SecureProtocol,
    SessionConfig, SessionManager, ShellExecutor, Tool, TopologyMap, UdpFlowArgs,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "secure-flow",
    author,
    version,
    disable_version_flag = true,
    about = "TLS/DTLS sessions between network namespaces"
)]
struct Cli {
    /// Print the version and exit
    #[arg(short = 'v', long = "version", action = clap::ArgAction::SetTrue)]
    print_version: bool,

    #[command(flatten)]
    settings: Settings,

    #[command(subcommand)]
    command: Option<Cmd>,
}

/// Overrides for settings otherwise taken from `SECURE_FLOW_*` variables.
#[derive(Args, Debug)]
struct Settings {
    /// Directory for generated keys and certificates (default: ./temp)
    #[arg(long = "scratch-dir", global = true)]
    scratch_dir: Option<PathBuf>,
    /// openssl binary to run
    #[arg(long = "openssl", global = true)]
    openssl: Option<String>,
    /// Run namespace commands through sudo
    #[arg(long = "sudo", global = true)]
    sudo: bool,
    /// Keep credentials in a per-namespace subdirectory
    #[arg(long = "isolate-credentials", global = true)]
    isolate_credentials: bool,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Run an openssl server in a namespace until interrupted
    Server {
        #[arg(long = "ns")]
        ns: String,
        #[arg(long = "protocol", value_enum, default_value = "tls")]
        protocol: SecureProtocol,
    },
    /// Run an openssl client against a server that is already listening
    Client {
        #[arg(long = "ns")]
        ns: String,
        /// Server address, with or without a /prefix
        #[arg(long = "destination")]
        destination: Address,
        /// Session length in seconds
        #[arg(long = "run-time")]
        run_time: f64,
        /// Delay before the session starts, in seconds
        #[arg(long = "start-time", default_value = "0")]
        start_time: f64,
        #[arg(long = "protocol", value_enum, default_value = "tls")]
        protocol: SecureProtocol,
    },
    /// Start a server, run a client against it, then stop the server
    Session {
        #[arg(long = "client-ns")]
        client_ns: String,
        #[arg(long = "server-ns")]
        server_ns: String,
        #[arg(long = "destination")]
        destination: Address,
        /// Session length in seconds
        #[arg(long = "run-time")]
        run_time: f64,
        #[arg(long = "protocol", value_enum, default_value = "tls")]
        protocol: SecureProtocol,
    },
    /// Print the options of a UDP/DTLS flow as JSON
    UdpFlow {
        #[arg(long = "bandwidth", default_value = "1mbit")]
        bandwidth: Bandwidth,
        #[arg(long = "tool", value_enum, default_value = "iperf3")]
        tool: Tool,
        #[arg(long = "dtls")]
        dtls: bool,
        /// Server option as key=value (repeatable)
        #[arg(long = "server-option")]
        server_options: Vec<String>,
        /// Client option as key=value (repeatable)
        #[arg(long = "client-option")]
        client_options: Vec<String>,
    },
}

impl Settings {
    fn into_config(self) -> SessionConfig {
        let mut config = SessionConfig::from_env();
        if let Some(dir) = self.scratch_dir {
            config.scratch_dir = dir;
        }
        if let Some(openssl) = self.openssl {
            config.openssl = openssl;
        }
        config.use_sudo |= self.sudo;
        config.isolate_credentials |= self.isolate_credentials;
        config
    }
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .init();

    let args = Cli::parse();
    if args.print_version {
        println!(
            "{} ({}@{}{}) [{}]",
            env!("CARGO_PKG_VERSION"),
            env!("GIT_BRANCH"),
            env!("GIT_HASH"),
            env!("GIT_DIRTY"),
            env!("CARGO_PKG_NAME")
        );
        return Ok(());
    }

    let Some(command) = args.command else {
        bail!("no command given; see --help");
    };
    let config = args.settings.into_config();

    match command {
        Cmd::UdpFlow {
            bandwidth,
            tool,
            dtls,
            server_options,
            client_options,
        } => print_udp_flow(UdpFlowArgs {
            target_bandwidth: bandwidth,
            tool,
            enable_dtls: dtls,
            server_options: parse_options(&server_options)?,
            client_options: parse_options(&client_options)?,
        }),
        Cmd::Server { ns, protocol } => {
            let sessions = session_manager(config)?;
            let server = sessions
                .start_server(&ns, protocol.as_str())
                .await
                .context("start openssl server")?;
            info!(ns = %ns, "server running, press Ctrl-C to stop");
            tokio::signal::ctrl_c().await.context("wait for Ctrl-C")?;
            server.terminate().await.context("stop openssl server")?;
            Ok(())
        }
        Cmd::Client {
            ns,
            destination,
            run_time,
            start_time,
            protocol,
        } => {
            let sessions = session_manager(config)?;
            let base = RunnerBase::new(
                Arc::new(TopologyMap::new()),
                ns.clone(),
                start_time,
                run_time,
                destination,
                String::new(),
            );
            let runner = OpensslRunner::new(base, sessions).with_protocol(protocol.as_str())?;
            finish(runner.run().await?)
        }
        Cmd::Session {
            client_ns,
            server_ns,
            destination,
            run_time,
            protocol,
        } => {
            let sessions = session_manager(config)?;
            let mut topology = TopologyMap::new();
            topology.add_node(client_ns.clone(), format!("client ({client_ns})"));
            topology.add_node(server_ns.clone(), format!("server ({server_ns})"));

            let flow = Flow::new(client_ns, server_ns.clone(), destination, 0.0, run_time);
            let mut experiment = Experiment::new("session");
            experiment.add_flow(flow);
            let runner = OpensslRunner::from_flow(
                &experiment.flows()[0],
                Arc::new(topology),
                sessions,
            )?
            .with_protocol(protocol.as_str())?;

            let Some(server) = runner.run_openssl_server(&server_ns).await else {
                bail!("openssl server failed to start in {server_ns}");
            };
            // s_server needs a moment to bind before the client connects.
            tokio::time::sleep(Duration::from_millis(500)).await;
            let status = runner.run().await;
            server.terminate().await.context("stop openssl server")?;
            finish(status?)
        }
    }
}

fn session_manager(config: SessionConfig) -> Result<Arc<SessionManager<ShellExecutor>>> {
    let executor = ShellExecutor::from_config(&config);
    let sessions = SessionManager::new(executor, config).context("prepare scratch directory")?;
    Ok(Arc::new(sessions))
}

fn parse_options(pairs: &[String]) -> Result<Option<OptionMap>> {
    if pairs.is_empty() {
        return Ok(None);
    }
    let mut map = OptionMap::new();
    for pair in pairs {
        let (key, value) = parse_option_pair(pair)?;
        map.insert(key, value);
    }
    Ok(Some(map))
}

fn print_udp_flow(args: UdpFlowArgs) -> Result<()> {
    let mut experiment = Experiment::new("cli");
    let flow = Flow::new("", "", "0.0.0.0".parse()?, 0.0, 0.0);
    let flow = experiment.add_udp_flow(flow, args);
    println!(
        "{}",
        serde_json::to_string_pretty(&flow.options).context("serialize flow options")?
    );
    Ok(())
}

fn finish(status: RunStatus) -> Result<()> {
    match status {
        RunStatus::Succeeded => Ok(()),
        RunStatus::Failed => bail!("openssl session failed"),
    }
}
