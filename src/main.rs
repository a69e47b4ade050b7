use std::process;

use anyhow::Result;
use clap::Parser;
use log::{error, info, LevelFilter};

use sqlhop::actions;
use sqlhop::auth::{connect, ConnectOptions, Credentials};
use sqlhop::context::QueryContext;
use sqlhop::output::OutputFormat;
use sqlhop::{verify_chain, ChainError, ServerChain};

#[derive(Parser, Debug)]
#[command(
    name = "sqlhop",
    version,
    about = "Linked-server chain traversal and enumeration toolkit for Microsoft SQL Server"
)]
struct Cli {
    /// Target host (first server of the path)
    #[arg(short = 'H', long)]
    host: String,

    /// Target port
    #[arg(short, long, default_value_t = 1433)]
    port: u16,

    /// Initial database
    #[arg(short, long, default_value = "master")]
    database: String,

    /// SQL login (Windows-integrated auth when omitted)
    #[arg(short, long)]
    username: Option<String>,

    /// Password for --username
    #[arg(short = 'P', long, requires = "username")]
    password: Option<String>,

    /// Linked-server chain: host1[:login1],host2[:login2],...
    #[arg(short, long)]
    link: Option<String>,

    /// Walk the chain hop-by-hop first and abort on a detected loop
    #[arg(long)]
    check_links: bool,

    /// Output format: table, markdown, csv
    #[arg(short, long, default_value = "table")]
    format: OutputFormat,

    /// Debug logging (repeat for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Action to run ('list' prints the catalogue)
    action: String,

    /// Action arguments
    #[arg(trailing_var_arg = true)]
    args: Vec<String>,
}

fn init_logger(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .format_timestamp_secs()
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    let chain = match &cli.link {
        Some(notation) => ServerChain::parse(notation)?,
        None => ServerChain::new(),
    };
    if !chain.is_empty() {
        info!("declared chain: {}", chain.notation());
    }

    let credentials = match (cli.username, cli.password) {
        (Some(username), password) => Credentials::Sql {
            username,
            password: password.unwrap_or_default(),
        },
        (None, _) => Credentials::Integrated,
    };

    let client = connect(&ConnectOptions {
        host: cli.host,
        port: cli.port,
        database: cli.database,
        credentials,
    })
    .await?;

    let mut ctx = QueryContext::new(client, chain, cli.format);

    if cli.check_links && !ctx.chain().is_empty() {
        info!("verifying the chain for loops before running the action");
        let chain = ctx.chain().clone();
        let path = verify_chain(&chain, &mut ctx).await?;
        for (index, fp) in path.iter().enumerate() {
            info!(
                "hop {index}: {} as {} (mapped {}, sysadmin: {})",
                fp.hostname, fp.system_user, fp.mapped_user, fp.is_admin
            );
        }
    }

    actions::dispatch(&mut ctx, &cli.action, &cli.args).await
}

#[async_std::main]
async fn main() {
    let cli = Cli::parse();
    init_logger(cli.verbose);

    if cli.action.eq_ignore_ascii_case("list") {
        actions::print_catalogue();
        return;
    }

    if let Err(err) = run(cli).await {
        // A cyclic chain and an unreachable hop are different problems; make
        // sure the operator can tell which one they have.
        match err.downcast_ref::<ChainError>() {
            Some(chain_err) => error!("{chain_err}"),
            None => error!("{err:#}"),
        }
        process::exit(1);
    }
}
