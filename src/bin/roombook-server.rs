use clap::Parser;
use clap_derive::Parser;
use roombook::config::ServerConfig;
use roombook::server::Server;
use tracing::Level;

/// UDP facility reservation server.
#[derive(Parser)]
struct Args {
    #[clap(default_value_t = 5000)]
    port: u16,

    /// invocation semantics: AMO (at-most-once) or ALO (at-least-once), case-insensitive
    #[clap(default_value = "AMO")]
    semantics: String,

    /// probability in [0,1] of dropping each outbound datagram (0 disables loss simulation)
    #[clap(default_value_t = 0.0)]
    loss_rate: f64,

    /// seed for the loss simulator
    #[clap(default_value_t = 42)]
    seed: i64,

    #[clap(short, long, default_value_t = false)]
    verbose: bool,

    #[clap(long, default_value_t = false)]
    very_verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let level = match (args.verbose, args.very_verbose) {
        (_, true) => Level::TRACE,
        (true, _) => Level::DEBUG,
        (false, false) => Level::INFO,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .try_init()
        .ok();

    let mut config = ServerConfig::new(args.port);
    config.semantics = args.semantics.parse()?;
    config.loss_rate = args.loss_rate;
    config.loss_seed = args.seed as u64;

    let mut server = Server::bind(config).await?;
    server.run().await
}
