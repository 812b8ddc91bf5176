use clap::{Parser, ValueEnum};
use physalia::{Config, OverflowPolicy, Server};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Overflow {
    DropNewest,
    Disconnect,
}

impl From<Overflow> for OverflowPolicy {
    fn from(value: Overflow) -> Self {
        match value {
            Overflow::DropNewest => OverflowPolicy::DropNewest,
            Overflow::Disconnect => OverflowPolicy::Disconnect,
        }
    }
}

/// Owner-authoritative room relay
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Address to listen on
    #[arg(long, env = "PHYSALIA_ADDR", default_value = "0.0.0.0:8080")]
    addr: String,

    /// Seconds without a pong before a peer is dropped; pings go out at 9/10 of this
    #[arg(long, env = "PHYSALIA_PONG_WAIT", default_value_t = 60)]
    pong_wait: u64,

    /// Seconds allowed for each outbound write
    #[arg(long, env = "PHYSALIA_WRITE_WAIT", default_value_t = 10)]
    write_wait: u64,

    /// Largest inbound frame in bytes
    #[arg(long, env = "PHYSALIA_MAX_MESSAGE_SIZE", default_value_t = 512)]
    max_message_size: usize,

    /// Pending envelopes buffered per peer
    #[arg(long, env = "PHYSALIA_OUTBOUND_CAPACITY", default_value_t = 64)]
    outbound_capacity: usize,

    /// What to do with a peer whose buffer is full
    #[arg(long, env = "PHYSALIA_OVERFLOW", value_enum, default_value_t = Overflow::Disconnect)]
    overflow: Overflow,

    /// Advertised room capacity (not enforced)
    #[arg(long, env = "PHYSALIA_ROOM_CAPACITY", default_value_t = 4)]
    room_capacity: usize,

    /// Seconds a new room waits for its first member before it is closed
    #[arg(long, env = "PHYSALIA_ADMISSION_WINDOW", default_value_t = 10)]
    admission_window: u64,
}

impl Args {
    fn config(&self) -> Config {
        Config::default()
            .with_keepalive(Duration::from_secs(self.pong_wait))
            .with_write_wait(Duration::from_secs(self.write_wait))
            .with_max_message_size(self.max_message_size)
            .with_outbound_capacity(self.outbound_capacity)
            .with_overflow_policy(self.overflow.into())
            .with_room_capacity(self.room_capacity)
            .with_admission_window(Duration::from_secs(self.admission_window))
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let config = args.config();
    config.validate()?;

    Server::with_config(config).serve(&args.addr).await?;
    Ok(())
}
