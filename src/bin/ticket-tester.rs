//! Ticket Tester CLI Tool
//!
//! Command-line tool for exercising the gateway against a real broker.
//!
//! Usage:
//!   # Mint an encrypted ticket header for a test client:
//!   cargo run --bin ticket-tester mint-ticket --player-id "player1"
//!   cargo run --bin ticket-tester mint-ticket --player-id "mod1" --role MODERATOR
//!
//!   # Announce a game server as online so queued players get matched:
//!   cargo run --bin ticket-tester server-online --server-id "srv-1" --region NAE

use anyhow::Result;
use chrono::Utc;
use clap::{Parser, Subcommand};
use waiting_room::amqp::{
    AmqpConfig, AmqpConnection, AmqpCoordinationPublisher, CoordinationMessage,
    CoordinationPublisher, PublisherConfig, ServerStatusChange,
};
use waiting_room::ticket::{TicketAttributes, TicketCodec, TicketRequest};
use waiting_room::types::{BucketKey, Region, Role, ServerStatus, DEFAULT_CUSTOM_KEY};

#[derive(Parser)]
#[command(name = "ticket-tester")]
#[command(about = "Mint admission tickets and drive the coordination queue for manual testing")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Pre-shared ticket passphrase (must match the gateway's)
    #[arg(long, default_value = "test")]
    key: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Mint an encrypted authorization header for a test client
    MintTicket {
        /// Player ID
        #[arg(short, long)]
        player_id: String,
        /// Composite bucket id (netcl:hotfix:REGION:playlist)
        #[arg(short, long, default_value = "1111111:1:NAE:playlist_defaultsolo")]
        bucket_id: String,
        /// Entitlement role (USER, T3_USER, MODERATOR, ...)
        #[arg(short, long, default_value = "USER")]
        role: String,
        /// Season number
        #[arg(short, long, default_value = "1")]
        season: u32,
        /// Private custom key, if any
        #[arg(long)]
        custom_key: Option<String>,
    },
    /// Publish a STATUS message marking a game server online
    ServerOnline {
        /// Server ID
        #[arg(long)]
        server_id: String,
        /// Server region (NAE, EU, OCE)
        #[arg(long, default_value = "NAE")]
        region: String,
        /// Playlist the server hosts
        #[arg(long, default_value = "playlist_defaultsolo")]
        playlist: String,
        /// Season number
        #[arg(long, default_value = "1")]
        season: u32,
        /// Private custom key, if any
        #[arg(long)]
        custom_key: Option<String>,
        /// AMQP broker host
        #[arg(long, default_value = "localhost")]
        amqp_host: String,
    },
}

fn parse_role(role: &str) -> Result<Role> {
    serde_json::from_value(serde_json::Value::String(role.to_uppercase()))
        .map_err(|_| anyhow::anyhow!("Invalid role: {}", role))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::MintTicket {
            player_id,
            bucket_id,
            role,
            season,
            custom_key,
        } => {
            let codec = TicketCodec::new(&cli.key, chrono::Duration::seconds(30));
            let request = TicketRequest {
                player_id,
                bucket_id,
                attributes: TicketAttributes {
                    role: parse_role(&role)?,
                    season,
                    custom_key,
                    extra: serde_json::Map::new(),
                },
                expire_at: Utc::now(),
                nonce: Some(uuid::Uuid::new_v4().simple().to_string()),
            };

            let token = codec.encrypt(&request)?;
            println!("Authorization: Epic-Signed mms-player {token}");
        }
        Commands::ServerOnline {
            server_id,
            region,
            playlist,
            season,
            custom_key,
            amqp_host,
        } => {
            let region: Region = region.parse()?;
            let bucket = BucketKey {
                region,
                playlist,
                custom_key: custom_key.unwrap_or_else(|| DEFAULT_CUSTOM_KEY.to_string()),
                season,
            };

            let config = AmqpConfig {
                host: amqp_host,
                ..AmqpConfig::default()
            };
            let connection = AmqpConnection::new(config).await?;
            let channel = connection.open_channel().await?;
            let publisher =
                AmqpCoordinationPublisher::new(channel, PublisherConfig::default()).await?;

            let change = ServerStatusChange::new(&bucket, &server_id, ServerStatus::Online);
            publisher
                .publish(CoordinationMessage::Status(change))
                .await?;
            println!("Published STATUS online for {server_id} in bucket {bucket}");

            connection.close().await?;
        }
    }

    Ok(())
}
