use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use popcat::auth::TokenCodec;
use popcat::config::Config;
use popcat::pop::LeaderboardService;
use popcat::storage;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "popcat-admin")]
#[command(about = "Popcat counter and token management CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the region leaderboard
    Leaderboard,
    /// Show the pop counter for one visitor
    Visitor {
        /// Client IP address
        ip_address: String,
        /// Region code, e.g. KR
        region_code: String,
    },
    /// Issue a token for an IP and region
    IssueToken {
        /// Client IP address the token is bound to
        ip_address: String,
        /// Region code embedded in the token
        region_code: String,
    },
    /// Validate a token against an IP and print its claims
    InspectToken {
        token: String,
        /// IP address the request would come from
        ip_address: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    match cli.command {
        Commands::Leaderboard => {
            let storage = storage::connect(&config.database).await?;
            let service = LeaderboardService::new(
                storage,
                Duration::from_millis(config.database.timeout_ms),
            );
            let board = service.get_leaderboard().await?;

            println!("Global sum: {}", board.global_sum);
            if board.ranking_list.is_empty() {
                println!("No pops recorded yet.");
            } else {
                println!("{:<6} {:<12} {}", "Rank", "Region", "Count");
                println!("{}", "-".repeat(40));
                for (rank, entry) in board.ranking_list.iter().enumerate() {
                    println!("{:<6} {:<12} {}", rank + 1, entry.region_code, entry.count);
                }
            }
        }
        Commands::Visitor {
            ip_address,
            region_code,
        } => {
            let storage = storage::connect(&config.database).await?;
            match storage.get_visitor_pop(&ip_address, &region_code).await? {
                Some(pop) => println!(
                    "✓ {} ({}) has popped {} times",
                    ip_address,
                    region_code,
                    pop.count()
                ),
                None => println!("⚠ No pops recorded for {} ({})", ip_address, region_code),
            }
        }
        Commands::IssueToken {
            ip_address,
            region_code,
        } => {
            let codec = TokenCodec::new(&config.token)?;
            let token = codec
                .issue(&ip_address, &region_code)
                .context("Failed to issue token")?;
            println!("{}", token);
        }
        Commands::InspectToken { token, ip_address } => {
            let codec = TokenCodec::new(&config.token)?;
            match codec.validate(&token, &ip_address) {
                Ok(claims) => {
                    println!("✓ Token is valid");
                    println!("{:<12} {}", "id", claims.id);
                    println!("{:<12} {}", "issuer", claims.issuer);
                    println!("{:<12} {}", "client ip", claims.client_ip);
                    println!("{:<12} {}", "region", claims.region_code);
                    println!("{:<12} {}", "issued at", claims.issued_at);
                    println!("{:<12} {}", "not before", claims.not_before);
                    println!("{:<12} {}", "expires at", claims.expires_at);
                }
                Err(e) if e.is_expired() => println!("⚠ Token has expired"),
                Err(e) => println!("✗ Token rejected: {}", e),
            }
        }
    }

    Ok(())
}
