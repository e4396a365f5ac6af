//! # shardgate binary
//!
//! ```bash
//! # Show who owns what
//! shardgate --config node.toml assignment
//!
//! # Fill this node's shard
//! shardgate --config node.toml -D node.redb load -r accounts -f accounts.json
//!
//! # Serve
//! shardgate --config node.toml -D node.redb serve
//! ```

use clap::Parser;
use shardgate::cli;

#[tokio::main]
async fn main() {
    shardgate::init_tracing();

    let cli = cli::Cli::parse();

    if !cli.quiet {
        print_banner();
    }

    if let Err(e) = cli::execute(cli).await {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}

fn print_banner() {
    println!(
        r#"
  ┌─┐┬ ┬┌─┐┬─┐┌┬┐┌─┐┌─┐┌┬┐┌─┐
  └─┐├─┤├─┤├┬┘ │││ ┬├─┤ │ ├┤
  └─┘┴ ┴┴ ┴┴└──┴┘└─┘┴ ┴ ┴ └─┘

  partition-aware query router v{}
"#,
        env!("CARGO_PKG_VERSION")
    );
}
