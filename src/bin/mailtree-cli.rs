#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc)]

//! CLI for inspecting a mailbox through the sync engine

use clap::{Parser, Subcommand};
use mailtree::{AccountConfig, FolderNode, ImapProvider, MailEngine, NodeState, load_saved_accounts};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mailtree-cli")]
#[command(about = "Log in, synchronize the folder tree, and inspect it")]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// JSON file with saved accounts to restore instead of the
    /// environment account
    #[arg(long, global = true)]
    accounts: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Log in and print the discovered folder tree
    Tree {
        /// Seconds to wait for loaders to finish
        #[arg(long, default_value = "5")]
        wait: u64,
    },

    /// Log in and stream tree change events
    Watch {
        /// Seconds to watch before exiting
        #[arg(long, default_value = "60")]
        duration: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let engine = MailEngine::new(Arc::new(ImapProvider::new()));

    if let Some(path) = &args.accounts {
        engine.restore_accounts(load_saved_accounts(path)?).await;
    } else {
        engine.add_account(AccountConfig::from_env()?).await?;
    }

    match args.command {
        Command::Tree { wait } => {
            tokio::time::sleep(Duration::from_secs(wait)).await;
            if args.json {
                let nodes: Vec<serde_json::Value> =
                    engine.root().children().iter().map(node_json).collect();
                println!("{}", serde_json::to_string_pretty(&nodes)?);
            } else {
                for account in engine.root().children() {
                    print_node(&account, 0);
                }
            }
        }
        Command::Watch { duration } => {
            let mut events = engine.subscribe();
            let deadline = tokio::time::Instant::now() + Duration::from_secs(duration);
            loop {
                tokio::select! {
                    () = tokio::time::sleep_until(deadline) => break,
                    event = events.recv() => match event {
                        Ok(event) => println!("{event:?}"),
                        Err(_) => break,
                    },
                }
            }
        }
    }

    engine.shutdown().await;
    Ok(())
}

fn print_node(node: &Arc<FolderNode>, depth: usize) {
    let indent = "  ".repeat(depth);
    let state = match node.state() {
        NodeState::Live => String::new(),
        other => format!(" [{other:?}]"),
    };
    println!(
        "{indent}{}{state} - {} message(s)",
        node.label(),
        node.messages().len()
    );
    for child in node.children() {
        print_node(&child, depth + 1);
    }
}

fn node_json(node: &Arc<FolderNode>) -> serde_json::Value {
    let children: Vec<serde_json::Value> =
        node.children().iter().map(node_json).collect();
    serde_json::json!({
        "label": node.label(),
        "unread": node.unread_count(),
        "state": format!("{:?}", node.state()),
        "messages": node.messages().len(),
        "children": children,
    })
}
