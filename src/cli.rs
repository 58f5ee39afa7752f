use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct CliOptions {
    /// JSON file backing the shared link store
    #[arg(long, global = true, default_value = "./links.json")]
    pub store: PathBuf,

    /// Optional path to config file (YAML)
    #[arg(long, global = true)]
    pub config_path: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Harvest links from a page and its same-origin frames
    Collect {
        /// HTML page to load
        #[arg(short, long)]
        input: PathBuf,

        /// URL the page is served under (defaults to its file: URL)
        #[arg(long)]
        base_url: Option<String>,

        /// YAML script of DOM insertions to replay after loading
        #[arg(long)]
        mutations: Option<PathBuf>,
    },
    /// Print the collected links
    Show,
    /// Empty the collection
    Clear,
}

pub fn parse() -> CliOptions {
    CliOptions::parse()
}
