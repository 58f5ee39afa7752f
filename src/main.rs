use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use linkharvest::{
    cli::{self, Command},
    config, logging,
    store::{FileStore, KeyValueStore},
    util,
};

fn main() -> Result<()> {
    logging::init_logging();

    let cli_opts = cli::parse();
    let loaded = config::load_config(cli_opts.config_path.as_deref())?;
    let cfg = loaded.config;
    info!(
        "starting store={} key={} config_hash={}",
        cli_opts.store.display(),
        cfg.store_key,
        loaded.config_hash
    );

    let store = FileStore::open(&cli_opts.store)
        .with_context(|| format!("open store {}", cli_opts.store.display()))?;
    let store: Arc<dyn KeyValueStore> = Arc::new(store);

    let output = match &cli_opts.command {
        Command::Collect {
            input,
            base_url,
            mutations,
        } => util::run_collect(&cfg, store, input, base_url.as_deref(), mutations.as_deref())?,
        Command::Show => util::run_show(&cfg, store)?,
        Command::Clear => util::run_clear(&cfg, store)?,
    };
    print!("{output}");

    info!("linkharvest finished");
    Ok(())
}
