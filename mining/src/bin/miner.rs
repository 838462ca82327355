use log::info;
use mining::cli::parse_args;
use mining::prelude::*;
use rpc_core::client::{HttpWorkClient, REQUEST_TIMEOUT};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = parse_args();

    let mut config = match &args.config {
        Some(path) => MinerConfig::load(path)?,
        None => MinerConfig::default(),
    };
    config.apply_cli_overrides(&args);

    // Initialize logging
    env_logger::Builder::from_default_env()
        .filter_level(args.log_filter(config.debug))
        .init();

    config.validate()?;
    let backend = backend_for(&config)?;

    if args.ndevs {
        let count = backend.device_count();
        println!("{}", count);
        std::process::exit(count as i32);
    }
    config.validate_kernel()?;

    let client = HttpWorkClient::new(&config.url, &config.userpass, REQUEST_TIMEOUT)?
        .with_protocol_dump(config.protocol_dump);

    info!("Miner starting...");
    info!("Work source: {}", client.url());
    info!(
        "Backend: {:?}, batch {} x {}",
        config.backend,
        config.batch_shape().global,
        config.batch_shape().local
    );

    let mut manager = MiningManager::new(config);
    manager.start(backend.as_ref(), client)?;
    manager.supervise();

    Ok(())
}
