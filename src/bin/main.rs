use std::error::Error;

use tracing::{error, info};

use servicekit::{
    cli::parse_args,
    config::Config,
    constants::{SERVICE_NAME, SERVICE_VERSION},
    daemon::Daemon,
    logger::{LogFormat, LogLevel, Logger, init_tracing},
};

fn main() -> Result<(), Box<dyn Error>> {
    let args = parse_args();

    let config = match Config::load(&args.config) {
        Ok(config) => config,
        Err(err) => {
            init_tracing(args.log_level, LogLevel::default(), LogFormat::default());
            error!("load config: {err}");
            return Err(err.into());
        }
    };
    init_tracing(
        args.log_level,
        config.app.log.level,
        config.app.log.format,
    );

    if args.print {
        println!("{}", config.to_pretty_json()?);
        return Ok(());
    }

    if let Err(err) = config.validate() {
        error!("{err}");
        return Err(err.into());
    }

    let level = args.log_level.unwrap_or(config.app.log.level);
    let logger = Logger::new(SERVICE_NAME, SERVICE_VERSION, level);

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(serve(config, logger))
}

async fn serve(config: Config, logger: Logger) -> Result<(), Box<dyn Error>> {
    let mut daemon = match Daemon::build(&config, logger).await {
        Ok(daemon) => daemon,
        Err(err) => {
            error!("init daemon: {err}");
            return Err(err.into());
        }
    };

    let handle = daemon.handle();
    ctrlc::set_handler(move || handle.interrupt())?;

    info!(
        "{SERVICE_NAME} {SERVICE_VERSION} serving on port {}",
        config.app.port
    );

    let result = daemon.run().await;
    daemon.close().await?;

    if let Err(err) = result {
        error!("daemon exited with error: {err}");
        return Err(err.into());
    }

    Ok(())
}
