use echo_lib::config::EchoConfig;
use echo_lib::{logging, server};

#[tokio::main]
async fn main() -> echo_lib::Result<()> {
    let config = EchoConfig::from_env()?;

    if let Err(e) = logging::init_logging(config.log_dir.as_deref()) {
        eprintln!("Failed to initialize logging: {}", e);
    }
    if let Some(dir) = &config.log_dir {
        let _ = logging::cleanup_old_logs(dir);
    }

    server::serve(&config).await
}
