use tracing::info;

use clap::{value_t, App, Arg};

use tradenet::server::{node, Settings};
use tradenet::{Error, Result};

use std::path::PathBuf;

fn default_settings_path() -> PathBuf {
    dirs::home_dir().unwrap_or_default().join(".tradenet").join("settings.json")
}

fn main() -> Result<()> {
    let matches = App::new("tradenet")
        .version("0.1")
        .author("zero.fx labs ltd.")
        .about("Runs a trading network node")
        .arg(
            Arg::with_name("settings")
                .short("s")
                .long("settings")
                .value_name("SETTINGS")
                .takes_value(true),
        )
        .arg(Arg::with_name("port").short("p").long("port").value_name("PORT").takes_value(true))
        .get_matches();

    let settings_path = match matches.value_of("settings") {
        Some(path) => PathBuf::from(path),
        None => default_settings_path(),
    };
    let mut settings = Settings::load(&settings_path)?;
    if matches.is_present("port") {
        settings.port = value_t!(matches.value_of("port"), u16).unwrap_or_else(|e| e.exit());
    }

    tracing_subscriber::fmt()
        .with_level(false)
        .with_target(false)
        .without_time()
        .compact()
        .with_max_level(settings.log_level())
        .init();

    let sys = actix::System::new();
    let result = sys.block_on(async move {
        let running = node::run(settings).await?;

        let sig = if cfg!(unix) {
            use futures::future::FutureExt;
            use tokio::signal::unix::{signal, SignalKind};

            let mut sigint = signal(SignalKind::interrupt())?;
            let mut sigterm = signal(SignalKind::terminate())?;

            futures::select! {
                _ = sigint.recv().fuse() => "SIGINT",
                _ = sigterm.recv().fuse() => "SIGTERM"
            }
        } else {
            tokio::signal::ctrl_c().await?;
            "Ctrl+C"
        };
        info!(target: "tradenet", "Got {}, stopping...", sig);

        running.network_node.shut_down_gracefully().await;
        info!(target: "tradenet", "Network node shut down");
        actix::System::current().stop();
        Ok::<(), Error>(())
    });
    result?;
    sys.run()?;

    Ok(())
}
