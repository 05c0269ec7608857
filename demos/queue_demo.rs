//! Queue demo
//!
//! Resolves a URL given on the command line (a single video or a playlist),
//! downloads every resulting job with the default parameters and prints events
//! until the queue drains or a termination signal arrives.
//!
//! ```bash
//! RUST_LOG=media_dl=debug cargo run --example queue_demo -- https://www.youtube.com/watch?v=dQw4w9WgXcQ
//! ```

use media_dl::{Config, Event, MediaDownloader, run_with_shutdown};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let url = std::env::args()
        .nth(1)
        .ok_or("usage: queue_demo <url>")?;

    let config = Config::default();
    let downloader = MediaDownloader::new(config).await?;

    // Install the engine on first run
    if downloader.ensure_engine().await? {
        println!("Installed engine {:?}", downloader.engine_version().await);
    }

    let mut events = downloader.subscribe();

    let ids = downloader.add_url(&url).await?;
    println!("Queued {} job(s)", ids.len());

    let params = downloader.default_launch_params().await;
    downloader.start_all(params).await?;

    let drain = async move {
        let mut remaining = ids.len();
        while remaining > 0 {
            match events.recv().await {
                Ok(Event::Progress { id, percent, speed, .. }) => {
                    println!("[{id}] {percent:5.1}% {}", speed.unwrap_or_default());
                }
                Ok(Event::Completed { id, output_path }) => {
                    println!("[{id}] done: {output_path:?}");
                    remaining -= 1;
                }
                Ok(Event::Failed { id, error, .. }) => {
                    println!("[{id}] failed: {error}");
                    remaining -= 1;
                }
                Ok(Event::Interrupted { id }) => {
                    println!("[{id}] paused after blocked access");
                    remaining -= 1;
                }
                Ok(Event::EngineUpdateSuggested { message, .. }) => println!("{message}"),
                Ok(_) => {}
                Err(e) => {
                    println!("event stream error: {e}");
                    break;
                }
            }
        }
    };

    tokio::select! {
        _ = drain => downloader.shutdown().await?,
        result = run_with_shutdown(downloader.clone()) => {
            println!("Interrupted, unfinished jobs were paused");
            result?;
        }
    }
    Ok(())
}
