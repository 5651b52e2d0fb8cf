//! Thin CLI front for rdx: init logging, load config, run the job, print the
//! acknowledgement.

use anyhow::{Context, Result};
use rdx::ReindexState;
use tracing::error;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // One optional positional arg: the config file path.
    let args: Vec<String> = std::env::args().collect();
    let path_arg = args.get(1).map(String::as_str).unwrap_or("rdx.toml");

    let config_file = std::path::Path::new(path_arg);
    let config_file = match config_file.try_exists().context(format!(
        "could not check for configuration file '{}'",
        config_file.display()
    ))? {
        true => Some(config_file),
        // No file is fine; RDX_* environment variables alone can carry a job.
        false => None,
    };

    let app_config = rdx::load_config(config_file).context("failed to load configuration")?;

    match rdx::run(app_config).await {
        Ok(ack) => {
            println!(
                "{}",
                serde_json::to_string_pretty(&ack).context("failed to render acknowledgement")?
            );
            if ack.state == ReindexState::Failed {
                std::process::exit(1);
            }
            Ok(())
        }
        Err(err) => {
            error!("error: {}", err);
            let mut looks_like_connection_trouble = false;
            for cause in err.chain().skip(1) {
                error!("cause: {}", cause);
                let cause_str = cause.to_string();
                if cause_str.contains("error sending request")
                    || cause_str.contains("connection refused")
                    || cause_str.contains("Connection refused")
                    || cause_str.contains("tcp connect error")
                    || cause_str.contains("dns error")
                {
                    looks_like_connection_trouble = true;
                }
            }
            if looks_like_connection_trouble {
                error!(
                    "hint: a cluster looks unreachable. Check that the destination \
                     (and the remote source, if configured) is running and that the \
                     configured URLs are correct."
                );
            }
            std::process::exit(1);
        }
    }
}
