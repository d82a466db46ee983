use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::Parser;
use colored::*;
use url::Url;

use page_media_downloader::cli::MediaCommand;
use page_media_downloader::file_manager::resolve_output_dir;
use page_media_downloader::logging::init_logging;
use page_media_downloader::MediaDownloader;

const USAGE_EXAMPLE: &str = "Example: media-dl https://example.com --output ./my-media";

#[tokio::main]
async fn main() -> Result<()> {
    let args = match MediaCommand::try_parse() {
        Ok(args) => args,
        Err(e) if e.kind() == ErrorKind::MissingRequiredArgument => {
            eprintln!("{}", e);
            eprintln!("{}", USAGE_EXAMPLE);
            std::process::exit(1);
        }
        Err(e) => e.exit(),
    };

    init_logging(args.verbose)?;

    // Failures past argument parsing are reported but still exit 0.
    if let Err(e) = run(&args).await {
        tracing::debug!("Run failed: {:?}", e);
        eprintln!("{}", format!("❌ Error: {:#}", e).red());
    }

    Ok(())
}

async fn run(args: &MediaCommand) -> Result<()> {
    let target = Url::parse(&args.url).with_context(|| format!("Invalid URL: {}", args.url))?;
    let output_dir = resolve_output_dir(args.output.as_deref(), &target)?;

    let downloader = MediaDownloader::new(args.to_config(output_dir))?;
    let summary = downloader.run(target.as_str()).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        summary.print();
        println!("✅ All media downloaded to {:?}", summary.output_dir);
    }

    Ok(())
}
