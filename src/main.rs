use clap::Parser;
use dicom_query::config::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = cli.load_config()?;
    dicom_query::run(config).await
}
