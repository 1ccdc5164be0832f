use anyhow::Result;
use futures::StreamExt;
use sgapi::{TimeSeriesClient, TimeSeriesRequest};

const YEARLY: &str = "P1Y";
const HOURLY: &str = "PT60M";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    // Configure the key via SGAPI_TS_KEY or `ts_key:` in a `.sgapirc` file.
    let mut client = TimeSeriesClient::from_env("solargis-ts")?;
    client.add_request(
        TimeSeriesRequest::new("Linz", 48.275231, 14.26934)
            .time_step(YEARLY)
            .parameters(["GHI", "DNI", "DIF", "GHI_NOSHD", "DNI_NOSHD", "DIF_NOSHD", "TEMP"]),
    );
    client.add_request(
        TimeSeriesRequest::new("Kosice", 48.61259, 20.827079)
            .time_step(HOURLY)
            .from_date("2024-01-01")
            .to_date("2024-01-31"),
    );

    // Handle each site as soon as it is ready while the others keep polling.
    let mut results = Box::pin(client.retrieve_data(true));
    while let Some((name, outcome)) = results.next().await {
        match outcome {
            Ok(dataset) => {
                let rows = dataset.frame.as_ref().map_or(0, |f| f.len());
                println!("{name}: {rows} rows, saved {:?}", dataset.saved);
            }
            Err(e) => eprintln!("{name}: {e}"),
        }
    }
    Ok(())
}
