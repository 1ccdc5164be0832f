use anyhow::Result;
use sgapi::{TmyClient, TmyRequest};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    // Configure the key via SGAPI_TMY_KEY or `tmy_key:` in a `.sgapirc` file.
    let mut client = TmyClient::from_env("solargis-tmy")?.with_dataframes(true);
    client.add_request(
        TmyRequest::new("Pro example Site", 48.61259, 20.827079)
            .file_label("pro_01")
            .tmy_scenario("P50")
            .output_formats(["SOLARGIS_CSV", "SOLARGIS_JSON", "SAM", "HELIOSCOPE"]),
    );

    let report = client.retrieve_all_data(true).await;
    for (name, dataset) in client.datasets() {
        if let Some(frame) = &dataset.frame {
            println!("{name}: {} hourly rows, columns {:?}", frame.len(), frame.columns());
        }
        println!("{name}: archive saved to {:?}", dataset.saved);
    }
    for (name, err) in &report.failed {
        eprintln!("{name}: {err}");
    }
    Ok(())
}
