use anyhow::Result;
use podaac::{Client, PollOptions};
use serde_json::json;
use std::path::Path;
use std::time::Duration;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // Base URLs come from env vars or a `podaac.ini` file.
    let client = Client::from_env()?.with_progress(true)?;

    let query = json!({
        "email": "",
        "query": [{
            "compact": true,
            "datasetId": "PODAAC-ASOP2-25X01",
            "bbox": "-180,-90,180,90",
            "variables": ["lat", "lon", "time", "wind_speed"],
            "granuleIds": ["ascat_20140520_005700_metopa_39344_eps_o_250_2300_ovw.l2.nc"]
        }]
    });

    let options = PollOptions::default()
        .with_interval(Duration::from_secs(2))
        .with_timeout(Duration::from_secs(15 * 60));
    let name = client
        .podaac()
        .subset_and_download(&query, Some(Path::new("subsets")), &options)?;
    println!("subset written to subsets/{}", name);
    Ok(())
}
