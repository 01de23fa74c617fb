use anyhow::Result;
use podaac::{Client, DatasetSearch, GranuleSearch};

fn main() -> Result<()> {
    env_logger::init();

    let client = Client::from_env()?;
    let podaac = client.podaac();

    let feed = podaac.dataset_search(&DatasetSearch {
        keyword: "ascat".to_string(),
        ..DatasetSearch::dataset("PODAAC-ASOP2-25X01")
    })?;
    let parsed = feed.parse()?;
    println!(
        "{} ({} result(s))",
        parsed.title.unwrap_or_default(),
        parsed.total_results.unwrap_or_default()
    );
    for entry in &parsed.entries {
        println!("  {} {}", entry.dataset_id.as_deref().unwrap_or("-"), entry.title);
    }

    let granules = podaac.granule_search(&GranuleSearch {
        start_time: "2014-05-20T00:00:00Z".to_string(),
        end_time: "2014-05-21T00:00:00Z".to_string(),
        ..GranuleSearch::dataset("PODAAC-ASOP2-25X01")
    })?;
    for entry in granules.entries()? {
        let opendap = entry.link_titled("OPeNDAP URL").map(|l| l.href.as_str());
        println!("  {} {}", entry.title, opendap.unwrap_or("-"));
    }
    Ok(())
}
