use anyhow::Result;

use crate::cli::OutputFormat;
use sensei_browser::PriceSession;

pub async fn run(name: &str, format: OutputFormat) -> Result<()> {
    let session = PriceSession::new()?;
    let quotes = session.fetch_prices(name).await?;

    if format.is_json() {
        println!("{}", serde_json::to_string_pretty(&quotes)?);
        return Ok(());
    }

    if quotes.is_empty() {
        println!("No price quotes found for {name}.");
        return Ok(());
    }

    println!("Price quotes for {name}:");
    for (index, quote) in quotes.iter().enumerate() {
        println!("{}. {}", index + 1, quote.title);
        println!("   price: {}", quote.price.as_deref().unwrap_or("n/a"));
        if let Some(url) = &quote.url {
            println!("   url:   {url}");
        }
    }

    Ok(())
}
