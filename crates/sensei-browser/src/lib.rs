//! Shared browsing session for live sake price lookups.
//!
//! One long-lived browsing context (cookie jar, Japanese locale headers) is
//! reused across fetches to avoid repeated setup cost; each fetch builds
//! and drops its own page state. Concurrent fetches serialize on the shared
//! context so interleaved navigation cannot corrupt results. The memory
//! subsystem treats this crate as an opaque tool invocation.

use anyhow::{Context, Result};
use regex::Regex;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use serde::Serialize;
use std::sync::OnceLock;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

const SEARCH_BASE: &str = "https://www.amazon.co.jp";
const MAX_QUOTES: usize = 5;
const FETCH_TIMEOUT_SECS: u64 = 30;

/// One price quote extracted from a search result page.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PriceQuote {
    pub title: String,
    pub price: Option<String>,
    pub url: Option<String>,
}

/// Long-lived browsing session shared across price fetches.
pub struct PriceSession {
    client: Client,
    base_url: String,
    /// Serializes access to the shared context.
    gate: Mutex<()>,
}

impl PriceSession {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .cookie_store(true)
            .timeout(Duration::from_secs(FETCH_TIMEOUT_SECS))
            .user_agent("Mozilla/5.0 (X11; Linux x86_64) sake-sensei/0.2")
            .build()
            .context("failed to build browsing client")?;
        Ok(Self {
            client,
            base_url: SEARCH_BASE.to_string(),
            gate: Mutex::new(()),
        })
    }

    /// Override the search endpoint, e.g. for a local test server.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Fetch up to five live quotes for a sake by name.
    ///
    /// Holds the context guard across the whole fetch; callers queue rather
    /// than interleave.
    pub async fn fetch_prices(&self, sake_name: &str) -> Result<Vec<PriceQuote>> {
        let _guard = self.gate.lock().await;
        debug!(sake_name, "fetching price quotes");

        let query = format!("{sake_name} 日本酒");
        let url = format!(
            "{}/s?k={}&language=ja_JP",
            self.base_url,
            urlencoding::encode(&query),
        );
        let html = self
            .client
            .get(url)
            .header("Accept-Language", "ja-JP,ja;q=0.9")
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        Ok(extract_quotes(&html, &self.base_url))
    }
}

fn price_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"[¥￥]\s*[\d,]+").ok())
        .as_ref()
}

fn selector(rule: &str) -> Option<Selector> {
    Selector::parse(rule).ok()
}

/// Extract quotes from a search result page.
fn extract_quotes(html: &str, base_url: &str) -> Vec<PriceQuote> {
    let document = Html::parse_document(html);

    let Some(item_selector) = selector(r#"[data-component-type="s-search-result"]"#) else {
        return Vec::new();
    };
    let mut quotes = Vec::new();

    for item in document.select(&item_selector).take(MAX_QUOTES) {
        let Some(title) = extract_title(&item) else {
            continue;
        };
        quotes.push(PriceQuote {
            title,
            price: extract_price(&item),
            url: extract_url(&item, base_url),
        });
    }

    quotes
}

fn extract_title(item: &ElementRef) -> Option<String> {
    let element = item
        .select(&selector("h2 span")?)
        .next()
        .or_else(|| item.select(&selector("h2")?).next())?;
    let title = element.text().collect::<String>().trim().to_string();
    (!title.is_empty()).then_some(title)
}

fn extract_price(item: &ElementRef) -> Option<String> {
    if let Some(whole_selector) = selector(".a-price-whole")
        && let Some(whole) = item.select(&whole_selector).next()
    {
        let mut price = whole.text().collect::<String>().trim().to_string();
        if let Some(fraction_selector) = selector(".a-price-fraction")
            && let Some(fraction) = item.select(&fraction_selector).next()
        {
            price.push_str(fraction.text().collect::<String>().trim());
        }
        return Some(format!("¥{price}"));
    }

    // Fall back to scanning the item text for a yen amount.
    let text = item.text().collect::<String>();
    price_pattern()?
        .find(&text)
        .map(|m| m.as_str().replace(' ', ""))
}

fn extract_url(item: &ElementRef, base_url: &str) -> Option<String> {
    let link = item
        .select(&selector("h2 a")?)
        .next()
        .or_else(|| item.select(&selector("a.a-link-normal")?).next())?;
    let href = link.value().attr("href")?;

    if href.starts_with("http") {
        Some(href.to_string())
    } else if href.starts_with('/') {
        Some(format!("{base_url}{href}"))
    } else {
        Some(format!("{base_url}/{href}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RESULT_PAGE: &str = r#"
        <html><body>
        <div data-component-type="s-search-result">
            <h2><a href="/dp/B000TEST1"><span>獺祭 純米大吟醸 磨き二割三分</span></a></h2>
            <span class="a-price-whole">5,830</span>
        </div>
        <div data-component-type="s-search-result">
            <h2><a href="https://example.jp/kubota"><span>久保田 萬寿</span></a></h2>
            <p>本日限定 ￥ 9,680 送料無料</p>
        </div>
        <div data-component-type="s-search-result">
            <p>広告</p>
        </div>
        </body></html>
    "#;

    #[test]
    fn test_extract_quotes() {
        let quotes = extract_quotes(RESULT_PAGE, SEARCH_BASE);

        assert_eq!(quotes.len(), 2);
        assert_eq!(quotes[0].title, "獺祭 純米大吟醸 磨き二割三分");
        assert_eq!(quotes[0].price.as_deref(), Some("¥5,830"));
        assert_eq!(
            quotes[0].url.as_deref(),
            Some("https://www.amazon.co.jp/dp/B000TEST1")
        );

        // Second item has no price markup; the yen regex fallback applies.
        assert_eq!(quotes[1].price.as_deref(), Some("￥9,680"));
        assert_eq!(quotes[1].url.as_deref(), Some("https://example.jp/kubota"));
    }

    #[test]
    fn test_untitled_items_are_skipped() {
        let quotes = extract_quotes(RESULT_PAGE, SEARCH_BASE);
        assert!(quotes.iter().all(|quote| !quote.title.is_empty()));
    }

    #[test]
    fn test_quote_cap() {
        let mut page = String::from("<html><body>");
        for i in 0..8 {
            page.push_str(&format!(
                r#"<div data-component-type="s-search-result">
                   <h2><span>銘柄 {i}</span></h2></div>"#
            ));
        }
        page.push_str("</body></html>");

        let quotes = extract_quotes(&page, SEARCH_BASE);
        assert_eq!(quotes.len(), MAX_QUOTES);
    }
}
