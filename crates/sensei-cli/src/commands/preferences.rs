use anyhow::Result;

use crate::cli::OutputFormat;
use sensei_memory::{MemoryContext, PreferenceResolver, SearchHit};

pub async fn run(
    region: &str,
    memory_id: &str,
    actor: &str,
    session: Option<&str>,
    query: &str,
    format: OutputFormat,
) -> Result<()> {
    let ctx = match session {
        Some(session_id) => MemoryContext::new(memory_id, actor, session_id),
        None => MemoryContext::for_actor(memory_id, actor),
    };

    let resolver = PreferenceResolver::new(super::backend(region));
    let result = resolver.resolve_preferences(&ctx, query).await?;

    if format.is_json() {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    if result.is_empty() {
        println!("No stored preferences found.");
        return Ok(());
    }

    if !result.long_term.is_empty() {
        println!("Long-term preferences:");
        print_hits(&result.long_term);
    }
    if !result.short_term.is_empty() {
        println!("Recent conversation:");
        print_hits(&result.short_term);
    }
    if result.partial {
        println!("(partial result: one memory tier was unavailable)");
    }

    Ok(())
}

fn print_hits(hits: &[SearchHit]) {
    for hit in hits {
        match hit.score {
            Some(score) => println!("  [{score:.2}] {}", hit.content),
            None => println!("  {}", hit.content),
        }
    }
}
