//! Retrieval preview.
//!
//! `pdfchat search "<question>"` runs the same context assembly a chat turn
//! would and prints what was found, without calling the chat model.

use anyhow::Result;

use crate::config::Config;
use crate::context::{AssembledContext, RetrievalOutcome};
use crate::models::{QueryHit, META_CHUNK_INDEX, META_FILENAME, META_ROLE};
use crate::pipeline::Pipeline;

pub async fn run_search(config: &Config, query: &str, show_context: bool) -> Result<()> {
    if query.trim().is_empty() {
        anyhow::bail!("query must not be empty");
    }

    let pipeline = Pipeline::open(config).await?;
    let assembled = pipeline.assembler().assemble(query).await;
    pipeline.close().await;
    let assembled = assembled?;

    print_context(&assembled, show_context);
    Ok(())
}

fn print_context(ctx: &AssembledContext, show_context: bool) {
    print_section("PDF chunks", &ctx.pdf_outcome, |hit| {
        let filename = hit
            .metadata
            .get(META_FILENAME)
            .and_then(|v| v.as_str())
            .unwrap_or("?");
        let index = hit
            .metadata
            .get(META_CHUNK_INDEX)
            .and_then(|v| v.as_i64())
            .unwrap_or(-1);
        format!("{} #{}", filename, index)
    });
    print_section("Conversation history", &ctx.conversation_outcome, |hit| {
        hit.metadata
            .get(META_ROLE)
            .and_then(|v| v.as_str())
            .unwrap_or("?")
            .to_string()
    });

    if show_context {
        println!("Context block:");
        if ctx.is_empty() {
            println!("    (empty)");
        } else {
            for line in ctx.context_text.lines() {
                println!("    {}", line);
            }
        }
        println!();
    }
}

fn print_section(title: &str, outcome: &RetrievalOutcome, label: impl Fn(&QueryHit) -> String) {
    println!("{}:", title);
    match outcome {
        RetrievalOutcome::Empty => println!("    No results."),
        RetrievalOutcome::Failed(reason) => println!("    retrieval failed: {}", reason),
        RetrievalOutcome::Found(hits) => {
            for (i, hit) in hits.iter().enumerate() {
                println!("{}. [{:.3}] {}", i + 1, hit.distance, label(hit));
                println!(
                    "    excerpt: \"{}\"",
                    excerpt(&hit.text, 160).replace('\n', " ").trim()
                );
                println!("    id: {}", hit.id);
            }
        }
    }
    println!();
}

/// First `max_chars` characters of `text`, with an ellipsis when cut.
fn excerpt(text: &str, max_chars: usize) -> String {
    let mut out: String = text.chars().take(max_chars).collect();
    if text.chars().nth(max_chars).is_some() {
        out.push_str("...");
    }
    out
}
