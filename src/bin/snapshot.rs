//! One-shot snapshot: fetch, rank and print the top symbols, then exit.
//!
//! Usage: `snapshot [post_limit] [top_n]` (defaults come from the tracker config).

use anyhow::Context;
use ticker_sentiment_tracker::insights::market_insights;
use ticker_sentiment_tracker::{Pipeline, TrackerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt().with_target(false).init();

    let cfg = TrackerConfig::load_default().context("loading tracker config")?;
    let mut args = std::env::args().skip(1);
    let post_limit = match args.next() {
        Some(a) => a.parse().context("post_limit must be a number")?,
        None => cfg.default_post_limit,
    };
    let top_n = match args.next() {
        Some(a) => a.parse().context("top_n must be a number")?,
        None => cfg.default_top_n,
    };

    let pipeline = Pipeline::from_config(&cfg)?;
    let run = pipeline.run(post_limit, top_n, false).await?;

    println!(
        "{} posts as of {}{}",
        run.source_post_count,
        run.as_of.format("%Y-%m-%d %H:%M UTC"),
        if run.stale { " (stale)" } else { "" }
    );
    println!("{:<4} {:<8} {:>8} {:>9}  category", "#", "symbol", "mentions", "compound");
    for (i, r) in run.results.iter().enumerate() {
        println!(
            "{:<4} {:<8} {:>8} {:>9.3}  {:?}",
            i + 1,
            r.symbol,
            r.mention_count,
            r.sentiment.compound,
            r.sentiment.category
        );
    }

    let insights = market_insights(&run.results);
    println!("\nmood: {:?} (avg {:.3})", insights.mood, insights.avg_sentiment);
    for rec in &insights.recommendations {
        println!("- {rec}");
    }
    Ok(())
}
