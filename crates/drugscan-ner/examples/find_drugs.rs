//! Drug-name recognition demo
//!
//! Run with: cargo run --example find_drugs -- [dataset.json] [words...]
//!
//! Without arguments a small built-in dictionary and sentence are used.

use drugscan_ner::{DrugDataset, DrugEngine, MatchOptions};
use tracing_subscriber::EnvFilter;

fn demo_dataset() -> anyhow::Result<DrugDataset> {
    let dataset = DrugDataset::from_json_str(
        r#"{
            "schema_version": 1,
            "variant_to_canonical": {
                "tylenol": ["acetaminophen"],
                "paracetamol": ["acetaminophen"],
                "vitamin d": ["cholecalciferol"],
                "ibuprofen": ["ibuprofen"]
            },
            "canonical_to_data": {
                "acetaminophen": {"name": "Acetaminophen", "drugbank_id": "DB00316"},
                "cholecalciferol": {"name": "Cholecalciferol", "drugbank_id": "DB00169"},
                "ibuprofen": {"name": "Ibuprofen", "drugbank_id": "DB01050"}
            }
        }"#,
    )?;
    Ok(dataset)
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut args = std::env::args().skip(1);
    let dataset = match args.next() {
        Some(path) => DrugDataset::from_path(path.as_ref())?,
        None => demo_dataset()?,
    };
    let mut tokens: Vec<String> = args.collect();
    if tokens.is_empty() {
        tokens = "Patient was told to take Tylenol and vitamin D but took ibuprofin instead"
            .split_whitespace()
            .map(str::to_string)
            .collect();
    }

    let engine = DrugEngine::builder().dataset(dataset).build()?;
    let stats = engine.stats();
    println!(
        "=== Dictionary: {} variants, {} drugs ===\n",
        stats.variants, stats.canonicals
    );

    println!("Tokens: {:?}\n", tokens);
    let matches = engine.find_matches(&tokens, &MatchOptions::default().fuzzy(true));
    if matches.is_empty() {
        println!("No drugs found.");
    }
    for m in &matches {
        println!(
            "  [{:>2}, {:>2})  {:<20} -> {:<16} similarity {:.2}{}",
            m.start,
            m.end,
            m.matching_string().unwrap_or_default(),
            m.name().unwrap_or(&m.canonical_id),
            m.similarity(),
            if m.is_fuzzy() { " (fuzzy)" } else { "" }
        );
    }

    Ok(())
}
