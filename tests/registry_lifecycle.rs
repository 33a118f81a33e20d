use std::{sync::Arc, thread};

use chrono::{TimeZone, Utc};
use indexkit::{
    AnalyzerChain,
    DataDir,
    Document,
    EngineSettings,
    Error,
    FieldOptions,
    IndexEngine,
    IndexRegistry,
    MAX_CLAUSES,
    SearchBit,
};
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let filter = std::env::var("INDEXKIT_LOG")
        .map(EnvFilter::new)
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .without_time()
        .with_test_writer()
        .try_init();
}

fn open_registry(
    data_dir: &std::path::Path,
) -> Result<IndexRegistry, Box<dyn std::error::Error>> {
    init_tracing();
    let data_dir = DataDir::resolve(Some(data_dir))?;
    let settings = EngineSettings::from_data_dir(&data_dir)?
        .with_writer_memory_budget(15_000_000);
    Ok(IndexRegistry::new(settings, AnalyzerChain::new()))
}

fn product(
    engine: &IndexEngine,
    id: &str,
    name: &str,
    price: f64,
    stock: i32,
) -> Document {
    let mut doc = engine.new_document(id);
    doc.set_text("name", name, FieldOptions::STORE | FieldOptions::ANALYZE)
        .set_number("price", price, FieldOptions::STORE)
        .set_integer("stock", stock, FieldOptions::STORE)
        .set_boolean("available", stock > 0, FieldOptions::STORE)
        .set_date_time(
            "updated",
            Utc.with_ymd_and_hms(2024, 3, 1, 8, 30, 0).unwrap(),
            FieldOptions::STORE,
        );
    doc
}

#[test]
fn full_lifecycle() -> Result<(), Box<dyn std::error::Error>> {
    let tempdir = tempfile::tempdir()?;
    let registry = open_registry(tempdir.path())?;

    let products = registry.get_or_create("Products")?;
    assert!(products.path().starts_with(tempdir.path().join("Search")));
    assert!(products.is_empty()?);

    products.store_documents(&[
        product(&products, "p1", "Red running shoes", 79.5, 4),
        product(&products, "p2", "Blue running jacket", 120.0, 0),
        product(&products, "p3", "Red wool hat", 19.0, 12),
    ])?;
    assert_eq!(products.total_documents()?, 3);

    let hits = products
        .create_search_builder()
        .text("name", "red")
        .term("available", true)
        .range_f64("price", None, Some(50.0))
        .search()?;
    assert_eq!(hits.len(), 1);
    let hat = &hits[0];
    assert_eq!(hat.document_id(), "p3");
    assert_eq!(hat.get_string("name"), "Red wool hat");
    assert_eq!(hat.get_int("stock"), 12);
    assert_eq!(hat.get_double("price"), 19.0);
    assert!(hat.get_boolean("available"));
    assert_eq!(
        hat.get_date_time("updated"),
        Utc.with_ymd_and_hms(2024, 3, 1, 8, 30, 0).unwrap()
    );
    assert_eq!(hat.get_string("missing"), "");

    // Upsert replaces p2 and leaves the count unchanged.
    products.store_documents(&[product(
        &products,
        "p2",
        "Blue running jacket",
        99.0,
        3,
    )])?;
    assert_eq!(products.total_documents()?, 3);
    let running = products
        .create_search_builder()
        .text("name", "running")
        .term("available", true)
        .count()?;
    assert_eq!(running, 2);

    let report = products.delete_documents(&["p1", "p3"])?;
    assert!(report.is_complete());
    assert_eq!(products.total_documents()?, 1);

    registry.delete("products")?;
    assert!(!registry.exists("Products"));
    assert!(!products.path().exists());
    assert!(matches!(
        products.store_documents(&[]),
        Err(Error::Disposed { .. })
    ));

    Ok(())
}

#[test]
fn large_batches_are_deleted_in_pages()
-> Result<(), Box<dyn std::error::Error>> {
    let tempdir = tempfile::tempdir()?;
    let registry = open_registry(tempdir.path())?;
    let engine = registry.get_or_create("bulk")?;

    let docs: Vec<Document> = (0..=MAX_CLAUSES)
        .map(|i| {
            let mut doc = engine.new_document(format!("doc-{i}"));
            doc.set_integer("n", i as i32, FieldOptions::NONE);
            doc
        })
        .collect();
    engine.store_documents(&docs)?;
    assert_eq!(engine.total_documents()?, (MAX_CLAUSES + 1) as i64);

    // Re-storing the whole batch replaces rather than duplicates.
    engine.store_documents(&docs)?;
    assert_eq!(engine.total_documents()?, (MAX_CLAUSES + 1) as i64);

    let ids: Vec<&str> = docs.iter().map(Document::id).collect();
    let report = engine.delete_documents(&ids)?;
    assert_eq!(report.pages, 2);
    assert_eq!(report.failed_pages, 0);
    assert_eq!(engine.total_documents()?, 0);

    Ok(())
}

#[test]
fn bitsets_from_separate_queries_combine()
-> Result<(), Box<dyn std::error::Error>> {
    let tempdir = tempfile::tempdir()?;
    let registry = open_registry(tempdir.path())?;
    let engine = registry.get_or_create("catalog")?;

    engine.store_documents(&[
        product(&engine, "p1", "Red shoes", 80.0, 1),
        product(&engine, "p2", "Red hat", 20.0, 0),
        product(&engine, "p3", "Green hat", 25.0, 5),
    ])?;

    let red = engine.create_search_builder().text("name", "red").bits()?;
    let hats = engine.create_search_builder().text("name", "hat").bits()?;
    let in_stock = engine
        .create_search_builder()
        .range_i64("stock", Some(1), None)
        .bits()?;

    assert_eq!(red.and(&hats)?.count(), 1);
    assert_eq!(red.or(&hats)?.count(), 3);
    assert_eq!(red.xor(&hats)?.count(), 2);
    assert_eq!(red.or(&hats)?.and(&in_stock)?.count(), 2);
    assert_eq!(red.count(), 2);

    Ok(())
}

#[test]
fn concurrent_writers_and_readers() -> Result<(), Box<dyn std::error::Error>>
{
    let tempdir = tempfile::tempdir()?;
    let registry = Arc::new(open_registry(tempdir.path())?);

    let handles: Vec<_> = (0..4)
        .map(|worker| {
            let registry = Arc::clone(&registry);
            thread::spawn(move || -> indexkit::Result<()> {
                let engine = registry.get_or_create("shared")?;
                for i in 0..5 {
                    let mut doc = engine.new_document(format!("{worker}-{i}"));
                    doc.set_integer("worker", worker, FieldOptions::STORE);
                    engine.store_documents(&[doc])?;
                    let seen = engine.total_documents()?;
                    assert!(seen >= i64::from(i + 1));
                }
                Ok(())
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("writer thread panicked")?;
    }

    let engine = registry.get_or_create("shared")?;
    assert_eq!(engine.total_documents()?, 20);
    assert_eq!(engine.create_search_builder().term("worker", 2).count()?, 5);

    Ok(())
}

#[test]
fn indexes_survive_a_new_registry() -> Result<(), Box<dyn std::error::Error>>
{
    let tempdir = tempfile::tempdir()?;
    {
        let registry = open_registry(tempdir.path())?;
        let engine = registry.get_or_create("notes")?;
        engine.store_documents(&[product(&engine, "n1", "Kept", 1.0, 1)])?;
    }

    let registry = open_registry(tempdir.path())?;
    assert!(!registry.exists("notes"));
    assert!(registry.exists_on_disk("notes"));

    let engine = registry.get_or_create("notes")?;
    assert_eq!(engine.total_documents()?, 1);
    assert_eq!(registry.list(), vec!["notes".to_string()]);

    Ok(())
}
