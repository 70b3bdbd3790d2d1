use pgfixture::resources::{
    DirectoryStore, EmbeddedStore, MemoryStore, ResourceStore, ScriptResource, discover_scripts,
    read_test_script,
};
use rust_embed::RustEmbed;
use std::fs;
use tempfile::TempDir;

#[derive(RustEmbed)]
#[folder = "tests/fixtures/sql/"]
struct OrderScripts;

fn sorted(mut scripts: Vec<ScriptResource>) -> Vec<String> {
    scripts.sort_by(|a, b| a.name.cmp(&b.name));
    scripts.into_iter().map(|s| s.name).collect()
}

#[test]
fn test_embedded_store_discovery() {
    let store = EmbeddedStore::<OrderScripts>::new("Orders");

    let names = sorted(discover_scripts(&store, "Orders"));
    assert_eq!(
        names,
        vec![
            "Procedures.ArchiveOrders",
            "Tables.Customers",
            "Tables.Orders",
            "TestScripts.SeedCustomers",
            "Views.OrderTotals",
        ]
    );

    let tables = sorted(discover_scripts(&store, "Orders.Tables"));
    assert_eq!(tables, vec!["Customers", "Orders"]);
}

#[test]
fn test_embedded_store_reads_content() {
    let store = EmbeddedStore::<OrderScripts>::new("Orders");

    let content = read_test_script(&store, "Orders.TestScripts", "SeedCustomers").unwrap();
    assert!(content.starts_with("INSERT INTO customers"));
    assert!(store.read_resource("Orders.README.md").is_some());
    assert!(store.read_resource("Orders.Tables.Missing.sql").is_none());
}

#[test]
fn test_directory_store_matches_embedded_store() {
    let directory = DirectoryStore::new(concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/sql"))
        .with_namespace("Orders");
    let embedded = EmbeddedStore::<OrderScripts>::new("Orders");

    assert_eq!(
        sorted(discover_scripts(&directory, "Orders")),
        sorted(discover_scripts(&embedded, "Orders"))
    );
}

#[test]
fn test_directory_store_strips_bom_and_skips_other_files() {
    let dir = TempDir::new().unwrap();
    fs::create_dir_all(dir.path().join("Schema/Tables")).unwrap();
    fs::write(
        dir.path().join("Schema/Tables/Users.sql"),
        b"\xEF\xBB\xBFCREATE TABLE users (id INT);",
    )
    .unwrap();
    fs::write(dir.path().join("Schema/Tables/notes.txt"), "not a script").unwrap();

    let store = DirectoryStore::new(dir.path());
    let scripts = discover_scripts(&store, "Schema");

    assert_eq!(
        scripts,
        vec![ScriptResource::new("Tables.Users", "CREATE TABLE users (id INT);")]
    );
}

#[test]
fn test_missing_directory_yields_nothing() {
    let store = DirectoryStore::new("/definitely/not/a/real/path");
    assert!(discover_scripts(&store, "").is_empty());
}

#[test]
fn test_unreadable_resources_are_skipped() {
    let mut store = MemoryStore::new();
    store.insert("NS.Tables.Table1.sql", "T1");
    store.insert_unreadable("NS.Tables.Table2.sql");

    assert_eq!(
        discover_scripts(&store, "NS"),
        vec![ScriptResource::new("Tables.Table1", "T1")]
    );
}
