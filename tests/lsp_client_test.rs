//! End-to-end tests for the crate's operation surface against a live
//! `rust-analyzer` session.
//!
//! To run these tests:
//! ```bash
//! # Run all end-to-end tests
//! cargo test --test lsp_client_test
//!
//! # Run with debug output
//! RUST_LOG=debug cargo test --test lsp_client_test -- --nocapture
//!
//! # Run a specific test
//! cargo test --test lsp_client_test test_goto_definition
//! ```
mod common;
use std::path::PathBuf;

use common::TestWorkspace;
use tokio_util::sync::CancellationToken;

// Helper to create fixture with cursor markers
fn create_fixture_with_cursor(
    cargo_toml: &str,
    main_rs: &str,
    lib_rs: &str,
    calculator_rs: &str,
    cursor_file: &str,
    cursor_pattern: &str,
) -> String {
    let main_with_cursor = if cursor_file == "main.rs" {
        main_rs.replacen(cursor_pattern, &format!("{}$0", cursor_pattern), 1)
    } else {
        main_rs.to_string()
    };

    let lib_with_cursor = if cursor_file == "lib.rs" {
        lib_rs.replacen(cursor_pattern, &format!("{}$0", cursor_pattern), 1)
    } else {
        lib_rs.to_string()
    };

    let calc_with_cursor = if cursor_file == "calculator.rs" {
        calculator_rs.replacen(cursor_pattern, &format!("{}$0", cursor_pattern), 1)
    } else {
        calculator_rs.to_string()
    };

    format!(
        r#"//- /Cargo.toml
{}
//- /src/main.rs
{}
//- /src/lib.rs
{}
//- /src/calculator.rs
{}
"#,
        cargo_toml, main_with_cursor, lib_with_cursor, calc_with_cursor
    )
}

fn comprehensive_fixture() -> String {
    let cargo_toml = include_str!("./fixtures/sample_project/Cargo.toml");
    let main_rs = include_str!("./fixtures/sample_project/src/main.rs");
    let lib_rs = include_str!("./fixtures/sample_project/src/lib.rs");
    let calculator_rs = include_str!("./fixtures/sample_project/src/calculator.rs");

    // Add cursor at the 'add' function call in main.rs
    create_fixture_with_cursor(cargo_toml, main_rs, lib_rs, calculator_rs, "main.rs", "add")
}

#[tokio::test]
async fn test_goto_definition() {
    let ws = TestWorkspace::builder()
        .fixture(&comprehensive_fixture())
        .open_all_files()
        .build()
        .await;

    // `let result = add(x, y);` — position at the start of 'add' (0-indexed: line 6, col 17).
    let locations = ws
        .engine()
        .definition(&PathBuf::from("src/main.rs"), 6, 17, &CancellationToken::new())
        .await
        .expect("definition should succeed");

    assert!(!locations.is_empty(), "should find a definition location for 'add'");
    assert!(
        locations[0].relative_path.ends_with("src/lib.rs"),
        "definition should be in lib.rs, found {:?}",
        locations[0].relative_path
    );
}

#[tokio::test]
async fn test_find_references() {
    let ws = TestWorkspace::builder()
        .fixture(&comprehensive_fixture())
        .open_all_files()
        .build()
        .await;

    // "pub fn add" in lib.rs (0-indexed: line 21, col 7).
    let result = ws
        .engine()
        .references(&PathBuf::from("src/lib.rs"), 21, 7, &CancellationToken::new())
        .await
        .expect("references should succeed");

    assert!(!result.is_empty(), "should find at least one reference to 'add'");
    assert!(
        result.iter().any(|loc| loc.relative_path.ends_with("src/main.rs")),
        "should have a reference in main.rs, found: {:?}",
        result.iter().map(|l| &l.relative_path).collect::<Vec<_>>()
    );
}

#[tokio::test]
async fn test_hover() {
    let ws = TestWorkspace::builder()
        .fixture(&comprehensive_fixture())
        .open_all_files()
        .build()
        .await;

    let result = ws
        .engine()
        .hover(&PathBuf::from("src/lib.rs"), 21, 7, &CancellationToken::new())
        .await
        .expect("hover should succeed");

    let hover = result.expect("should have hover information for 'add'");
    assert!(!hover.contents.is_empty(), "hover contents should not be empty");
}

#[tokio::test]
async fn test_document_symbols() {
    let ws = TestWorkspace::builder()
        .fixture(&comprehensive_fixture())
        .open_all_files()
        .build()
        .await;

    let (symbols, _tree) = ws
        .engine()
        .document_symbols(&PathBuf::from("src/lib.rs"), &CancellationToken::new())
        .await
        .expect("document_symbols should succeed");

    assert!(!symbols.is_empty(), "should find symbols in lib.rs");
    assert!(symbols.iter().any(|s| s.name == "add"), "should find 'add' function in symbols");
    assert!(symbols.iter().any(|s| s.name == "subtract"));
    assert!(symbols.iter().any(|s| s.name == "multiply"));
    assert!(symbols.iter().any(|s| s.name == "Point"));
}

#[tokio::test]
async fn test_parsed_files_includes_all_fixture_sources() {
    let ws = TestWorkspace::builder()
        .fixture(&comprehensive_fixture())
        .open_all_files()
        .build()
        .await;

    let files = ws
        .engine()
        .parsed_files(&CancellationToken::new())
        .await
        .expect("parsed_files should succeed");

    let names: Vec<String> = files
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();

    assert!(names.contains(&"lib.rs".to_string()));
    assert!(names.contains(&"main.rs".to_string()));
    assert!(names.contains(&"calculator.rs".to_string()));
}

#[tokio::test]
async fn test_defining_symbol_for_call_site() {
    let ws = TestWorkspace::builder()
        .fixture(&comprehensive_fixture())
        .open_all_files()
        .build()
        .await;

    let defining = ws
        .engine()
        .defining_symbol(&PathBuf::from("src/main.rs"), 6, 17, &CancellationToken::new())
        .await
        .expect("defining_symbol should succeed")
        .expect("'add' call should resolve to a defining symbol");

    assert_eq!(defining.name, "add");
}

#[tokio::test]
async fn test_referencing_symbols_for_add() {
    let ws = TestWorkspace::builder()
        .fixture(&comprehensive_fixture())
        .open_all_files()
        .build()
        .await;

    let referencing = ws
        .engine()
        .referencing_symbols(&PathBuf::from("src/lib.rs"), 21, 7, false, false, &CancellationToken::new())
        .await
        .expect("referencing_symbols should succeed");

    assert!(
        !referencing.is_empty(),
        "'add' should be referenced from at least one other symbol"
    );
}

#[tokio::test]
async fn test_multiple_operations() {
    let ws = TestWorkspace::builder()
        .fixture(&comprehensive_fixture())
        .open_all_files()
        .build()
        .await;

    let lib_path = PathBuf::from("src/lib.rs");
    let cancel = CancellationToken::new();

    let _symbols = ws
        .engine()
        .document_symbols(&lib_path, &cancel)
        .await
        .expect("document_symbols should succeed");

    let _hover = ws
        .engine()
        .hover(&lib_path, 21, 7, &cancel)
        .await
        .expect("hover should succeed");

    let _refs = ws
        .engine()
        .references(&lib_path, 21, 7, &cancel)
        .await
        .expect("references should succeed");
}

#[tokio::test]
async fn test_document_symbols_lib_rs_reexports() {
    let ws = TestWorkspace::builder()
        .fixture(&comprehensive_fixture())
        .open_all_files()
        .build()
        .await;

    let (symbols, _tree) = ws
        .engine()
        .document_symbols(&PathBuf::from("src/lib.rs"), &CancellationToken::new())
        .await
        .expect("document_symbols should succeed");

    let names: Vec<&str> = symbols.iter().map(|s| s.name.as_str()).collect();

    // Physically defined in lib.rs.
    assert!(names.contains(&"add"));
    assert!(names.contains(&"subtract"));
    assert!(names.contains(&"multiply"));
    assert!(names.contains(&"Point"));

    // Re-exported from the calculator module, not physically defined here.
    assert!(!names.contains(&"Adder"), "re-exported items should not appear as document symbols");
    assert!(!names.contains(&"Calculator"));
    assert!(!names.contains(&"Multiplier"));
}

#[tokio::test]
async fn test_stop_succeeds_with_open_buffers() {
    let ws = TestWorkspace::builder()
        .fixture(&comprehensive_fixture())
        .open_all_files()
        .build()
        .await;

    ws.engine().stop().await.expect("stop should succeed");
}
