use std::fs;
use std::sync::Arc;

use cg_core::{CancelToken, QueryMode, SymbolQuery};
use cg_indexer::{IndexBuilder, IndexConfig, IndexerError};
use cg_parser::TreeSitterParser;
use cg_storage::{check_consistency, MemoryStorage, SymbolStore};

fn builder_with(config: IndexConfig) -> Arc<IndexBuilder> {
    let store = Arc::new(SymbolStore::open(Arc::new(MemoryStorage::new())).unwrap());
    Arc::new(IndexBuilder::new(
        store,
        Arc::new(TreeSitterParser::new()),
        config,
    ))
}

fn write_fixture(root: &std::path::Path) {
    let src = root.join("src");
    fs::create_dir_all(&src).unwrap();
    fs::write(
        src.join("lib.rs"),
        "pub fn helper() -> u32 { 42 }\n\npub struct Config { pub retries: u32 }\n",
    )
    .unwrap();
    fs::write(
        src.join("main.rs"),
        "fn main() {\n    let n = helper();\n    let _ = n;\n}\n",
    )
    .unwrap();
    fs::write(root.join("tool.py"), "def run():\n    pass\n").unwrap();
    fs::write(root.join("README.md"), "# fixture\n").unwrap();
}

#[test]
fn full_build_extracts_symbols_and_references() {
    let tmp = tempfile::TempDir::new().unwrap();
    write_fixture(tmp.path());

    let builder = builder_with(IndexConfig {
        workers: 2,
        ..Default::default()
    });
    let cancel = CancelToken::new();
    let report = builder.build_index(tmp.path(), &cancel).unwrap();

    // Three source files processed; README.md has no grammar.
    assert_eq!(report.files_processed, 3);
    assert_eq!(report.files_skipped, 1);
    assert_eq!(report.files_errored, 0);
    assert!(report.symbols_indexed >= 4);

    let store = builder.store();
    let helper = store
        .search_symbols(&SymbolQuery::new(QueryMode::ByName("helper".to_string())))
        .unwrap();
    assert_eq!(helper.symbols.len(), 1);
    let helper = &helper.symbols[0];
    assert_eq!(helper.file_path, "src/lib.rs");

    // main.rs calls helper(); phase 2 must have recorded it.
    let refs = store.get_references_for_symbol(&helper.id).unwrap();
    assert_eq!(refs.len(), 1);
    assert_eq!(refs[0].file_path, "src/main.rs");
    assert_eq!(refs[0].line, 2);

    // Metadata rows exist for every processed file.
    let files = store.get_all_files().unwrap();
    assert_eq!(files.len(), 3);
    let meta = store.get_file_metadata("src/lib.rs").unwrap().unwrap();
    assert_eq!(meta.hash.len(), 64);
    assert!(meta.symbol_count >= 2);

    let consistency = check_consistency(store).unwrap();
    assert!(consistency.is_consistent(), "{consistency:?}");
}

#[test]
fn parse_failures_are_recorded_not_fatal() {
    let tmp = tempfile::TempDir::new().unwrap();
    fs::write(tmp.path().join("good.rs"), "fn ok() {}\n").unwrap();
    // Invalid UTF-8 with a NUL: rejected by the encoding check.
    fs::write(tmp.path().join("bad.rs"), [0x66, 0x6E, 0x00, 0xFF, 0xFE]).unwrap();

    let builder = builder_with(IndexConfig::default());
    let cancel = CancelToken::new();
    let report = builder.build_index(tmp.path(), &cancel).unwrap();

    assert_eq!(report.files_processed, 1);
    assert_eq!(report.files_errored, 1);
    assert_eq!(report.errors.len(), 1);
    assert!(report.errors[0].path.contains("bad.rs"));
    assert!(builder
        .store()
        .get_file_metadata("good.rs")
        .unwrap()
        .is_some());
}

#[test]
fn orphan_references_are_filtered() {
    let tmp = tempfile::TempDir::new().unwrap();
    // `println` is called but never defined here; no reference may be
    // stored for it.
    fs::write(
        tmp.path().join("only.rs"),
        "fn local() {}\nfn main() { local(); }\n",
    )
    .unwrap();

    let builder = builder_with(IndexConfig::default());
    let cancel = CancelToken::new();
    let report = builder.build_index(tmp.path(), &cancel).unwrap();

    assert!(report.references_indexed >= 1);
    let consistency = check_consistency(builder.store()).unwrap();
    assert!(consistency.is_consistent(), "{consistency:?}");
}

#[test]
fn rebuild_resets_then_reindexes() {
    let tmp = tempfile::TempDir::new().unwrap();
    write_fixture(tmp.path());

    let builder = builder_with(IndexConfig::default());
    let cancel = CancelToken::new();
    builder.build_index(tmp.path(), &cancel).unwrap();

    // Remove a file on disk; rebuild must not resurrect it.
    fs::remove_file(tmp.path().join("tool.py")).unwrap();
    let report = builder.rebuild_index(tmp.path(), &cancel).unwrap();

    assert_eq!(report.files_processed, 2);
    assert!(builder
        .store()
        .get_file_metadata("tool.py")
        .unwrap()
        .is_none());
}

#[test]
fn cancelled_build_returns_cancelled() {
    let tmp = tempfile::TempDir::new().unwrap();
    write_fixture(tmp.path());

    let builder = builder_with(IndexConfig::default());
    let cancel = CancelToken::new();
    cancel.cancel();
    let err = builder.build_index(tmp.path(), &cancel).unwrap_err();
    assert!(matches!(err, IndexerError::Cancelled));
}

#[test]
fn targeted_build_paths_only_touches_given_files() {
    let tmp = tempfile::TempDir::new().unwrap();
    write_fixture(tmp.path());

    let builder = builder_with(IndexConfig::default());
    let cancel = CancelToken::new();
    let report = builder
        .build_paths(tmp.path(), &[std::path::PathBuf::from("src/lib.rs")], &cancel)
        .unwrap();

    assert_eq!(report.files_processed, 1);
    assert!(builder
        .store()
        .get_file_metadata("src/lib.rs")
        .unwrap()
        .is_some());
    assert!(builder
        .store()
        .get_file_metadata("src/main.rs")
        .unwrap()
        .is_none());
}
