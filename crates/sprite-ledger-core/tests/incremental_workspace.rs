use std::fs;
use std::path::{Path, PathBuf};

use image::{Rgba, RgbaImage};
use sprite_ledger_core::prelude::*;
use sprite_ledger_core::workspace::{
    FORWARD_SCRIPT_FILE, FRONTEND_CONFIG_FILE, MAPPING_FILE, REGISTRY_FILE, ROLLBACK_SCRIPT_FILE,
};
use sprite_ledger_core::{Result, SpriteLedgerError};

struct Flat;

impl ImageSource for Flat {
    fn load_cell(&self, _path: &Path, edge: u32) -> Result<RgbaImage> {
        Ok(RgbaImage::from_pixel(edge, edge, Rgba([200, 100, 50, 255])))
    }

    fn dimensions(&self, _path: &Path) -> Result<(u32, u32)> {
        Ok((1024, 512))
    }
}

fn paths(ids: impl IntoIterator<Item = u64>) -> Vec<PathBuf> {
    ids.into_iter()
        .map(|id| PathBuf::from(format!("emoji/s{id}.png")))
        .collect()
}

fn small_cfg() -> LedgerConfig {
    LedgerConfig::builder()
        .capacity(8)
        .row_width(4)
        .cell_size(16)
        .build()
}

#[test]
fn first_run_packs_and_persists_everything() {
    let dir = tempfile::tempdir().expect("tempdir");
    let ws = Workspace::new(dir.path(), small_cfg()).expect("workspace");
    let batch = AssetBatch::from_paths(&paths(1..=10));

    let run = ws
        .run_incremental(&batch, None, &Flat)
        .expect("run")
        .expect("something new");
    assert_eq!(run.new_assets, 10);
    assert_eq!(run.version.to_string(), "v1.1");
    assert_eq!(run.pages.len(), 2);
    assert!(run.diagnostics.is_empty());

    for name in [
        "emoji-sprite-0.png",
        "emoji-sprite-1.png",
        "emoji-sprites-incremental-v1.1.css",
        REGISTRY_FILE,
        MAPPING_FILE,
        FRONTEND_CONFIG_FILE,
    ] {
        assert!(dir.path().join(name).is_file(), "{name} missing");
    }
    assert_eq!(run.css_path, dir.path().join("emoji-sprites-incremental-v1.1.css"));
    let page1 = image::open(dir.path().join("emoji-sprite-1.png")).expect("page image");
    assert_eq!((page1.width(), page1.height()), (64, 16));

    let registry = ws.load_registry().expect("registry");
    assert_eq!(registry.total(), 10);
    assert_eq!(registry.description(), "Added 10 new emojis");
    assert!(registry.validate().is_empty());
    let mapping = ws.load_mapping().expect("mapping");
    assert_eq!(mapping.get(LegacyKey(1)), Some(GlobalKey(0)));
    assert_eq!(mapping.get(LegacyKey(10)), Some(GlobalKey(9)));
}

#[test]
fn second_run_with_same_files_does_nothing() {
    let dir = tempfile::tempdir().expect("tempdir");
    let ws = Workspace::new(dir.path(), small_cfg()).expect("workspace");
    let batch = AssetBatch::from_paths(&paths(1..=3));
    ws.run_incremental(&batch, None, &Flat).expect("first").expect("new");
    let before = fs::read_to_string(ws.registry_path()).expect("registry");

    assert!(ws.run_incremental(&batch, None, &Flat).expect("second").is_none());
    assert_eq!(fs::read_to_string(ws.registry_path()).expect("registry"), before);
}

#[test]
fn later_runs_continue_the_counter_on_new_pages() {
    let dir = tempfile::tempdir().expect("tempdir");
    let ws = Workspace::new(dir.path(), small_cfg()).expect("workspace");
    ws.run_incremental(&AssetBatch::from_paths(&paths(1..=3)), None, &Flat)
        .expect("first")
        .expect("new");
    let first_mapping = ws.load_mapping().expect("mapping");

    let run = ws
        .run_incremental(&AssetBatch::from_paths(&paths(1..=5)), None, &Flat)
        .expect("second")
        .expect("new");
    assert_eq!(run.new_assets, 2);
    assert_eq!(run.pages[0].id, 1);
    assert_eq!((run.pages[0].range_start, run.pages[0].range_end), (3, 4));
    assert_eq!(run.version.to_string(), "v1.2");

    let mapping = ws.load_mapping().expect("mapping");
    for (legacy, global) in first_mapping.iter() {
        assert_eq!(mapping.get(legacy), Some(global));
    }
    assert_eq!(mapping.get(LegacyKey(4)), Some(GlobalKey(3)));
    assert!(ws.load_registry().expect("registry").validate().is_empty());
}

#[test]
fn new_files_restrict_the_run() {
    let dir = tempfile::tempdir().expect("tempdir");
    let ws = Workspace::new(dir.path(), small_cfg()).expect("workspace");
    let only = vec!["s7.png".to_string()];
    let run = ws
        .run_incremental(&AssetBatch::from_paths(&paths(1..=9)), Some(&only), &Flat)
        .expect("run")
        .expect("new");
    assert_eq!(run.new_assets, 1);
    let mapping = ws.load_mapping().expect("mapping");
    assert_eq!(mapping.len(), 1);
    assert_eq!(mapping.get(LegacyKey(7)), Some(GlobalKey(0)));
}

#[test]
fn real_png_sources_are_normalized() {
    let dir = tempfile::tempdir().expect("tempdir");
    let src = dir.path().join("emoji");
    fs::create_dir_all(&src).expect("mkdir");
    RgbaImage::from_pixel(40, 24, Rgba([0, 255, 0, 255]))
        .save(src.join("s3.png"))
        .expect("write source");
    RgbaImage::from_pixel(16, 16, Rgba([255, 0, 0, 255]))
        .save(src.join("s1.png"))
        .expect("write source");

    let ws = Workspace::new(dir.path().join("out"), small_cfg()).expect("workspace");
    let batch = AssetBatch::from_paths(&[src.join("s3.png"), src.join("s1.png")]);
    let run = ws
        .run_incremental(&batch, None, &FileImageSource)
        .expect("run")
        .expect("new");
    assert_eq!(run.new_assets, 2);

    let page = image::open(ws.dir().join("emoji-sprite-0.png"))
        .expect("page")
        .to_rgba8();
    assert_eq!(page.dimensions(), (64, 16));
    // s1 sorts first and lands in cell 0
    assert_eq!(*page.get_pixel(8, 8), Rgba([255, 0, 0, 255]));
    assert!(page.get_pixel(24, 8)[1] >= 250);
    assert_eq!(page.get_pixel(40, 8)[3], 0);
}

#[test]
fn failed_load_leaves_nothing_persisted() {
    struct Broken;
    impl ImageSource for Broken {
        fn load_cell(&self, path: &Path, _edge: u32) -> Result<RgbaImage> {
            Err(SpriteLedgerError::InvalidInput(format!("cannot decode {}", path.display())))
        }
        fn dimensions(&self, _path: &Path) -> Result<(u32, u32)> {
            Ok((0, 0))
        }
    }
    let dir = tempfile::tempdir().expect("tempdir");
    let ws = Workspace::new(dir.path(), small_cfg()).expect("workspace");
    let err = ws
        .run_incremental(&AssetBatch::from_paths(&paths(1..=2)), None, &Broken)
        .expect_err("load failure");
    assert!(matches!(err, SpriteLedgerError::InvalidInput(_)));
    assert!(!ws.registry_path().exists());
    assert!(!ws.mapping_path().exists());
}

#[test]
fn initial_import_records_frozen_pages() {
    let dir = tempfile::tempdir().expect("tempdir");
    let ws = Workspace::new(dir.path(), small_cfg()).expect("workspace");

    let err = ws.run_initial_import(&Flat).expect_err("no mapping yet");
    assert!(matches!(err, SpriteLedgerError::MissingMapping(_)));

    let mapping: MappingStore = (0..11u64).map(|i| (LegacyKey(i + 1), GlobalKey(i))).collect();
    mapping.save(&ws.mapping_path()).expect("save mapping");
    for id in [1u32, 0] {
        fs::write(dir.path().join(format!("emoji-sprite-{id}.png")), b"png").expect("page");
    }

    let summary = ws.run_initial_import(&Flat).expect("import");
    assert_eq!(summary.mapped, 11);
    assert_eq!(summary.pages.len(), 2);
    assert!(summary.diagnostics.is_empty());

    let registry = ws.load_registry().expect("registry");
    assert_eq!(registry.total(), 11);
    assert!(registry.pages().iter().all(|p| p.frozen));
    assert_eq!(registry.range_of(0), Some((0, 7)));
    assert_eq!(registry.range_of(1), Some((8, 10)));
    assert_eq!(registry.page(0).map(|p| p.filename.as_str()), Some("emoji-sprite-0.png"));

    let err = ws.run_initial_import(&Flat).expect_err("second import");
    assert!(matches!(err, SpriteLedgerError::AlreadyInitialized { pages: 2 }));

    // the next incremental run appends after the imported history
    let run = ws
        .run_incremental(&AssetBatch::from_paths(&paths([20])), None, &Flat)
        .expect("run")
        .expect("new");
    assert_eq!(run.pages[0].id, 2);
    assert_eq!(run.pages[0].range_start, 11);
}

#[test]
fn registry_maintenance_persists() {
    let dir = tempfile::tempdir().expect("tempdir");
    let ws = Workspace::new(dir.path(), small_cfg()).expect("workspace");
    ws.run_incremental(&AssetBatch::from_paths(&paths(1..=10)), None, &Flat)
        .expect("run")
        .expect("new");

    assert!(ws.modify_registry(|r| r.freeze_page(1)).expect("freeze"));
    let version = ws
        .modify_registry(|r| r.promote_version("manual bump"))
        .expect("bump");
    assert_eq!(version.to_string(), "v1.2");

    let registry = ws.load_registry().expect("registry");
    assert!(registry.page(1).expect("page 1").frozen);
    assert!(!registry.page(0).expect("page 0").frozen);
    assert_eq!(registry.description(), "manual bump");
}

#[test]
fn strict_policy_refuses_to_persist_a_broken_registry() {
    let dir = tempfile::tempdir().expect("tempdir");
    let cfg = LedgerConfig::builder()
        .capacity(8)
        .row_width(4)
        .cell_size(16)
        .validation(ValidationPolicy::Strict)
        .build();
    let ws = Workspace::new(dir.path(), cfg).expect("workspace");
    fs::write(
        ws.registry_path(),
        r#"{"version": "v1.0", "total_emojis": 5, "sprites": [], "created_at": "2024-05-01T09:30:00"}"#,
    )
    .expect("write");
    let before = fs::read_to_string(ws.registry_path()).expect("read");

    let err = ws
        .modify_registry(|r| r.promote_version(""))
        .expect_err("strict");
    assert!(matches!(err, SpriteLedgerError::InconsistentRegistry(_)));
    assert_eq!(fs::read_to_string(ws.registry_path()).expect("read"), before);
}

#[test]
fn migration_scripts_written_from_mapping() {
    let dir = tempfile::tempdir().expect("tempdir");
    let ws = Workspace::new(dir.path(), small_cfg()).expect("workspace");
    assert!(matches!(
        ws.write_migration_scripts(),
        Err(SpriteLedgerError::MissingMapping(_))
    ));

    ws.run_incremental(&AssetBatch::from_paths(&paths(1..=2)), None, &Flat)
        .expect("run")
        .expect("new");
    let (forward, rollback) = ws.write_migration_scripts().expect("scripts");
    assert_eq!(forward, dir.path().join(FORWARD_SCRIPT_FILE));
    assert_eq!(rollback, dir.path().join(ROLLBACK_SCRIPT_FILE));
    let sql = fs::read_to_string(forward).expect("forward");
    assert_eq!(sql.matches("UPDATE ").count(), 6);
    let sql = fs::read_to_string(rollback).expect("rollback");
    assert_eq!(sql.matches("UPDATE ").count(), 2);
}

#[test]
fn import_refuses_mapping_larger_than_page_files() {
    let dir = tempfile::tempdir().expect("tempdir");
    let cfg = LedgerConfig::builder()
        .capacity(8)
        .row_width(4)
        .cell_size(16)
        .validation(ValidationPolicy::Strict)
        .build();
    let ws = Workspace::new(dir.path(), cfg).expect("workspace");
    let mapping: MappingStore = (0..11u64).map(|i| (LegacyKey(i + 1), GlobalKey(i))).collect();
    mapping.save(&ws.mapping_path()).expect("save mapping");
    fs::write(dir.path().join("emoji-sprite-0.png"), b"png").expect("page");

    let err = ws.run_initial_import(&Flat).expect_err("mapping not covered");
    assert!(matches!(err, SpriteLedgerError::InvalidInput(_)), "{err}");
    assert!(!ws.registry_path().exists());

    // nothing was recorded, so an incremental run cannot hand out a taken key
    let err = ws
        .run_incremental(&AssetBatch::from_paths(&paths([99])), None, &Flat)
        .expect_err("mapping ahead of registry");
    assert!(matches!(err, SpriteLedgerError::InconsistentRegistry(_)), "{err}");
    let mapping = ws.load_mapping().expect("mapping");
    assert_eq!(mapping.len(), 11);
    assert!(!mapping.contains(LegacyKey(99)));
}

#[test]
fn import_refuses_sparse_page_files() {
    let dir = tempfile::tempdir().expect("tempdir");
    let ws = Workspace::new(dir.path(), small_cfg()).expect("workspace");
    let mapping: MappingStore = (0..10u64).map(|i| (LegacyKey(i + 1), GlobalKey(i))).collect();
    mapping.save(&ws.mapping_path()).expect("save mapping");
    for id in [1u32, 2] {
        fs::write(dir.path().join(format!("emoji-sprite-{id}.png")), b"png").expect("page");
    }

    let err = ws.run_initial_import(&Flat).expect_err("sparse ids");
    match err {
        SpriteLedgerError::InvalidInput(msg) => assert!(msg.contains("emoji-sprite-0.png"), "{msg}"),
        other => panic!("unexpected error: {other}"),
    }
    assert!(!ws.registry_path().exists());
}

#[test]
fn mapping_ahead_of_registry_is_rejected_before_assignment() {
    let dir = tempfile::tempdir().expect("tempdir");
    let ws = Workspace::new(dir.path(), small_cfg()).expect("workspace");
    ws.run_incremental(&AssetBatch::from_paths(&paths(1..=3)), None, &Flat)
        .expect("first")
        .expect("new");

    // hand-edited entry pointing at an index the registry never allocated
    let mut mapping = ws.load_mapping().expect("mapping");
    mapping.insert_new(LegacyKey(50), GlobalKey(3));
    mapping.save(&ws.mapping_path()).expect("save");
    let registry_before = fs::read_to_string(ws.registry_path()).expect("registry");

    let err = ws
        .run_incremental(&AssetBatch::from_paths(&paths([4])), None, &Flat)
        .expect_err("foreign key");
    match err {
        SpriteLedgerError::InconsistentRegistry(diags) => assert_eq!(
            diags,
            vec![Diagnostic::UnallocatedKey {
                legacy: LegacyKey(50),
                global: GlobalKey(3),
                total: 3
            }]
        ),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(fs::read_to_string(ws.registry_path()).expect("registry"), registry_before);
    assert!(!ws.load_mapping().expect("mapping").contains(LegacyKey(4)));
}

#[test]
fn strict_failure_leaves_inputs_untouched() {
    let cfg = LedgerConfig::builder()
        .capacity(8)
        .row_width(4)
        .cell_size(16)
        .validation(ValidationPolicy::Strict)
        .build();
    // counter says 5 but no page covers it, so the new page opens a gap
    let mut registry = Registry::from_record(VersionRecord {
        total: 5,
        ..VersionRecord::default()
    });
    let mut mapping = MappingStore::new();

    let err = apply_incremental(
        &AssetBatch::from_paths(&paths(1..=3)),
        &mut registry,
        &mut mapping,
        &cfg,
        &Flat,
    )
    .expect_err("gap under strict");
    assert!(matches!(err, SpriteLedgerError::InconsistentRegistry(_)), "{err}");
    assert_eq!(registry.total(), 5);
    assert!(registry.pages().is_empty());
    assert_eq!(registry.version(), Version::INITIAL);
    assert!(mapping.is_empty());
}
