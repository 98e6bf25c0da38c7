//! End-to-end runs against a SQLite term store

mod common;

use common::{report_lines, run, seeded_store, wedding_config};
use media_categorizer::{
    ApplyEngine, AssetId, AssetStatus, AuditLog, AssignmentPlanner, MatchResult, RunMode, TaxonomyMode, TermCache,
    TermStore,
};

#[test]
fn all_mode_creates_parents_first_and_assigns_every_level() {
    let dir = tempfile::tempdir().unwrap();
    let store = seeded_store(&[(1, "Smith_Formals_001.jpg")]);
    let config = wedding_config(dir.path(), "");

    let outcome = run(&store, &config, RunMode::Apply);

    let wedding = store.find_term("Wedding", None).unwrap().unwrap();
    let portraits = store.find_term("Portraits", Some(wedding)).unwrap().unwrap();
    assert!(wedding < portraits, "parent row must be inserted first");
    assert_eq!(store.terms_of(AssetId(1)).unwrap(), vec![wedding, portraits]);

    let created: Vec<String> = outcome.report.terms_created.iter().map(|t| t.path.to_string()).collect();
    assert_eq!(created, vec!["Wedding", "Wedding > Portraits"]);

    assert_eq!(
        report_lines(&dir.path().join("report.csv")),
        vec![r#"1,"Smith_Formals_001.jpg","Formals","Wedding,Wedding > Portraits","Wedding,Wedding > Portraits""#]
    );
}

#[test]
fn bottom_only_assigns_leaf_but_still_creates_ancestor() {
    let dir = tempfile::tempdir().unwrap();
    let store = seeded_store(&[(1, "Smith_Formals_001.jpg")]);
    let config = wedding_config(dir.path(), "  apply_taxonomy:\n    mode: bottom_only\n");

    run(&store, &config, RunMode::Apply);

    let wedding = store.find_term("Wedding", None).unwrap().unwrap();
    let portraits = store.find_term("Portraits", Some(wedding)).unwrap().unwrap();
    assert_eq!(store.terms_of(AssetId(1)).unwrap(), vec![portraits]);
    assert_eq!(
        report_lines(&dir.path().join("report.csv")),
        vec![r#"1,"Smith_Formals_001.jpg","Formals","Wedding > Portraits","Wedding,Wedding > Portraits""#]
    );
}

#[test]
fn children_only_drops_the_leaf() {
    let dir = tempfile::tempdir().unwrap();
    let store = seeded_store(&[(1, "Smith_Formals_001.jpg")]);
    let config = wedding_config(dir.path(), "  apply_taxonomy:\n    mode: children_only\n");

    run(&store, &config, RunMode::Apply);

    let wedding = store.find_term("Wedding", None).unwrap().unwrap();
    assert_eq!(store.terms_of(AssetId(1)).unwrap(), vec![wedding]);
    assert_eq!(store.term_total().unwrap(), 2);
}

#[test]
fn shared_ancestor_is_created_once() {
    let dir = tempfile::tempdir().unwrap();
    let store = seeded_store(&[(7, "Jones_Formals_Candids_002.jpg")]);
    let config = wedding_config(dir.path(), "");

    let outcome = run(&store, &config, RunMode::Apply);

    assert_eq!(store.term_total().unwrap(), 3);
    assert_eq!(outcome.report.terms_created.len(), 3);
    assert_eq!(outcome.report.new_relationships, 3);
    assert_eq!(store.terms_of(AssetId(7)).unwrap().len(), 3);

    let wedding = store.find_term("Wedding", None).unwrap().unwrap();
    assert_eq!(store.term_count(wedding).unwrap(), 1);
}

#[test]
fn rerun_against_applied_store_is_a_noop() {
    let dir = tempfile::tempdir().unwrap();
    let store = seeded_store(&[(1, "Smith_Formals_001.jpg"), (2, "Smith_Candids_014.jpg")]);
    let config = wedding_config(dir.path(), "");

    run(&store, &config, RunMode::Apply);
    let terms_before = store.term_total().unwrap();
    let relationships_before = store.load_relationships().unwrap();

    let second = run(&store, &config, RunMode::Apply);
    assert!(second.report.is_noop());
    assert!(second.plan.new_terms.is_empty());
    assert!(second.report.assets.iter().all(|a| a.status == AssetStatus::NoOp));
    assert_eq!(store.term_total().unwrap(), terms_before);
    assert_eq!(store.load_relationships().unwrap(), relationships_before);
}

#[test]
fn usage_counts_follow_relationships() {
    let dir = tempfile::tempdir().unwrap();
    let store = seeded_store(&[
        (1, "Smith_Formals_001.jpg"),
        (2, "Smith_Formals_002.jpg"),
        (3, "Smith_Candids_003.jpg"),
    ]);
    run(&store, &wedding_config(dir.path(), ""), RunMode::Apply);

    let wedding = store.find_term("Wedding", None).unwrap().unwrap();
    let portraits = store.find_term("Portraits", Some(wedding)).unwrap().unwrap();
    let preparations = store.find_term("Preparations", Some(wedding)).unwrap().unwrap();
    assert_eq!(store.term_count(wedding).unwrap(), 3);
    assert_eq!(store.term_count(portraits).unwrap(), 2);
    assert_eq!(store.term_count(preparations).unwrap(), 1);
}

#[test]
fn existing_terms_are_reused_regardless_of_case() {
    let dir = tempfile::tempdir().unwrap();
    let store = seeded_store(&[(1, "Smith_Formals_001.jpg")]);
    let wedding = store.insert_term("wedding", None).unwrap();

    let outcome = run(&store, &wedding_config(dir.path(), ""), RunMode::Apply);

    let created: Vec<String> = outcome.report.terms_created.iter().map(|t| t.path.to_string()).collect();
    assert_eq!(created, vec!["wedding > Portraits"]);
    assert!(store.terms_of(AssetId(1)).unwrap().contains(&wedding));
    assert_eq!(store.term_total().unwrap(), 2);
}

#[test]
fn dry_run_and_export_leave_store_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let store = seeded_store(&[(1, "Smith_Formals_001.jpg")]);
    let config = wedding_config(dir.path(), "");

    let dry = run(&store, &config, RunMode::DryRun);
    assert_eq!(dry.report.asset(AssetId(1)).unwrap().status, AssetStatus::WouldApply);
    assert!(!dir.path().join("report.csv").exists());

    let export = run(&store, &config, RunMode::Export);
    assert!(export.report.dry_run);
    assert_eq!(
        report_lines(&dir.path().join("report.csv")),
        vec![r#"1,"Smith_Formals_001.jpg","Formals","Wedding,Wedding > Portraits","Wedding,Wedding > Portraits""#]
    );

    assert_eq!(store.term_total().unwrap(), 0);
    assert!(store.load_relationships().unwrap().is_empty());
}

#[test]
fn unmatched_assets_are_left_alone() {
    let dir = tempfile::tempdir().unwrap();
    let store = seeded_store(&[(1, "IMG_0001.jpg"), (2, "Smith_Formals_001.jpg")]);

    let outcome = run(&store, &wedding_config(dir.path(), ""), RunMode::Apply);

    assert_eq!(outcome.assets_scanned, 2);
    assert_eq!(outcome.assets_matched, 1);
    assert!(outcome.report.asset(AssetId(1)).is_none());
    assert!(store.terms_of(AssetId(1)).unwrap().is_empty());
}

#[test]
fn failed_relationship_rolls_back_whole_apply() {
    let store = seeded_store(&[(1, "Smith_Formals_001.jpg")]);
    let matches = vec![
        MatchResult {
            asset_id: AssetId(1),
            rule_key: "Formals".into(),
            term_paths: vec!["Wedding > Portraits".into()],
        },
        // No such attachment row
        MatchResult {
            asset_id: AssetId(404),
            rule_key: "Candids".into(),
            term_paths: vec!["Wedding > Preparations".into()],
        },
    ];

    let mut cache = TermCache::from_nodes(store.load_terms().unwrap());
    let mut audit = AuditLog::new();
    let plan = AssignmentPlanner::new(&mut cache, TaxonomyMode::All).plan(&matches, &mut audit);

    let engine = ApplyEngine::new(store.clone());
    let err = engine
        .apply(&plan, &store.load_relationships().unwrap(), false, &mut audit)
        .unwrap_err();

    assert_eq!(err.asset(), Some(AssetId(404)));
    assert_eq!(store.term_total().unwrap(), 0);
    assert!(store.load_relationships().unwrap().is_empty());

    let rows = audit.rows();
    let failed = rows.iter().find(|r| r.asset_id == AssetId(404)).unwrap();
    assert_eq!(failed.errors.len(), 1);
}
