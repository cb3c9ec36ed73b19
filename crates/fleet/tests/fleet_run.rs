//! Fleet runs against in-memory collaborators

mod common;

use std::collections::HashSet;
use std::sync::atomic::Ordering;
use tempfile::TempDir;

use common::{site, Harness};
use sitesweep_common::{ComparisonKind, Page, Phase, ProgressStore, RunMode, RunProgress};
use sitesweep_fleet::{Fleet, RunOptions, SiteStage, REPORT_FILE};

fn dry_run() -> RunOptions {
    RunOptions {
        dry_run: true,
        ..Default::default()
    }
}

fn read_progress(harness: &Harness) -> RunProgress {
    serde_json::from_str(&std::fs::read_to_string(harness.progress_path()).unwrap()).unwrap()
}

#[tokio::test]
async fn test_dry_run_produces_no_comparisons() {
    let harness = Harness::new();
    let store = harness.store(true).await;
    let fleet = Fleet::new(harness.context(dry_run()), store.clone());
    let sites = vec![site("alpha"), site("beta")];

    let report = fleet.run(&sites).await.unwrap();

    assert!(report.is_success());
    assert_eq!(report.completed.len(), 2);
    assert_eq!(report.results().count(), 0);
    assert!(report.progress_removed);
    assert!(!harness.progress_path().exists());
    assert_eq!(store.completed().await.len(), 2);

    // No update or cache clear for any site
    assert!(harness.executor.hosts().is_empty());
    assert_eq!(harness.purger.calls.load(Ordering::SeqCst), 0);

    for outcome in &report.completed {
        assert_eq!(
            outcome.stages,
            vec![SiteStage::BeforeCapture, SiteStage::Record, SiteStage::Done]
        );
        assert!(outcome.report.is_none());

        let site_folder = store.output_folder().join(&outcome.key);
        assert!(!site_folder.join("updates.txt").exists());
        assert!(!site_folder.join(REPORT_FILE).exists());

        let page = Page::new(&site_folder, format!("https://{}.test/", outcome.key));
        for kind in ComparisonKind::ALL {
            assert!(page.artifact_path(kind, Phase::Before).exists());
            assert!(!page.artifact_path(kind, Phase::After).exists());
        }
    }
    assert!(store
        .output_folder()
        .file_name()
        .unwrap()
        .to_string_lossy()
        .ends_with("-dry"));
}

#[tokio::test]
async fn test_full_run_scores_every_signal() {
    let harness = Harness::new();
    let store = harness.store(false).await;
    let fleet = Fleet::new(harness.context(RunOptions::default()), store.clone());

    let report = fleet.run(&[site("shop")]).await.unwrap();

    assert!(report.is_success());
    let outcome = &report.completed[0];
    assert_eq!(
        outcome.stages,
        vec![
            SiteStage::BeforeCapture,
            SiteStage::Update,
            SiteStage::CacheClear,
            SiteStage::AfterCapture,
            SiteStage::Compare,
            SiteStage::Record,
            SiteStage::Done,
        ]
    );
    assert_eq!(outcome.results.len(), 3);

    let score = |kind: ComparisonKind| {
        outcome
            .results
            .iter()
            .find(|r| r.comparison == kind)
            .map(|r| (r.score, r.pass))
            .unwrap()
    };
    assert_eq!(score(ComparisonKind::Visual), (Some(100.0), true));
    assert_eq!(score(ComparisonKind::Html), (Some(90.91), false));
    assert_eq!(score(ComparisonKind::Console), (Some(50.0), false));
    assert_eq!(outcome.failures().count(), 2);

    let site_folder = store.output_folder().join("shop");
    let csv = std::fs::read_to_string(site_folder.join(REPORT_FILE)).unwrap();
    assert_eq!(csv.lines().count(), 4);
    assert!(csv.contains("shop,https://shop.test/,html,90.91,NO"));

    let updates = std::fs::read_to_string(site_folder.join("updates.txt")).unwrap();
    assert!(updates.contains("ran wp core update"));
    assert_eq!(harness.purger.calls.load(Ordering::SeqCst), 1);

    let commands = harness.executor.commands_for("shop.test");
    assert!(commands.iter().any(|c| c.starts_with("wp plugin update --all")));
    assert!(commands.iter().any(|c| c.starts_with("wp plugin is-active")));
}

#[tokio::test]
async fn test_failed_site_does_not_block_others() {
    let harness = Harness::with(TempDir::new().unwrap(), &["bad.test"], &[], false);
    let store = harness.store(false).await;
    let fleet = Fleet::new(harness.context(RunOptions::default()), store.clone());

    let report = fleet.run(&[site("bad"), site("good")]).await.unwrap();

    assert!(!report.is_success());
    assert_eq!(report.completed.len(), 1);
    assert_eq!(report.completed[0].key, "good");
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].key, "bad");
    assert_eq!(report.failed[0].error.stage(), Some(SiteStage::BeforeCapture));

    // The failed site was never updated and the record stays for resume
    assert!(harness.executor.commands_for("bad.test").is_empty());
    assert!(!report.progress_removed);
    assert_eq!(read_progress(&harness).completed_sites, vec!["good"]);
}

#[tokio::test]
async fn test_resume_finishes_only_remaining_sites() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();
    let sites = vec![site("alpha"), site("beta"), site("gamma")];

    let first = Harness::with(tmp, &["beta.test"], &[], false);
    let first_store = first.store(false).await;
    let report = Fleet::new(first.context(RunOptions::default()), first_store.clone())
        .run(&sites)
        .await
        .unwrap();
    assert_eq!(report.failed.len(), 1);

    let mut after_first: Vec<String> = read_progress(&first).completed_sites;
    after_first.sort();
    assert_eq!(after_first, vec!["alpha", "gamma"]);

    // Second run picks up the same record and output folder
    let second = Harness::with(TempDir::new_in(&root).unwrap(), &[], &[], false);
    let store = std::sync::Arc::new(
        ProgressStore::open(&first.progress_path(), &root.join("elsewhere"), false, false)
            .await
            .unwrap(),
    );
    assert_eq!(store.mode(), RunMode::Resumed);
    assert_eq!(store.output_folder(), first_store.output_folder());

    let report = Fleet::new(second.context(RunOptions::default()), store.clone())
        .run(&sites)
        .await
        .unwrap();

    assert!(report.is_success());
    assert_eq!(report.already_completed, vec!["alpha", "gamma"]);
    assert_eq!(report.completed.len(), 1);
    assert_eq!(report.completed[0].key, "beta");
    assert_eq!(
        second.executor.hosts(),
        HashSet::from(["beta.test".to_string()])
    );

    let completed = store.completed().await;
    let unique: HashSet<&String> = completed.iter().collect();
    assert_eq!(completed.len(), 3);
    assert_eq!(unique.len(), 3);
    assert!(report.progress_removed);
    assert!(!first.progress_path().exists());
}

#[tokio::test]
async fn test_concurrent_completions_are_all_recorded() {
    let harness = Harness::with(TempDir::new().unwrap(), &["site-13.test"], &[], false);
    let store = harness.store(true).await;
    let fleet = Fleet::new(harness.context(dry_run()), store);
    let sites: Vec<_> = (0..24).map(|i| site(&format!("site-{}", i))).collect();

    let report = fleet.run(&sites).await.unwrap();

    assert_eq!(report.completed.len(), 23);
    let recorded: HashSet<String> = read_progress(&harness).completed_sites.into_iter().collect();
    assert_eq!(recorded.len(), 23);
    assert!(!recorded.contains("site-13"));
}

#[tokio::test]
async fn test_backup_failure_aborts_site_before_update() {
    let harness = Harness::with(
        TempDir::new().unwrap(),
        &[],
        &[("shop.test", "wp db export")],
        false,
    );
    let store = harness.store(false).await;
    let options = RunOptions {
        backup: true,
        ..Default::default()
    };
    let fleet = Fleet::new(harness.context(options), store);

    let report = fleet.run(&[site("shop"), site("blog")]).await.unwrap();

    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].error.stage(), Some(SiteStage::Backup));
    assert!(!harness
        .executor
        .commands_for("shop.test")
        .iter()
        .any(|c| c.starts_with("wp core update")));

    let blog = &report.completed[0];
    assert_eq!(blog.key, "blog");
    assert_eq!(blog.stages[1], SiteStage::Backup);
    assert!(harness
        .tmp
        .path()
        .join("output")
        .read_dir()
        .unwrap()
        .filter_map(|e| e.ok())
        .any(|run| run.path().join("blog").join("backup.zip").exists()));
}

#[tokio::test]
async fn test_comparator_failure_does_not_abort_others() {
    let harness = Harness::with(TempDir::new().unwrap(), &[], &[], true);
    let store = harness.store(false).await;
    let fleet = Fleet::new(harness.context(RunOptions::default()), store);

    let report = fleet.run(&[site("quiet")]).await.unwrap();

    assert!(report.is_success());
    let results = &report.completed[0].results;
    assert_eq!(results.len(), 3);

    let console = results
        .iter()
        .find(|r| r.comparison == ComparisonKind::Console)
        .unwrap();
    assert_eq!(console.score, None);
    assert!(!console.pass);
    assert!(console.error.is_some());

    assert!(results
        .iter()
        .filter(|r| r.comparison != ComparisonKind::Console)
        .all(|r| r.score.is_some()));
}
