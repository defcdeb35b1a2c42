//! Integration tests for full workflows
//!
//! These tests drive complete report runs through the public API against
//! real directories in temporary locations.

use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use testreport::commands::{Command, DumpCommand, GenerateCommand, HistoryCommand};
use testreport::error::{Error, Result};
use testreport::history::{FileHistory, HistoryDataPoint, HistorySink, RemoteService};
use testreport::model::{TestResult, TestStatus};
use testreport::orchestrator::{ReportOrchestrator, SUMMARY_FILE};
use testreport::plugin::{Plugin, PluginContext, PluginDescriptor, PluginSummary};
use testreport::plugins::DataPlugin;
use testreport::store::ResultStore;
use testreport::ui::UI;

/// Simple test UI that captures output for assertions
struct TestUI {
    output: Vec<String>,
    errors: Vec<String>,
}

impl TestUI {
    fn new() -> Self {
        TestUI {
            output: Vec::new(),
            errors: Vec::new(),
        }
    }
}

impl UI for TestUI {
    fn output(&mut self, message: &str) -> Result<()> {
        self.output.push(message.to_string());
        Ok(())
    }

    fn error(&mut self, message: &str) -> Result<()> {
        self.errors.push(message.to_string());
        Ok(())
    }

    fn warning(&mut self, message: &str) -> Result<()> {
        self.errors.push(format!("Warning: {}", message));
        Ok(())
    }
}

/// Remote service keeping everything in memory
#[derive(Default)]
struct MemoryService {
    history: Vec<HistoryDataPoint>,
    uploads: Mutex<Vec<String>>,
    completed: Mutex<Vec<HistoryDataPoint>>,
}

impl RemoteService for MemoryService {
    fn download_history(&self) -> Result<Vec<HistoryDataPoint>> {
        Ok(self.history.clone())
    }

    fn create_report(&self, report_uuid: &str, _name: &str) -> Result<String> {
        Ok(format!("https://reports.test/{}", report_uuid))
    }

    fn upload_file(&self, _report_uuid: &str, key: &str, _contents: &[u8]) -> Result<()> {
        self.uploads.lock().unwrap().push(key.to_string());
        Ok(())
    }

    fn complete_report(&self, _report_uuid: &str, point: &HistoryDataPoint) -> Result<()> {
        self.completed.lock().unwrap().push(point.clone());
        Ok(())
    }
}

type Calls = Rc<RefCell<Vec<String>>>;

/// Plugin logging every hook it receives
struct Recorder {
    calls: Calls,
    summary: bool,
}

impl Plugin for Recorder {
    fn start(&mut self, context: &mut PluginContext, _store: &ResultStore) -> Result<()> {
        self.calls
            .borrow_mut()
            .push(format!("{}:start", context.plugin_id));
        Ok(())
    }

    fn update(&mut self, context: &mut PluginContext, _store: &ResultStore) -> Result<()> {
        self.calls
            .borrow_mut()
            .push(format!("{}:update", context.plugin_id));
        Ok(())
    }

    fn done(&mut self, context: &mut PluginContext, _store: &ResultStore) -> Result<()> {
        self.calls
            .borrow_mut()
            .push(format!("{}:done", context.plugin_id));
        context.files.write_file("index.html", b"<html></html>")?;
        Ok(())
    }

    fn info(&self, context: &PluginContext, store: &ResultStore) -> Result<Option<PluginSummary>> {
        if !self.summary {
            return Ok(None);
        }
        Ok(Some(PluginSummary::from_store(
            &context.report_name,
            &context.plugin_id,
            store,
        )))
    }
}

fn recorder(id: &str, calls: &Calls, summary: bool) -> PluginDescriptor {
    PluginDescriptor::new(
        id,
        Box::new(Recorder {
            calls: calls.clone(),
            summary,
        }),
    )
}

fn write_result(dir: &Path, id: &str, history_id: &str, status: &str) -> PathBuf {
    fs::create_dir_all(dir).unwrap();
    let path = dir.join(format!("{}-result.json", id));
    fs::write(
        &path,
        format!(
            r#"{{"id": "{}", "historyId": "{}", "name": "{}", "status": "{}", "labels": [{{"name": "suite", "value": "core"}}]}}"#,
            id, history_id, id, status
        ),
    )
    .unwrap();
    path
}

#[test]
fn test_plugin_order_skips_disabled() {
    let temp = TempDir::new().unwrap();
    let calls = Calls::default();
    let mut report = ReportOrchestrator::builder("order", temp.path())
        .realtime(true)
        .plugin(recorder("p1", &calls, false))
        .plugin(recorder("p2", &calls, false).enabled(false))
        .plugin(recorder("p3", &calls, false))
        .build()
        .unwrap();

    report.start().unwrap();
    report.read_result(TestResult::passed("1")).unwrap();
    report.done().unwrap();

    assert_eq!(
        *calls.borrow(),
        vec![
            "p1:start", "p3:start", "p1:update", "p3:update", "p1:done", "p3:done"
        ]
    );
    assert!(!temp.path().join("p2").exists());
}

#[test]
fn test_nothing_is_invoked_before_start() {
    let temp = TempDir::new().unwrap();
    let calls = Calls::default();
    let results = temp.path().join("results");
    let file = write_result(&results, "a", "h-a", "passed");
    let mut report = ReportOrchestrator::builder("gated", temp.path().join("out"))
        .realtime(true)
        .plugin(recorder("p1", &calls, true))
        .build()
        .unwrap();

    assert!(matches!(report.done(), Err(Error::NotStarted)));
    assert!(matches!(
        report.read_directory(&results),
        Err(Error::NotStarted)
    ));
    assert!(matches!(report.read_file(&file), Err(Error::NotStarted)));
    assert!(matches!(
        report.read_result(TestResult::passed("x")),
        Err(Error::NotStarted)
    ));
    assert!(matches!(
        report.dump_state(&temp.path().join("dump.json")),
        Err(Error::NotStarted)
    ));

    assert!(calls.borrow().is_empty());
    assert!(report.store().all_test_results(true).is_empty());
}

#[test]
fn test_publish_aggregation() {
    let temp = TempDir::new().unwrap();
    let calls = Calls::default();
    let service = Arc::new(MemoryService::default());
    let mut report = ReportOrchestrator::builder("published", temp.path())
        .remote(service.clone())
        .plugin(recorder("a", &calls, true).publish(true))
        .plugin(recorder("local", &calls, true))
        .plugin(recorder("b", &calls, true).publish(true))
        .build()
        .unwrap();

    report.start().unwrap();
    report
        .read_result(TestResult::passed("1").with_history_id("h1"))
        .unwrap();
    let outcome = report.done().unwrap();

    let base = format!("https://reports.test/{}", report.report_uuid());
    let plugins: Vec<&str> = outcome.summaries.iter().map(|s| s.plugin.as_str()).collect();
    assert_eq!(plugins, vec!["a", "b"]);
    assert_eq!(outcome.summaries[1].href.as_deref(), Some("b/index.html"));
    assert_eq!(
        outcome.summaries[1].remote_href,
        Some(format!("{}/b/index.html", base))
    );

    let written: Vec<PluginSummary> =
        serde_json::from_str(&fs::read_to_string(temp.path().join(SUMMARY_FILE)).unwrap())
            .unwrap();
    assert_eq!(written, outcome.summaries);

    let completed = service.completed.lock().unwrap();
    assert_eq!(completed.len(), 1);
    assert_eq!(completed[0], outcome.history_point);
    assert_eq!(completed[0].url, base);
    assert_eq!(
        *service.uploads.lock().unwrap(),
        vec!["a/index.html", "b/index.html"]
    );
}

#[test]
fn test_history_across_runs() {
    let temp = TempDir::new().unwrap();
    let history_path = temp.path().join("history.jsonl");

    let first_results = temp.path().join("run1");
    write_result(&first_results, "a", "login", "failed");
    write_result(&first_results, "b", "logout", "passed");

    let mut first = ReportOrchestrator::builder("run", temp.path().join("out1"))
        .history_sink(FileHistory::new(&history_path, Some(5)))
        .build()
        .unwrap();
    first.start().unwrap();
    assert_eq!(first.read_directory(&first_results).unwrap(), 2);
    first.done().unwrap();

    let second_results = temp.path().join("run2");
    write_result(&second_results, "a2", "login", "passed");
    write_result(&second_results, "b2", "logout", "broken");
    write_result(&second_results, "c2", "signup", "passed");

    let mut second = ReportOrchestrator::builder("run", temp.path().join("out2"))
        .history_sink(FileHistory::new(&history_path, Some(5)))
        .plugin(PluginDescriptor::new("data", Box::new(DataPlugin::new())))
        .build()
        .unwrap();
    second.start().unwrap();
    second.read_directory(&second_results).unwrap();

    let store = second.store();
    let transition = |id: &str| {
        store
            .transition_by_tr_id(&id.into())
            .map(|t| t.to_string())
    };
    assert_eq!(transition("a2").as_deref(), Some("fixed"));
    assert_eq!(transition("b2").as_deref(), Some("malfunctioned"));
    assert_eq!(transition("c2").as_deref(), Some("new"));
    assert_eq!(store.history_by_tr_id(&"a2".into())[0].status, TestStatus::Failed);

    second.done().unwrap();
    let points = FileHistory::new(&history_path, None).read_history().unwrap();
    assert_eq!(points.len(), 2);
    assert_eq!(points[0].uuid, second.report_uuid());
    assert_eq!(points[0].metrics["total"], 3.0);

    let history: serde_json::Value = serde_json::from_str(
        &fs::read_to_string(temp.path().join("out2").join("data").join("history.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(history["a2"]["transition"], "fixed");
}

#[test]
fn test_stage_dumps_merge_into_one_report() {
    let temp = TempDir::new().unwrap();
    let shard1 = temp.path().join("shard1");
    let shard2 = temp.path().join("shard2");
    write_result(&shard1, "a", "h-a", "passed");
    write_result(&shard2, "b", "h-b", "failed");
    let base = Some(temp.path().to_string_lossy().to_string());

    let mut ui = TestUI::new();
    let dump1 = temp.path().join("stage1.json");
    let dump2 = temp.path().join("stage2.json");
    DumpCommand::new(base.clone(), vec![shard1], dump1.clone())
        .execute(&mut ui)
        .unwrap();
    DumpCommand::new(base.clone(), vec![shard2], dump2.clone())
        .execute(&mut ui)
        .unwrap();

    let mut ui = TestUI::new();
    let code = GenerateCommand::new(base, Vec::new())
        .with_stages(vec![dump1, dump2])
        .execute(&mut ui)
        .unwrap();

    assert_eq!(code, 0);
    assert!(ui.output[1].contains("Total: 2"));
    assert!(ui.output[1].contains("Failed: 1"));
}

#[test]
fn test_dump_and_restore_preserve_retries() {
    let temp = TempDir::new().unwrap();
    let dump = temp.path().join("stage.json");
    let at = |s| chrono::DateTime::from_timestamp(s, 0).unwrap();

    let mut first = ReportOrchestrator::builder("stage", temp.path()).build().unwrap();
    first.start().unwrap();
    first
        .read_result(TestResult::failed("try1", "flaky").with_history_id("h").with_stop(at(10)))
        .unwrap();
    first
        .read_result(TestResult::passed("try2").with_history_id("h").with_stop(at(20)))
        .unwrap();
    first.dump_state(&dump).unwrap();

    let mut second = ReportOrchestrator::builder("stage", temp.path()).build().unwrap();
    second.start().unwrap();
    second.restore_state(&[dump]).unwrap();

    let store = second.store();
    let visible = store.all_test_results(false);
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].id.as_str(), "try2");
    assert_eq!(store.retries_by_tr_id(&"try2".into())[0].id.as_str(), "try1");
    assert!(store.test_result_by_id(&"try1".into()).unwrap().hidden);
    assert_eq!(store.tests_statistic().flaky, 1);
}

#[test]
fn test_generate_then_history_command() {
    let temp = TempDir::new().unwrap();
    fs::write(
        temp.path().join(".treport.conf"),
        "[DEFAULT]\nname=Nightly\nhistory_path=history.jsonl\nplugins=data,raw\n\n[plugin.raw]\nplugin=data\npublish=true\ngroup_by=suite\n",
    )
    .unwrap();
    let results = temp.path().join("results");
    write_result(&results, "a", "h-a", "passed");
    let base = Some(temp.path().to_string_lossy().to_string());

    let mut ui = TestUI::new();
    assert_eq!(
        GenerateCommand::new(base.clone(), vec![results])
            .execute(&mut ui)
            .unwrap(),
        0
    );
    assert!(temp.path().join("test-report/data/tree.json").exists());
    assert!(temp.path().join("test-report/raw/tree.json").exists());
    // Only one plugin publishes, so no combined summary.
    assert!(!temp.path().join("test-report").join(SUMMARY_FILE).exists());

    let mut ui = TestUI::new();
    HistoryCommand::new(base).execute(&mut ui).unwrap();
    assert_eq!(ui.output.len(), 2);
    assert!(ui.output[1].contains("Nightly"));
}
