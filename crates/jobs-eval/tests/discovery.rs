use std::collections::BTreeSet;
use std::fs;

use jobs_eval::{
    find_jobs, DocumentEvaluator, Error, EvalConfig, Interrupt, LocalStore, Report, ReportLayout,
    WalkStats,
};
use serde_json::{json, Value};

fn run(doc: Value, config: &EvalConfig) -> jobs_eval::Result<(Report, WalkStats)> {
    let ev = DocumentEvaluator::from_json(&doc).expect("valid document");
    find_jobs(&ev, ev.root(), config, Some(&LocalStore), &Interrupt::new())
}

fn job(system: &str, out: &str) -> Value {
    json!({ "type": "derivation", "system": system, "outputs": { "out": out } })
}

fn release() -> Value {
    json!({
        "hello": {
            "type": "derivation",
            "name": "hello-2.12",
            "system": "x86_64-linux",
            "drvPath": "/store/aaa-hello-2.12.drv",
            "outputs": { "out": "/store/aaa-hello-2.12" }
        },
        "world": {
            "type": "derivation",
            "name": "world-1.0",
            "system": "x86_64-linux",
            "drvPath": "/store/bbb-world-1.0.drv",
            "outputs": { "out": "/store/bbb-world-1.0" }
        },
        "tested": {
            "type": "derivation",
            "name": "tested",
            "system": "x86_64-linux",
            "drvPath": "/store/ccc-tested.drv",
            "outPath": "/store/ccc-tested",
            "_hydraAggregate": true,
            "constituents": [{ "__ref": "hello" }, { "__ref": "world" }]
        },
        "broken": job("unknown", "/store/ddd-broken"),
        "nothing": null,
        "nested": {
            "x86_64-linux": { "__ref": "hello" },
            "aarch64-linux": null
        }
    })
}

#[test]
fn single_job_report() {
    let (report, _) = run(
        json!({ "hello": job("x86_64-linux", "/store/p") }),
        &EvalConfig::default(),
    )
    .unwrap();
    let value = report.to_json(ReportLayout::Nested).unwrap();
    assert_eq!(
        value,
        json!({
            "hello": {
                "nixName": "",
                "system": "x86_64-linux",
                "drvPath": "/store/p.drv",
                "description": "",
                "license": "",
                "homepage": "",
                "maintainers": "",
                "schedulingPriority": 100,
                "timeout": 36000,
                "maxSilent": 7200,
                "isChannel": false,
                "outputs": { "out": "/store/p" }
            }
        })
    );
}

#[test]
fn aggregate_lists_its_constituents() {
    let (report, _) = run(release(), &EvalConfig::default()).unwrap();
    let tested = report.get("tested").and_then(|e| e.as_job()).unwrap();
    let constituents: BTreeSet<&str> = tested
        .constituents
        .as_deref()
        .unwrap()
        .split(' ')
        .collect();
    assert_eq!(
        constituents,
        BTreeSet::from(["/store/aaa-hello-2.12.drv", "/store/bbb-world-1.0.drv"])
    );
    for (path, job) in report.jobs() {
        if path.to_string() != "tested" {
            assert!(job.constituents.is_none(), "{} has constituents", path);
        }
    }
}

#[test]
fn broken_job_does_not_affect_siblings() {
    let (report, stats) = run(release(), &EvalConfig::default()).unwrap();
    assert_eq!(
        report.get("broken").and_then(|e| e.as_error()),
        Some("derivation must have a ‘system’ attribute")
    );
    assert!(report.get("hello").and_then(|e| e.as_job()).is_some());
    assert!(report.get("world").and_then(|e| e.as_job()).is_some());
    assert_eq!(stats.errors, 1);
    assert_eq!(report.errors().count(), 1);
}

#[test]
fn empty_nodes_leave_no_trace() {
    let (report, _) = run(release(), &EvalConfig::default()).unwrap();
    assert!(report.get("nothing").is_none());
    assert!(report.get("nested.aarch64-linux").is_none());
    let paths: Vec<String> = report.entries().map(|(p, _)| p.to_string()).collect();
    assert_eq!(
        paths,
        vec!["broken", "hello", "nested.x86_64-linux", "tested", "world"]
    );
}

#[test]
fn shared_subtrees_are_reported_per_path() {
    let (report, _) = run(release(), &EvalConfig::default()).unwrap();
    let direct = report.get("hello").and_then(|e| e.as_job()).unwrap();
    let shared = report
        .get("nested.x86_64-linux")
        .and_then(|e| e.as_job())
        .unwrap();
    assert_eq!(direct, shared);
}

#[test]
fn unsupported_value_fails_the_whole_run() {
    let err = run(
        json!({ "ok": job("x86_64-linux", "/store/ok"), "bad": 42 }),
        &EvalConfig::default(),
    )
    .unwrap_err();
    assert!(!err.is_recoverable());
    assert_eq!(err.to_string(), "unsupported value: 42");
}

#[test]
fn gc_roots_are_created_once() {
    let dir = tempfile::tempdir().unwrap();
    let roots = dir.path().join("gcroots");
    let config = EvalConfig {
        gc_roots_dir: Some(roots.clone()),
        ..EvalConfig::default()
    };

    let (first, first_stats) = run(release(), &config).unwrap();
    // hello is reached twice but registered once; broken has no root.
    assert_eq!(first_stats.roots_created, 3);
    let mut names: Vec<String> = fs::read_dir(&roots)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    assert_eq!(
        names,
        vec!["aaa-hello-2.12.drv", "bbb-world-1.0.drv", "ccc-tested.drv"]
    );

    let (second, second_stats) = run(release(), &config).unwrap();
    assert_eq!(second_stats.roots_created, 0);
    assert_eq!(first, second);
}

#[test]
fn dry_run_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let roots = dir.path().join("gcroots");
    let config = EvalConfig {
        gc_roots_dir: Some(roots.clone()),
        dry_run: true,
        ..EvalConfig::default()
    };
    let (_, stats) = run(release(), &config).unwrap();
    assert_eq!(stats.roots_created, 0);
    assert!(!roots.exists());
}

#[test]
fn release_function_takes_auto_args() {
    let mut config = EvalConfig::default();
    config
        .args
        .insert("supportedSystems".into(), json!(["x86_64-linux"]));
    config.argstrs.insert("version".into(), "1.2".into());
    let (report, _) = run(
        json!({
            "__lambda": {
                "args": ["supportedSystems", "version", "officialRelease"],
                "defaults": { "officialRelease": false },
                "body": {
                    "tarball": {
                        "type": "derivation",
                        "name": { "__arg": "version" },
                        "system": "x86_64-linux",
                        "outPath": "/store/t"
                    },
                    "needsPkgs": {
                        "__lambda": { "args": ["pkgs"], "body": null }
                    }
                }
            }
        }),
        &config,
    )
    .unwrap();
    assert_eq!(report.get("tarball").and_then(|e| e.as_job()).unwrap().name, "1.2");
    assert_eq!(
        report.get("needsPkgs").and_then(|e| e.as_error()),
        Some("cannot auto-call a function that has an argument without a value ‘pkgs’")
    );
}

#[test]
fn interrupt_discards_the_report() {
    let ev = DocumentEvaluator::from_json(&release()).unwrap();
    let interrupt = Interrupt::new();
    interrupt.trigger();
    let err = find_jobs(&ev, ev.root(), &EvalConfig::default(), None, &interrupt).unwrap_err();
    assert!(matches!(err, Error::Interrupted));
}

#[test]
fn aggregates_resolve_under_a_release_function() {
    let mut config = EvalConfig::default();
    config.argstrs.insert("system".into(), "x86_64-linux".into());
    let (report, stats) = run(
        json!({
            "__lambda": {
                "args": ["system"],
                "body": {
                    "hello": {
                        "type": "derivation",
                        "system": { "__arg": "system" },
                        "drvPath": "/store/aaa-hello.drv",
                        "outPath": "/store/aaa-hello"
                    },
                    "tested": {
                        "type": "derivation",
                        "system": { "__arg": "system" },
                        "outPath": "/store/ccc-tested",
                        "_hydraAggregate": true,
                        "constituents": [{ "__ref": "hello" }]
                    }
                }
            }
        }),
        &config,
    )
    .unwrap();
    assert_eq!(stats.errors, 0);
    let tested = report.get("tested").and_then(|e| e.as_job()).unwrap();
    assert_eq!(tested.constituents.as_deref(), Some("/store/aaa-hello.drv"));
}

#[test]
fn failing_metadata_is_recorded_as_an_error() {
    let (report, stats) = run(
        json!({
            "described": {
                "type": "derivation",
                "system": "x86_64-linux",
                "outPath": "/store/j",
                "meta": { "description": { "__throw": "description is broken" } }
            },
            "metaless": {
                "type": "derivation",
                "system": "x86_64-linux",
                "outPath": "/store/k",
                "meta": { "__throw": "meta broken" }
            },
            "fine": job("x86_64-linux", "/store/f")
        }),
        &EvalConfig::default(),
    )
    .unwrap();
    assert_eq!(
        report.get("described").and_then(|e| e.as_error()),
        Some("description is broken")
    );
    assert_eq!(report.get("metaless").and_then(|e| e.as_error()), Some("meta broken"));
    assert!(report.get("fine").and_then(|e| e.as_job()).is_some());
    assert_eq!(stats.errors, 2);
}
