mod common;

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::{init_logging, network_down, ScriptedTransport};
use jobdeck_client::{
    CreateJob, FileCache, JobRegistry, KeyValueCache, MemoryCache, TRACKED_JOBS_KEY,
};
use jobdeck_core::{FinishReason, JobPhase, JobStatus, PollPolicy};
use pretty_assertions::assert_eq;
use serde_json::json;

fn registry_with(
    transport: &Arc<ScriptedTransport>,
    persisted: &[&str],
) -> (JobRegistry, Arc<MemoryCache>) {
    let cache = Arc::new(MemoryCache::with_entry(TRACKED_JOBS_KEY, json!(persisted)));
    let registry = JobRegistry::new(transport.clone(), cache.clone(), PollPolicy::default());
    (registry, cache)
}

fn ids(jobs: &[jobdeck_client::JobHandle]) -> Vec<String> {
    jobs.iter().map(|job| job.id().to_string()).collect()
}

async fn advance(secs: u64) {
    tokio::time::sleep(Duration::from_secs(secs)).await;
}

#[tokio::test(start_paused = true)]
async fn initialize_drops_finished_jobs_and_polls_the_rest() {
    init_logging();
    let transport = ScriptedTransport::new();
    transport.script_status("a", &[("finished", 1.0)]);
    transport.script_status("b", &[("running", 0.4)]);
    let (registry, cache) = registry_with(&transport, &["a", "b"]);

    let events = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&events);
    let _sub = registry.on_jobs_change(move |jobs| seen.lock().unwrap().push(ids(jobs)));

    registry.initialize_jobs().await;

    assert_eq!(ids(&registry.jobs()), vec!["b"]);
    assert_eq!(registry.tracked_ids(), vec!["b"]);
    assert_eq!(cache.get(TRACKED_JOBS_KEY), Some(json!(["b"])));
    assert_eq!(*events.lock().unwrap(), vec![vec!["b".to_string()]]);

    let b = registry.find("b").unwrap();
    assert_eq!(b.phase(), JobPhase::Polling);
    advance(4).await;
    assert_eq!(transport.calls("/job/b/status"), 2);
    assert_eq!(transport.calls("/job/a/status"), 1);

    registry.dispose();
}

#[tokio::test(start_paused = true)]
async fn created_job_reports_progress_then_finishes_once() {
    init_logging();
    let transport = ScriptedTransport::new();
    transport.script_status("x", &[("running", 0.1), ("running", 0.5), ("finished", 1.0)]);
    transport.script_status("y", &[("finished", 1.0)]);
    let (registry, cache) = registry_with(&transport, &["y"]);

    let percents = Arc::new(Mutex::new(Vec::<BTreeMap<String, f64>>::new()));
    let seen = Arc::clone(&percents);
    let _sub = registry.on_jobs_percent_change(move |map| seen.lock().unwrap().push(map.clone()));

    let finishes = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&finishes);
    let job = registry.create_job(
        CreateJob::new("x").on_finish(move |reason| seen.lock().unwrap().push(*reason)),
    );
    let updates = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&updates);
    job.on_update(move |snapshot| seen.lock().unwrap().push((snapshot.status, snapshot.percent)));

    assert_eq!(registry.tracked_ids(), vec!["y", "x"]);
    advance(30).await;

    assert_eq!(
        *updates.lock().unwrap(),
        vec![(JobStatus::Running, 0.5), (JobStatus::Finished, 1.0)]
    );
    assert_eq!(*finishes.lock().unwrap(), vec![FinishReason::Finished]);
    assert!(registry.jobs().is_empty());
    assert_eq!(job.phase(), JobPhase::Disposed);

    // The refresh pass after the finish pruned "y" as well.
    assert_eq!(transport.calls("/job/y/status"), 1);
    assert_eq!(cache.get(TRACKED_JOBS_KEY), Some(json!([])));

    let percents = percents.lock().unwrap();
    assert_eq!(percents.len(), 2);
    assert_eq!(percents[0].get("x"), Some(&0.5));
    assert_eq!(percents[1].get("x"), Some(&1.0));
}

#[tokio::test(start_paused = true)]
async fn create_job_forwards_tips() {
    init_logging();
    let transport = ScriptedTransport::new();
    transport.script(
        "/job/x/status",
        [Ok(json!({ "status": "finished", "percent": 0.3, "error": "quota exceeded" }))],
    );
    let (registry, _) = registry_with(&transport, &[]);

    let tips = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&tips);
    registry.create_job(CreateJob::new("x").on_tip(move |tip| seen.lock().unwrap().push(tip.to_string())));
    advance(10).await;

    assert_eq!(*tips.lock().unwrap(), vec!["Job x failed: quota exceeded".to_string()]);
    assert!(registry.tracked_ids().is_empty());
}

#[tokio::test]
async fn appending_the_same_job_twice_tracks_it_once() {
    init_logging();
    let transport = ScriptedTransport::new();
    let (registry, _) = registry_with(&transport, &[]);

    let changes = Arc::new(Mutex::new(0));
    let counter = Arc::clone(&changes);
    let _sub = registry.on_jobs_change(move |_| *counter.lock().unwrap() += 1);

    let first = registry.append_job(registry.job("a"));
    let again = registry.append_job(first.clone());
    let other = registry.append_job(registry.job("a"));

    assert!(again.ptr_eq(&first));
    assert!(other.ptr_eq(&first));
    assert_eq!(ids(&registry.jobs()), vec!["a"]);
    assert_eq!(registry.tracked_ids(), vec!["a"]);
    assert_eq!(*changes.lock().unwrap(), 1);
}

#[tokio::test(start_paused = true)]
async fn removing_a_job_forgets_it_and_stops_polling() {
    init_logging();
    let transport = ScriptedTransport::new();
    transport.script_status("a", &[("running", 0.2)]);
    let (registry, cache) = registry_with(&transport, &[]);

    let job = registry.append_job(registry.job("a"));
    job.wait_finish();
    advance(4).await;
    registry.remove_job(&job);
    advance(30).await;

    assert!(registry.jobs().is_empty());
    assert_eq!(cache.get(TRACKED_JOBS_KEY), Some(json!([])));
    assert_eq!(transport.calls("/job/a/status"), 1);
    assert_eq!(job.phase(), JobPhase::Disposed);

    // Removing an untracked job changes nothing.
    registry.remove_job(&registry.job("zzz"));
    assert!(registry.jobs().is_empty());
}

#[tokio::test(start_paused = true)]
async fn job_found_over_by_a_refresh_still_reports_its_finish() {
    init_logging();
    let transport = ScriptedTransport::new();
    transport.script_status("x", &[("running", 0.1), ("finished", 1.0)]);
    transport.script_status("y", &[("finished", 1.0)]);
    let (registry, cache) = registry_with(&transport, &[]);

    let finishes = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&finishes);
    let x = registry.create_job(
        CreateJob::new("x").on_finish(move |reason| seen.lock().unwrap().push(("x", *reason))),
    );
    advance(1).await;
    let seen = Arc::clone(&finishes);
    registry.create_job(
        CreateJob::new("y").on_finish(move |reason| seen.lock().unwrap().push(("y", *reason))),
    );
    advance(30).await;

    // y finishes first; the refresh pass it triggers sees x is over too.
    assert_eq!(
        *finishes.lock().unwrap(),
        vec![("y", FinishReason::Finished), ("x", FinishReason::Finished)]
    );
    assert_eq!(transport.calls("/job/x/status"), 2);
    assert!(registry.jobs().is_empty());
    assert_eq!(x.phase(), JobPhase::Disposed);
    assert_eq!(cache.get(TRACKED_JOBS_KEY), Some(json!([])));
}

#[tokio::test]
async fn refresh_removes_jobs_that_are_over() {
    init_logging();
    let transport = ScriptedTransport::new();
    transport.script_status("a", &[("paused", 0.2)]);
    transport.script_status("b", &[("running", 0.4)]);
    let (registry, _) = registry_with(&transport, &[]);
    let a = registry.append_job(registry.job("a"));
    registry.append_job(registry.job("b"));

    registry.refresh_jobs().await;

    assert_eq!(ids(&registry.jobs()), vec!["b"]);
    assert_eq!(registry.tracked_ids(), vec!["b"]);
    assert_eq!(a.phase(), JobPhase::Disposed);
}

#[tokio::test(start_paused = true)]
async fn unreachable_jobs_stay_tracked_on_startup() {
    init_logging();
    let transport = ScriptedTransport::new();
    transport.script("/job/a/status", [Err(network_down())]);
    let (registry, _) = registry_with(&transport, &["a", "a", ""]);

    registry.initialize_jobs().await;

    assert_eq!(ids(&registry.jobs()), vec!["a"]);
    assert_eq!(registry.tracked_ids(), vec!["a"]);
    registry.dispose();
}

#[tokio::test(start_paused = true)]
async fn abandoned_jobs_stay_persisted() {
    init_logging();
    let transport = ScriptedTransport::new();
    transport.script("/job/a/status", [Err(network_down())]);
    let cache = Arc::new(MemoryCache::new());
    let policy = PollPolicy {
        max_consecutive_failures: Some(1),
        ..PollPolicy::default()
    };
    let registry = JobRegistry::new(transport.clone(), cache.clone(), policy);

    let job = registry.append_job(registry.job("a"));
    job.wait_finish();
    advance(10).await;

    assert!(registry.jobs().is_empty());
    assert_eq!(registry.tracked_ids(), vec!["a"]);
}

#[tokio::test(start_paused = true)]
async fn tracked_ids_survive_a_restart() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let transport = ScriptedTransport::new();
    transport.script_status("a", &[("running", 0.1)]);

    let first = JobRegistry::new(
        transport.clone(),
        Arc::new(FileCache::open(dir.path()).unwrap()),
        PollPolicy::default(),
    );
    first.append_job(first.job("a"));
    first.dispose();

    let second = JobRegistry::new(
        transport.clone(),
        Arc::new(FileCache::open(dir.path()).unwrap()),
        PollPolicy::default(),
    );
    assert_eq!(second.tracked_ids(), vec!["a"]);
    second.initialize_jobs().await;
    assert_eq!(ids(&second.jobs()), vec!["a"]);
    second.dispose();
}
