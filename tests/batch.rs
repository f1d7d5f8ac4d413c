//! Integration tests for batch orchestration.
//!
//! Documents come from a synthetic fetcher that builds raster pages in
//! memory, so these tests need neither pdfium nor network access. Rows and
//! results live in the in-memory store and sink, except for the round trip
//! through `JsonRowStore` + `DirectorySink`. The vector-mode tests read a
//! PDF built with lopdf from a temp file.
//!
//! The tests at the bottom need a pdfium library and only run when
//! `E2E_ENABLED` is set:
//!   E2E_ENABLED=1 PDFIUM_LIB_PATH=/path/to/lib cargo test --test batch

use a4squeeze::{
    BatchConfig, BatchError, BatchProgressCallback, DirectorySink, Document, DocumentFetcher,
    FetchError, Job, JobId, JobOrchestrator, JobState, JsonRowStore, MemoryRowStore, MemorySink,
    Page, PageGeometry, RenderMode, RowStore,
};
use async_trait::async_trait;
use futures::StreamExt;
use image::{DynamicImage, Rgb, RgbImage};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

// ── Test helpers ─────────────────────────────────────────────────────────────

/// Builds documents from the source reference's scheme:
///
/// * `unreachable://…` → `FetchError::Unreachable`
/// * `missing://…`     → `FetchError::NotFound`
/// * `landscape://…`   → one US Letter landscape page
/// * anything else     → two US Letter portrait pages
///
/// With `cancel_on`, fetching that source cancels the given token, which
/// simulates a Ctrl-C arriving while the job is in flight.
#[derive(Default)]
struct SyntheticFetcher {
    calls: Mutex<HashMap<String, usize>>,
    cancel_on: Option<(String, CancellationToken)>,
}

impl SyntheticFetcher {
    fn cancelling_on(source_ref: &str, token: CancellationToken) -> Self {
        Self {
            cancel_on: Some((source_ref.to_string(), token)),
            ..Self::default()
        }
    }

    fn calls(&self, source_ref: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .get(source_ref)
            .copied()
            .unwrap_or(0)
    }

    fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }
}

#[async_trait]
impl DocumentFetcher for SyntheticFetcher {
    async fn fetch(&self, source_ref: &str) -> Result<Document, FetchError> {
        *self
            .calls
            .lock()
            .unwrap()
            .entry(source_ref.to_string())
            .or_default() += 1;

        if let Some((trigger, token)) = &self.cancel_on {
            if trigger == source_ref {
                token.cancel();
            }
        }
        if source_ref.starts_with("unreachable://") {
            return Err(FetchError::Unreachable {
                source_ref: source_ref.into(),
                reason: "connection refused".into(),
            });
        }
        if source_ref.starts_with("missing://") {
            return Err(FetchError::NotFound {
                source_ref: source_ref.into(),
            });
        }
        let page = |w: f32, h: f32| {
            Page::from_raster(
                PageGeometry::new(w, h),
                noisy((w / 4.0) as u32, (h / 4.0) as u32),
            )
        };
        if source_ref.starts_with("landscape://") {
            Ok(Document::new(vec![page(792.0, 612.0)]))
        } else {
            Ok(Document::new(vec![page(612.0, 792.0), page(612.0, 792.0)]))
        }
    }
}

/// Deterministic high-entropy raster.
fn noisy(w: u32, h: u32) -> DynamicImage {
    let mut state: u32 = 0x9E37_79B9;
    DynamicImage::ImageRgb8(RgbImage::from_fn(w, h, |_, _| {
        state ^= state << 13;
        state ^= state >> 17;
        state ^= state << 5;
        let b = state.to_le_bytes();
        Rgb([b[0], b[1], b[2]])
    }))
}

fn config() -> BatchConfig {
    BatchConfig::builder()
        .retry_backoff_ms(1)
        .build()
        .unwrap()
}

struct Harness {
    fetcher: Arc<SyntheticFetcher>,
    store: Arc<MemoryRowStore>,
    sink: Arc<MemorySink>,
    orchestrator: JobOrchestrator,
}

fn harness_with(store: MemoryRowStore, sink: MemorySink, config: BatchConfig) -> Harness {
    let fetcher = Arc::new(SyntheticFetcher::default());
    let store = Arc::new(store);
    let sink = Arc::new(sink);
    let orchestrator = JobOrchestrator::new(fetcher.clone(), store.clone(), sink.clone(), config);
    Harness {
        fetcher,
        store,
        sink,
        orchestrator,
    }
}

fn harness(jobs: Vec<Job>) -> Harness {
    harness_with(MemoryRowStore::new(jobs), MemorySink::new(), config())
}

fn id(s: &str) -> JobId {
    JobId::new(s)
}

// ── Skip policy and idempotence ──────────────────────────────────────────────

#[tokio::test]
async fn processes_eligible_rows_and_skips_finished_ones() {
    let h = harness(vec![
        Job::new("1", "INV-1", "https://example.org/inv1.pdf"),
        Job::new("2", "INV-2", "https://example.org/inv2.pdf").with_result_ref("https://x/y"),
    ]);

    let summary = h.orchestrator.run(&CancellationToken::new()).await.unwrap();

    assert_eq!(summary.total, 2);
    assert_eq!(summary.done, 1);
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.failed, 0);
    assert!(summary.is_clean());

    // Only INV-1 reached any stage.
    assert_eq!(h.fetcher.calls("https://example.org/inv1.pdf"), 1);
    assert_eq!(h.fetcher.calls("https://example.org/inv2.pdf"), 0);
    assert_eq!(h.sink.upload_count(), 1);
    assert_eq!(h.sink.uploads()[0].0, "INV-1.pdf");
    assert_eq!(h.store.write_calls(), 1);

    let inv1 = h.store.job(&id("1")).unwrap();
    assert!(inv1.result_ref.starts_with("memory://"));
    assert!(inv1.status.starts_with("COMPRESSED q="), "{}", inv1.status);

    let inv2 = h.store.job(&id("2")).unwrap();
    assert_eq!(inv2.result_ref, "https://x/y");
    assert_eq!(inv2.status, "");

    assert_eq!(summary.outcome(&id("1")).unwrap().state, JobState::Done);
    assert_eq!(summary.outcome(&id("2")).unwrap().state, JobState::Skipped);
}

#[tokio::test]
async fn second_run_is_a_no_op() {
    let h = harness(vec![
        Job::new("1", "A", "https://example.org/a.pdf"),
        Job::new("2", "B", "landscape://b"),
    ]);
    let cancel = CancellationToken::new();

    let first = h.orchestrator.run(&cancel).await.unwrap();
    assert_eq!(first.done, 2);
    let rows_after_first = h.store.jobs();

    let second = h.orchestrator.run(&cancel).await.unwrap();
    assert_eq!(second.done, 0);
    assert_eq!(second.skipped, 2);
    assert_eq!(h.fetcher.total_calls(), 2);
    assert_eq!(h.sink.upload_count(), 2);
    assert_eq!(h.store.jobs(), rows_after_first);
}

// ── Failure isolation ────────────────────────────────────────────────────────

#[tokio::test]
async fn one_unreachable_source_does_not_stop_the_batch() {
    let h = harness(vec![
        Job::new("1", "A", "https://example.org/a.pdf"),
        Job::new("2", "B", "unreachable://b"),
        Job::new("3", "C", "https://example.org/c.pdf"),
    ]);

    let summary = h.orchestrator.run(&CancellationToken::new()).await.unwrap();

    assert_eq!((summary.done, summary.skipped, summary.failed), (2, 0, 1));
    assert_eq!(summary.failures.len(), 1);
    assert_eq!(summary.failures[0].label, "B");
    assert!(summary.failures[0].reason.starts_with("ERROR: fetch failed"));

    // Initial attempt + 2 retries.
    assert_eq!(h.fetcher.calls("unreachable://b"), 3);

    let b = h.store.job(&id("2")).unwrap();
    assert_eq!(b.result_ref, "");
    assert!(b.status.starts_with("ERROR:"), "{}", b.status);
    assert!(b.status.chars().count() <= 250);

    assert!(!h.store.job(&id("3")).unwrap().result_ref.is_empty());
}

#[tokio::test]
async fn not_found_is_not_retried() {
    let h = harness(vec![Job::new("1", "A", "missing://a")]);
    let summary = h.orchestrator.run(&CancellationToken::new()).await.unwrap();
    assert_eq!(summary.failed, 1);
    assert_eq!(h.fetcher.calls("missing://a"), 1);
    assert!(summary.failures[0].reason.contains("not found"));
}

#[tokio::test]
async fn unreachable_budget_fails_the_job_without_uploading() {
    let h = harness_with(
        MemoryRowStore::new(vec![Job::new("1", "A", "https://example.org/a.pdf")]),
        MemorySink::new(),
        BatchConfig::builder()
            .size_ceiling_bytes(500)
            .max_trials(3)
            .build()
            .unwrap(),
    );

    let summary = h.orchestrator.run(&CancellationToken::new()).await.unwrap();

    assert_eq!(summary.failed, 1);
    assert_eq!(h.sink.upload_count(), 0);
    let row = h.store.job(&id("1")).unwrap();
    assert!(row.status.contains("budget unreachable"), "{}", row.status);
    assert_eq!(row.result_ref, "");
}

#[tokio::test]
async fn upload_failure_leaves_no_result_reference() {
    let h = harness_with(
        MemoryRowStore::new(vec![Job::new("1", "A", "https://example.org/a.pdf")]),
        MemorySink::failing(),
        config(),
    );
    let summary = h.orchestrator.run(&CancellationToken::new()).await.unwrap();
    assert_eq!(summary.failed, 1);
    let row = h.store.job(&id("1")).unwrap();
    assert_eq!(row.result_ref, "");
    assert!(row.status.starts_with("ERROR: upload failed"), "{}", row.status);
}

#[tokio::test]
async fn failed_write_back_is_reported_as_failure() {
    let h = harness_with(
        MemoryRowStore::new(vec![
            Job::new("1", "A", "https://example.org/a.pdf"),
            Job::new("2", "B", "https://example.org/b.pdf"),
        ])
        .fail_writes_for("1"),
        MemorySink::new(),
        config(),
    );
    let summary = h.orchestrator.run(&CancellationToken::new()).await.unwrap();
    assert_eq!((summary.done, summary.failed), (1, 1));
    assert!(summary.failures[0].reason.starts_with("ERROR: write-back failed"));
    assert_eq!(h.store.job(&id("1")).unwrap().result_ref, "");
}

#[tokio::test]
async fn unavailable_row_store_is_fatal_before_any_job() {
    let h = harness_with(MemoryRowStore::unavailable(), MemorySink::new(), config());
    let err = h
        .orchestrator
        .run(&CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, BatchError::RowStoreUnavailable(_)), "{err:?}");
    assert_eq!(h.fetcher.total_calls(), 0);
}

// ── Output invariants ────────────────────────────────────────────────────────

#[tokio::test]
async fn output_is_a4_same_page_count_and_under_ceiling() {
    let ceiling = 400_000;
    let h = harness_with(
        MemoryRowStore::new(vec![
            Job::new("1", "portrait", "https://example.org/a.pdf"),
            Job::new("2", "landscape", "landscape://b"),
        ]),
        MemorySink::new(),
        BatchConfig::builder()
            .size_ceiling_bytes(ceiling)
            .build()
            .unwrap(),
    );
    let summary = h.orchestrator.run(&CancellationToken::new()).await.unwrap();
    assert_eq!(summary.done, 2);

    let uploads = h.sink.uploads();
    let expected_pages = [2usize, 1];
    for ((name, bytes), pages) in uploads.iter().zip(expected_pages) {
        assert!(bytes.len() as u64 <= ceiling, "{name}: {} bytes", bytes.len());
        let pdf = lopdf::Document::load_mem(bytes).unwrap();
        let page_ids = pdf.get_pages();
        assert_eq!(page_ids.len(), pages, "{name}");
        for (_, page_id) in page_ids {
            let dict = pdf.get_object(page_id).unwrap().as_dict().unwrap();
            let media = dict.get(b"MediaBox").unwrap().as_array().unwrap();
            let w = media[2].as_float().unwrap();
            let h = media[3].as_float().unwrap();
            assert!((w - PageGeometry::A4.width_pt).abs() < 0.01, "{name}: w={w}");
            assert!((h - PageGeometry::A4.height_pt).abs() < 0.01, "{name}: h={h}");
        }
    }

    let report = summary.outcome(&id("1")).unwrap().compression.clone().unwrap();
    assert_eq!(report.final_size_bytes, uploads[0].1.len() as u64);
    assert!(!report.attempts.is_empty() && report.attempts.len() <= 8);
}

// ── Scheduling: offset, concurrency, cancellation ────────────────────────────

#[tokio::test]
async fn start_offset_skips_leading_rows_entirely() {
    let h = harness_with(
        MemoryRowStore::new(vec![
            Job::new("1", "A", "https://example.org/a.pdf"),
            Job::new("2", "B", "https://example.org/b.pdf"),
            Job::new("3", "C", "https://example.org/c.pdf"),
        ]),
        MemorySink::new(),
        BatchConfig::builder().start_offset(1).build().unwrap(),
    );
    let summary = h.orchestrator.run(&CancellationToken::new()).await.unwrap();
    assert_eq!(summary.total, 2);
    assert!(summary.outcome(&id("1")).is_none());
    assert_eq!(h.fetcher.calls("https://example.org/a.pdf"), 0);
    assert_eq!(h.store.job(&id("1")).unwrap().status, "");
}

#[tokio::test]
async fn concurrent_run_accounts_for_every_job_in_worklist_order() {
    let jobs: Vec<Job> = (1..=6)
        .map(|i| Job::new(i.to_string(), format!("J{i}"), format!("https://example.org/{i}.pdf")))
        .collect();
    let h = harness_with(
        MemoryRowStore::new(jobs),
        MemorySink::new(),
        BatchConfig::builder().concurrency(4).build().unwrap(),
    );
    let summary = h.orchestrator.run(&CancellationToken::new()).await.unwrap();
    assert_eq!(summary.done, 6);
    let order: Vec<&str> = summary.outcomes.iter().map(|o| o.job_id.as_str()).collect();
    assert_eq!(order, ["1", "2", "3", "4", "5", "6"]);
}

#[tokio::test]
async fn cancelled_run_touches_nothing_and_reports_every_job() {
    let h = harness(vec![
        Job::new("1", "A", "https://example.org/a.pdf"),
        Job::new("2", "B", "https://example.org/b.pdf"),
    ]);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let summary = h.orchestrator.run(&cancel).await.unwrap();

    assert_eq!(summary.total, 2);
    assert_eq!(summary.cancelled, 2);
    assert_eq!(summary.done + summary.skipped + summary.failed, 0);
    assert!(!summary.is_clean());
    assert_eq!(h.fetcher.total_calls(), 0);
    assert_eq!(h.store.write_calls(), 0);
}

#[tokio::test]
async fn cancellation_during_a_job_lets_it_finish_and_stops_the_rest() {
    let cancel = CancellationToken::new();
    let fetcher = Arc::new(SyntheticFetcher::cancelling_on(
        "https://example.org/a.pdf",
        cancel.clone(),
    ));
    let store = Arc::new(MemoryRowStore::new(vec![
        Job::new("1", "A", "https://example.org/a.pdf"),
        Job::new("2", "B", "https://example.org/b.pdf"),
        Job::new("3", "C", "https://example.org/c.pdf").with_result_ref("https://x/c"),
    ]));
    let sink = Arc::new(MemorySink::new());
    let orchestrator =
        JobOrchestrator::new(fetcher.clone(), store.clone(), sink.clone(), config());

    let summary = orchestrator.run(&cancel).await.unwrap();

    // The in-flight job completes and is written back.
    let a = summary.outcome(&id("1")).unwrap();
    assert_eq!(a.state, JobState::Done);
    assert!(!a.cancelled);
    let row = store.job(&id("1")).unwrap();
    assert!(row.result_ref.starts_with("memory://"), "{}", row.result_ref);
    assert!(row.status.starts_with("COMPRESSED"), "{}", row.status);

    // Later jobs never start.
    let b = summary.outcome(&id("2")).unwrap();
    assert!(b.cancelled);
    assert_eq!(b.state, JobState::Pending);
    assert_eq!(fetcher.calls("https://example.org/b.pdf"), 0);
    assert_eq!(store.job(&id("2")).unwrap().status, "");

    // A finished row is still reported as skipped.
    assert_eq!(summary.outcome(&id("3")).unwrap().state, JobState::Skipped);

    assert_eq!((summary.done, summary.cancelled, summary.skipped), (1, 1, 1));
    assert_eq!(store.write_calls(), 1);
    assert_eq!(sink.upload_count(), 1);
    assert!(!summary.is_clean());
}

#[tokio::test]
async fn cancelled_run_still_reports_finished_rows_as_skipped() {
    let h = harness(vec![
        Job::new("1", "A", "https://example.org/a.pdf").with_result_ref("https://x/a"),
        Job::new("2", "B", "https://example.org/b.pdf"),
    ]);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let summary = h.orchestrator.run(&cancel).await.unwrap();

    let a = summary.outcome(&id("1")).unwrap();
    assert_eq!(a.state, JobState::Skipped);
    assert!(!a.cancelled);
    assert!(summary.outcome(&id("2")).unwrap().cancelled);
    assert_eq!((summary.skipped, summary.cancelled), (1, 1));
    assert_eq!(h.fetcher.total_calls(), 0);
    assert_eq!(h.store.write_calls(), 0);
}

#[tokio::test]
async fn outcome_stream_yields_each_job_once() {
    let h = harness(vec![]);
    let jobs = vec![
        Job::new("1", "A", "https://example.org/a.pdf"),
        Job::new("2", "B", "missing://b"),
        Job::new("3", "C", "https://example.org/c.pdf").with_result_ref("done"),
    ];
    let mut outcomes: Vec<_> = h
        .orchestrator
        .outcome_stream(jobs, CancellationToken::new())
        .collect()
        .await;
    outcomes.sort_by(|a, b| a.job_id.cmp(&b.job_id));
    let states: Vec<JobState> = outcomes.iter().map(|o| o.state).collect();
    assert_eq!(states, [JobState::Done, JobState::Failed, JobState::Skipped]);
}

#[derive(Default)]
struct CountingCallback {
    started: AtomicUsize,
    skipped: AtomicUsize,
    completed: AtomicUsize,
    errored: AtomicUsize,
    batch_total: AtomicUsize,
}

impl BatchProgressCallback for CountingCallback {
    fn on_batch_start(&self, total_jobs: usize) {
        self.batch_total.store(total_jobs, Ordering::SeqCst);
    }
    fn on_job_start(&self, _label: &str) {
        self.started.fetch_add(1, Ordering::SeqCst);
    }
    fn on_job_skipped(&self, _label: &str) {
        self.skipped.fetch_add(1, Ordering::SeqCst);
    }
    fn on_job_complete(&self, _label: &str, _result_ref: &str, _size_bytes: u64) {
        self.completed.fetch_add(1, Ordering::SeqCst);
    }
    fn on_job_error(&self, _label: &str, _error: &str) {
        self.errored.fetch_add(1, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn progress_callback_sees_every_event() {
    let cb = Arc::new(CountingCallback::default());
    let h = harness_with(
        MemoryRowStore::new(vec![
            Job::new("1", "A", "https://example.org/a.pdf"),
            Job::new("2", "B", "missing://b"),
            Job::new("3", "C", "https://example.org/c.pdf").with_result_ref("done"),
        ]),
        MemorySink::new(),
        BatchConfig::builder()
            .progress_callback(cb.clone())
            .build()
            .unwrap(),
    );
    h.orchestrator.run(&CancellationToken::new()).await.unwrap();

    assert_eq!(cb.batch_total.load(Ordering::SeqCst), 3);
    assert_eq!(cb.started.load(Ordering::SeqCst), 2);
    assert_eq!(cb.completed.load(Ordering::SeqCst), 1);
    assert_eq!(cb.errored.load(Ordering::SeqCst), 1);
    assert_eq!(cb.skipped.load(Ordering::SeqCst), 1);
}

// ── File-backed store and sink ───────────────────────────────────────────────

#[tokio::test]
async fn json_worklist_and_directory_sink_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let worklist = dir.path().join("jobs.json");
    std::fs::write(
        &worklist,
        serde_json::to_vec(&serde_json::json!([
            { "label": "INV-1", "source_ref": "https://example.org/1.pdf" },
            { "label": "", "source_ref": "" },
            { "label": "INV/3", "source_ref": "landscape://3" }
        ]))
        .unwrap(),
    )
    .unwrap();

    let fetcher = Arc::new(SyntheticFetcher::default());
    let store = Arc::new(JsonRowStore::new(&worklist));
    let sink = Arc::new(DirectorySink::new(dir.path().join("out")));
    let orchestrator = JobOrchestrator::new(fetcher.clone(), store.clone(), sink, config());

    let summary = orchestrator.run(&CancellationToken::new()).await.unwrap();
    assert_eq!(summary.total, 2);
    assert_eq!(summary.done, 2);

    let jobs = store.list_jobs().await.unwrap();
    assert_eq!(jobs[0].id, id("1"));
    assert_eq!(jobs[1].id, id("3"));
    assert!(jobs[0].result_ref.starts_with("file://"));
    assert!(jobs[1].result_ref.ends_with("/out/INV_3.pdf"), "{}", jobs[1].result_ref);
    assert!(dir.path().join("out/INV-1.pdf").exists());
    assert!(dir.path().join("out/INV_3.pdf").exists());

    let again = orchestrator.run(&CancellationToken::new()).await.unwrap();
    assert_eq!(again.skipped, 2);
    assert_eq!(fetcher.total_calls(), 2);
}

// ── Vector mode ──────────────────────────────────────────────────────────────

/// A one-page US Letter landscape PDF with a filled rectangle and a line of
/// Helvetica.
fn landscape_pdf() -> Vec<u8> {
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Object, Stream};

    let mut doc = lopdf::Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let content = Content {
        operations: vec![
            Operation::new("rg", vec![0.2.into(), 0.4.into(), 0.8.into()]),
            Operation::new(
                "re",
                vec![72.into(), 72.into(), 648.into(), 468.into()],
            ),
            Operation::new("f", vec![]),
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), 18.into()]),
            Operation::new("Td", vec![100.into(), 300.into()]),
            Operation::new("Tj", vec![Object::string_literal("Quarterly invoice")]),
            Operation::new("ET", vec![]),
        ],
    };
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "MediaBox" => vec![0.into(), 0.into(), 792.into(), 612.into()],
        "Contents" => content_id,
        "Resources" => dictionary! { "Font" => dictionary! { "F1" => font_id } },
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    let mut buf = Vec::new();
    doc.save_to(&mut buf).unwrap();
    buf
}

/// Content of every Form XObject in `pdf`, decompressed and concatenated.
fn form_contents(pdf: &lopdf::Document) -> String {
    pdf.objects
        .values()
        .filter_map(|o| o.as_stream().ok())
        .filter(|s| {
            s.dict
                .get(b"Subtype")
                .and_then(lopdf::Object::as_name)
                .map(|n| n == b"Form")
                .unwrap_or(false)
        })
        .map(|s| String::from_utf8_lossy(&s.get_plain_content().unwrap()).into_owned())
        .collect()
}

#[tokio::test]
async fn vector_mode_keeps_text_without_pdfium() {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("letter-landscape.pdf");
    std::fs::write(&src, landscape_pdf()).unwrap();
    let config = BatchConfig::builder()
        .pdfium_lib_path(dir.path().join("no-such-libpdfium.so"))
        .build()
        .unwrap();
    assert_eq!(config.render_mode, RenderMode::Vector);

    let pressed = a4squeeze::press_document(&src.to_string_lossy(), &config)
        .await
        .expect("press_document");

    assert_eq!(pressed.page_count, 1);
    let pdf = lopdf::Document::load_mem(&pressed.bytes).unwrap();
    let pages = pdf.get_pages();
    assert_eq!(pages.len(), 1);
    let page = pdf.get_dictionary(pages[&1]).unwrap();
    let media = page.get(b"MediaBox").unwrap().as_array().unwrap();
    assert!((media[2].as_float().unwrap() - PageGeometry::A4.width_pt).abs() < 0.01);
    assert!((media[3].as_float().unwrap() - PageGeometry::A4.height_pt).abs() < 0.01);

    let forms = form_contents(&pdf);
    assert!(forms.contains("Tj"), "text operators lost: {forms}");
    assert!(forms.contains("Quarterly invoice"));
    // No page was turned into a picture.
    let images = pdf
        .objects
        .values()
        .filter_map(|o| o.as_stream().ok())
        .filter(|s| s.dict.get(b"Subtype").and_then(lopdf::Object::as_name).ok() == Some(b"Image".as_slice()))
        .count();
    assert_eq!(images, 0);
}

#[tokio::test]
async fn raster_mode_needs_pdfium_up_front() {
    let dir = tempfile::tempdir().unwrap();
    let config = BatchConfig::builder()
        .render_mode(RenderMode::Raster)
        .pdfium_lib_path(dir.path().join("no-such-libpdfium.so"))
        .build()
        .unwrap();
    match JobOrchestrator::from_config(
        Arc::new(MemoryRowStore::new(vec![])),
        Arc::new(MemorySink::new()),
        config.clone(),
    ) {
        Err(BatchError::PdfiumBindingFailed(_)) => {}
        Err(other) => panic!("expected a binding failure, got {other:?}"),
        Ok(_) => panic!("raster mode started without pdfium"),
    }

    let vector = BatchConfig {
        render_mode: RenderMode::Vector,
        ..config
    };
    assert!(JobOrchestrator::from_config(
        Arc::new(MemoryRowStore::new(vec![])),
        Arc::new(MemorySink::new()),
        vector,
    )
    .is_ok());
}

// ── Live pdfium tests (E2E_ENABLED) ──────────────────────────────────────────

#[tokio::test]
async fn e2e_press_real_pdf_with_pdfium() {
    if std::env::var("E2E_ENABLED").is_err() {
        println!("SKIP: set E2E_ENABLED=1 to run e2e tests");
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("letter-landscape.pdf");
    std::fs::write(&src, landscape_pdf()).unwrap();

    let config = BatchConfig::builder()
        .render_mode(RenderMode::Raster)
        .build()
        .unwrap();
    let pressed = a4squeeze::press_document(&src.to_string_lossy(), &config)
        .await
        .expect("press_document");

    assert_eq!(pressed.page_count, 1);
    assert!(pressed.bytes.len() as u64 <= 1_048_576);
    let pdf = lopdf::Document::load_mem(&pressed.bytes).unwrap();
    assert_eq!(pdf.get_pages().len(), 1);
}

#[tokio::test]
async fn e2e_non_pdf_source_is_unsupported() {
    if std::env::var("E2E_ENABLED").is_err() {
        println!("SKIP: set E2E_ENABLED=1 to run e2e tests");
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("page.html");
    std::fs::write(&src, b"<html><body>not a pdf</body></html>").unwrap();

    let err = a4squeeze::press_document(&src.to_string_lossy(), &BatchConfig::default())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("unsupported document format"), "{err}");
}
