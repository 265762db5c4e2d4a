//! Records a simulated load-test run through a `SampleRecorder`, then replays
//! it in chunks and prints a per-label summary.

use std::thread;
use std::time::Duration;

use resultlog_core::{
    summarize, AssertionResult, ContentMask, ExtraInfo, Mode, ResultStore, SampleRecorder,
    SampleResult, StoreConfig,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_target(false).compact().init();

    // 1. Record: base info, extra info and sub-results only
    let config = StoreConfig::new("./results/demo.csv")
        .with_mode(Mode::Overwrite)
        .with_mask(ContentMask::BASE_INFO | ContentMask::EXTRA_INFO | ContentMask::SUB_RESULTS)
        .with_flush_interval(20, 200);
    let recorder = SampleRecorder::start(config.clone())?;

    for i in 0..100u64 {
        let label = if i % 3 == 0 { "login" } else { "browse" };
        let ok = i % 17 != 0;
        let sample = SampleResult::new(label, 40 + (i * 7) % 90, ok)
            .with_extra(ExtraInfo::current(if ok { "200" } else { "500" }, "demo"))
            .with_response_data("<html>...</html>")
            .with_assertion(AssertionResult::passed("status"))
            .with_sub_result(SampleResult::new(format!("{label}/static"), 5 + i % 4, true));
        recorder.record(sample);
        if i % 25 == 0 {
            thread::sleep(Duration::from_millis(10));
        }
    }

    let stats = recorder.close()?;
    println!("Recorded {} samples to {}", stats.written, config.path.display());

    // 2. Replay in chunks with the mask the log was written with
    let mut store = ResultStore::from_config(&config);
    store.open_source(Mode::Append, config.mask)?;
    let mut replayed = Vec::new();
    loop {
        let chunk = store.load_log_chunk(32)?;
        if chunk.is_empty() {
            break;
        }
        println!("  read {} records (position {})", chunk.len(), store.position()?);
        replayed.extend(chunk);
    }
    store.close_source()?;

    for s in summarize(&replayed) {
        println!(
            "{:<8} n={:<4} errors={:<3} mean={:.1}ms p90={}ms",
            s.label, s.samples, s.errors, s.mean_ms, s.p90_ms
        );
    }
    Ok(())
}
