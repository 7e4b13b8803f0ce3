#![cfg(unix)]

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use feedsync::source::BatchFileSource;
use feedsync::{
    CollectStop, Collector, CollectorConfig, CommandAction, CompositeAction, FileCheckpointStore,
    LedgerFile, ProcessStop, Processor, ProcessorConfig, SyncPaths,
};

fn archive_steps(out: &Path) -> CompositeAction {
    CompositeAction::new("item")
        .with_part(Box::new(
            CommandAction::new("broken", "false", out).with_success_detail("never"),
        ))
        .with_part(Box::new(
            CommandAction::new("touch", "sh", out)
                .with_args(["-c", "touch \"$0/$1.txt\"", "{out}", "{id}"])
                .with_success_detail("touched"),
        ))
}

fn sync_once(paths: &SyncPaths, batches: &str) -> (CollectStop, ProcessStop, usize) {
    let batch_path = paths.archive_dir.with_extension("batches");
    fs::write(&batch_path, batches).unwrap();
    let mut source = BatchFileSource::open(&batch_path).unwrap();
    let collected = Collector::new(LedgerFile::new(&paths.ledger), CollectorConfig::default())
        .run(&mut source)
        .unwrap();

    let store = Arc::new(FileCheckpointStore::new(&paths.checkpoint));
    let processor = Processor::new(
        store,
        ProcessorConfig {
            delay: Duration::ZERO,
            max_items: None,
        },
    );
    let report = processor
        .run(&collected.ledger, &mut archive_steps(&paths.archive_dir))
        .unwrap();
    (collected.report.stop, report.stop, report.archived)
}

#[test]
fn collect_then_archive_resumes_across_runs() {
    let temp = tempfile::tempdir().unwrap();
    let paths = SyncPaths::in_dir(temp.path());

    let first = sync_once(
        &paths,
        "# first visit\nhttps://x.com/a/status/30 https://x.com/b/status/20\n\n20 10\n",
    );
    assert_eq!(first, (CollectStop::SourceEnd, ProcessStop::Completed, 3));
    for id in ["10", "20", "30"] {
        assert!(paths.archive_dir.join(format!("{id}.txt")).exists());
    }
    assert_eq!(
        fs::read_to_string(&paths.ledger).unwrap(),
        "30\n20\n10\n"
    );

    // Later visit: two new likes on top, then already-known items.
    let second = sync_once(&paths, "50 40\n\n40 30 20\n");
    assert_eq!(second, (CollectStop::Overlap, ProcessStop::Completed, 2));
    assert_eq!(
        fs::read_to_string(&paths.ledger).unwrap(),
        "50\n40\n30\n20\n10\n"
    );
    assert_eq!(
        fs::read_to_string(&paths.checkpoint).unwrap().trim(),
        "50"
    );
}
