use voxload_audio::{chunk_filename, ChunkPool};
use voxload_core::PoolError;

fn write_chunks(dir: &std::path::Path, indices: &[u32]) {
    for &i in indices {
        std::fs::write(dir.join(chunk_filename(i)), format!("webm-{i}")).unwrap();
    }
}

#[test]
fn test_load_reads_window_in_index_order() {
    let dir = tempfile::tempdir().unwrap();
    write_chunks(dir.path(), &[0, 1, 2, 3, 4]);

    let pool = ChunkPool::load(dir.path(), 1..=3).unwrap();
    assert_eq!(pool.len(), 3);

    let planned = pool.planned_chunks(pool.select_all());
    let names: Vec<_> = planned.iter().map(|c| c.filename.as_str()).collect();
    assert_eq!(names, vec!["chunk_001.webm", "chunk_002.webm", "chunk_003.webm"]);
    assert_eq!(planned[0].bytes, b"webm-1");
    assert_eq!(planned[2].index, 3);
}

#[test]
fn test_load_skips_missing_files() {
    let dir = tempfile::tempdir().unwrap();
    write_chunks(dir.path(), &[0, 2, 5]);

    let pool = ChunkPool::load(dir.path(), 0..=25).unwrap();
    assert_eq!(pool.len(), 3);
    let indices: Vec<_> = pool
        .planned_chunks(pool.select_all())
        .iter()
        .map(|c| c.index)
        .collect();
    assert_eq!(indices, vec![0, 2, 5]);
}

#[test]
fn test_load_ignores_unrelated_files() {
    let dir = tempfile::tempdir().unwrap();
    write_chunks(dir.path(), &[0]);
    std::fs::write(dir.path().join("chunk_1.webm"), b"unpadded").unwrap();
    std::fs::write(dir.path().join("notes.txt"), b"hello").unwrap();

    let pool = ChunkPool::load(dir.path(), 0..=3).unwrap();
    assert_eq!(pool.len(), 1);
}

#[test]
fn test_load_empty_directory_yields_empty_pool() {
    let dir = tempfile::tempdir().unwrap();
    let pool = ChunkPool::load(dir.path(), 0..=25).unwrap();
    assert!(pool.is_empty());
}

#[test]
fn test_load_missing_directory_fails() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nope");
    match ChunkPool::load(&missing, 0..=3) {
        Err(PoolError::Directory { path, .. }) => assert_eq!(path, missing),
        other => panic!("expected Directory error, got {other:?}"),
    }
}
