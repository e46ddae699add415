//! End-to-end engine behavior: embedding, publishing, persistence, drift
//! detection and concurrent reads during rebuilds.

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use common::{KeywordEmbedder, job_corpus, random_vectors, with_ids};
use jobmatch::matching::{current_generation, ids_blob_name, index_blob_name};
use jobmatch::vector::{Quantization, QuantizerConfig};
use jobmatch::{
    BlobStore, EngineConfig, EngineError, FsBlobStore, InMemoryRecordStore, MatchEngine,
    MemoryBlobStore, RecordId, StorageError, StorageResult, VectorDimension, VectorError,
    VectorStore,
};
use tempfile::TempDir;

const INDEX: &str = "job_matching_index";

fn engine_with(blobs: Arc<dyn BlobStore>) -> MatchEngine {
    let config = EngineConfig {
        quantizer: QuantizerConfig {
            quantization: Quantization::Flat,
            ..Default::default()
        },
        preview_chars: 12,
        ..Default::default()
    };
    MatchEngine::new(
        Arc::new(KeywordEmbedder::new(8)),
        Arc::new(InMemoryRecordStore::from_records(job_corpus())),
        blobs,
        config,
    )
}

fn embedded_store(engine: &MatchEngine, dir: &TempDir) -> VectorStore {
    let mut store =
        VectorStore::open_or_create(dir.path(), VectorDimension::new(8).unwrap()).unwrap();
    engine.embed_records(&job_corpus(), &mut store, None).unwrap();
    store
}

#[test]
fn blank_descriptions_are_not_embedded() {
    let dir = TempDir::new().unwrap();
    let engine = engine_with(Arc::new(MemoryBlobStore::new()));
    let mut store =
        VectorStore::open_or_create(dir.path(), VectorDimension::new(8).unwrap()).unwrap();

    let embedded = engine.embed_records(&job_corpus(), &mut store, None).unwrap();
    assert_eq!(embedded, 6);
    assert_eq!(store.vector_count(), 6);
    assert!(store.read_vector(RecordId::new(7)).unwrap().is_none());
}

#[test]
fn resume_matches_closest_posting() {
    let dir = TempDir::new().unwrap();
    let engine = engine_with(Arc::new(MemoryBlobStore::new()));
    assert!(engine.match_text("python data cloud", 3).unwrap().is_empty());

    let mut store = embedded_store(&engine, &dir);
    engine.rebuild_from_store(&mut store).unwrap();

    let results = engine
        .match_text("Senior engineer: python, data and cloud platforms", 3)
        .unwrap();
    assert_eq!(results.len(), 3);
    assert_eq!(results[0].record_id, RecordId::new(6));
    assert_eq!(results[0].title, "Data Engineer");
    assert_eq!(results[0].excerpt.as_deref(), Some("Build data p..."));
    assert_eq!(results[1].record_id, RecordId::new(2));
    assert!(results[0].similarity >= results[1].similarity);
}

#[test]
fn index_survives_restart_on_disk() {
    let data = TempDir::new().unwrap();
    let index_dir = TempDir::new().unwrap();

    let writer = engine_with(Arc::new(FsBlobStore::new(index_dir.path()).unwrap()));
    let mut store = embedded_store(&writer, &data);
    writer.rebuild_from_store(&mut store).unwrap();
    let expected = writer.match_text("sales manager", 4).unwrap();

    let reader = engine_with(Arc::new(FsBlobStore::new(index_dir.path()).unwrap()));
    assert!(reader.load().unwrap());
    assert_eq!(reader.match_text("sales manager", 4).unwrap(), expected);
    assert_eq!(expected[0].record_id, RecordId::new(3));

    let metadata = &reader.current().unwrap().metadata;
    assert_eq!(metadata.vector_count, 6);
    assert_eq!(metadata.dimension, 8);
    assert!(!metadata.quantized);
}

#[test]
fn failed_rebuild_keeps_serving_previous_index() {
    let dir = TempDir::new().unwrap();
    let blobs = Arc::new(MemoryBlobStore::new());
    let engine = engine_with(blobs.clone());
    let mut store = embedded_store(&engine, &dir);
    engine.rebuild_from_store(&mut store).unwrap();
    let before = engine.match_text("nurse", 2).unwrap();

    let wrong_dimension = with_ids(random_vectors(10, 4, 1));
    let mixed = vec![
        (RecordId::new(1), vec![0.0; 8]),
        (RecordId::new(2), vec![0.0; 4]),
    ];
    assert!(engine.rebuild(&[]).is_err());
    assert!(engine.rebuild(&mixed).is_err());

    assert_eq!(engine.match_text("nurse", 2).unwrap(), before);
    assert!(engine.match_vector(&wrong_dimension[0].1, 2).is_err());

    let reloaded = engine_with(blobs);
    assert!(reloaded.load().unwrap());
    assert_eq!(reloaded.match_text("nurse", 2).unwrap(), before);
}

/// Blob store whose side-table writes fail while `failing` is set.
#[derive(Default)]
struct FlakyBlobStore {
    inner: MemoryBlobStore,
    failing: AtomicBool,
}

impl BlobStore for FlakyBlobStore {
    fn read(&self, name: &str) -> StorageResult<Option<Vec<u8>>> {
        self.inner.read(name)
    }

    fn write(&self, name: &str, bytes: &[u8]) -> StorageResult<()> {
        if self.failing.load(Ordering::SeqCst) && name.ends_with(".ids") {
            return Err(StorageError::Io(std::io::Error::other("disk full")));
        }
        self.inner.write(name, bytes)
    }

    fn remove(&self, name: &str) -> StorageResult<()> {
        self.inner.remove(name)
    }
}

fn nearest_ids(engine: &MatchEngine, query: &[f32]) -> Vec<RecordId> {
    let published = engine.current().unwrap();
    published
        .index
        .search(query, 3, 8)
        .unwrap()
        .iter()
        .filter_map(|n| published.ids.resolve(n.position))
        .collect()
}

#[test]
fn interrupted_persist_keeps_stored_index_loadable() {
    let blobs = Arc::new(FlakyBlobStore::default());
    let engine = engine_with(blobs.clone());
    let first = with_ids(random_vectors(50, 8, 21));
    engine.rebuild(&first).unwrap();

    let query = first[7].1.clone();
    let before = nearest_ids(&engine, &query);
    assert_eq!(before.len(), 3);
    assert!(engine_with(blobs.clone()).load().unwrap());

    blobs.failing.store(true, Ordering::SeqCst);
    let err = engine.rebuild(&with_ids(random_vectors(60, 8, 22))).unwrap_err();
    assert!(matches!(err, EngineError::Storage(StorageError::Io(_))));
    assert_eq!(nearest_ids(&engine, &query), before);

    // The half-written generation is not visible after a restart
    let restarted = engine_with(blobs.clone());
    assert!(restarted.load().unwrap());
    assert_eq!(restarted.current().unwrap().index.len(), 50);
    assert_eq!(nearest_ids(&restarted, &query), before);
    assert!(blobs.inner.read(&index_blob_name(INDEX, 2)).unwrap().is_none());

    blobs.failing.store(false, Ordering::SeqCst);
    let replaced = engine.rebuild(&with_ids(random_vectors(60, 8, 22))).unwrap();
    assert_eq!(replaced.generation, 2);
    assert!(engine_with(blobs).load().unwrap());
}

#[test]
fn loads_racing_rebuilds_end_on_the_stored_generation() {
    let blobs = Arc::new(MemoryBlobStore::new());
    let engine = engine_with(blobs.clone());
    engine.rebuild(&with_ids(random_vectors(40, 8, 30))).unwrap();

    std::thread::scope(|scope| {
        scope.spawn(|| {
            for seed in 0..15 {
                engine
                    .rebuild(&with_ids(random_vectors(40, 8, 31 + seed)))
                    .unwrap();
            }
        });
        scope.spawn(|| {
            for _ in 0..60 {
                assert!(engine.load().unwrap());
            }
        });
    });

    let stored = current_generation(blobs.as_ref(), INDEX).unwrap();
    assert_eq!(stored, Some(16));
    assert_eq!(engine.current().unwrap().generation, 16);
}

#[test]
fn foreign_side_table_is_reported_as_corruption() {
    let dir = TempDir::new().unwrap();
    let blobs = Arc::new(MemoryBlobStore::new());
    let engine = engine_with(blobs.clone());
    let mut store = embedded_store(&engine, &dir);
    let generation = engine.rebuild_from_store(&mut store).unwrap().generation;

    // Side table of a different build under the same name
    let foreign = jobmatch::vector::IndexBuilder::build(
        QuantizerConfig::default(),
        8,
        &with_ids(random_vectors(40, 8, 2)),
    )
    .unwrap()
    .ids
    .to_bytes()
    .unwrap();
    blobs.write(&ids_blob_name(INDEX, generation), &foreign).unwrap();

    let err = engine_with(blobs).load().unwrap_err();
    assert!(matches!(
        err,
        EngineError::Vector(VectorError::MappingDrift { .. })
    ));
    assert!(err.is_corruption());
}

#[test]
fn damaged_index_blob_is_reported_as_corruption() {
    let dir = TempDir::new().unwrap();
    let blobs = Arc::new(MemoryBlobStore::new());
    let engine = engine_with(blobs.clone());
    let mut store = embedded_store(&engine, &dir);
    let name = index_blob_name(INDEX, engine.rebuild_from_store(&mut store).unwrap().generation);

    let mut bytes = blobs.read(&name).unwrap().unwrap();
    bytes.truncate(bytes.len() / 2);
    blobs.write(&name, &bytes).unwrap();

    let err = engine_with(blobs).load().unwrap_err();
    assert!(err.is_corruption());
}

#[test]
fn readers_never_see_a_partial_index() {
    let dir = TempDir::new().unwrap();
    let engine = Arc::new(engine_with(Arc::new(MemoryBlobStore::new())));
    let mut store = embedded_store(&engine, &dir);
    let corpus = store.read_all().unwrap();
    engine.rebuild(&corpus).unwrap();

    let shifted: Vec<(RecordId, Vec<f32>)> = corpus
        .iter()
        .map(|(id, v)| (*id, v.iter().map(|x| x + 0.25).collect()))
        .collect();

    std::thread::scope(|scope| {
        for _ in 0..4 {
            let engine = Arc::clone(&engine);
            scope.spawn(move || {
                for _ in 0..200 {
                    let results = engine.match_text("rust cloud", 3).unwrap();
                    assert_eq!(results.len(), 3);
                    assert!(
                        results
                            .windows(2)
                            .all(|w| w[0].similarity >= w[1].similarity)
                    );
                }
            });
        }

        let writer = Arc::clone(&engine);
        scope.spawn(move || {
            for round in 0..10 {
                let vectors = if round % 2 == 0 { &shifted } else { &corpus };
                writer.rebuild(vectors).unwrap();
            }
        });
    });

    assert_eq!(engine.current().unwrap().index.len(), 6);
}
