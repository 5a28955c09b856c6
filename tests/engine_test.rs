use emberkv::{Engine, Error, IndexType, IteratorOptions, Options};
use tempfile::tempdir;

fn test_options(dir: &std::path::Path, index_type: IndexType) -> Options {
    Options {
        dir_path: dir.to_path_buf(),
        file_size: 64 * 1024 * 1024,
        index_type,
        ..Options::default()
    }
}

fn test_key(i: usize) -> Vec<u8> {
    format!("emberkv-key-{i:06}").into_bytes()
}

fn test_value(i: usize) -> Vec<u8> {
    format!("emberkv-value-{i:06}-{}", "v".repeat(96)).into_bytes()
}

#[test]
fn test_put_get_across_reopen() {
    for index_type in [IndexType::BTree, IndexType::Art, IndexType::BPlusTree] {
        let dir = tempdir().unwrap();
        {
            let engine = Engine::open(test_options(dir.path(), index_type)).unwrap();
            engine.put(b"name", b"lily").unwrap();
            assert_eq!(engine.get(b"name").unwrap(), b"lily");
            engine.close().unwrap();
        }
        let engine = Engine::open(test_options(dir.path(), index_type)).unwrap();
        assert_eq!(engine.get(b"name").unwrap(), b"lily");
        engine.close().unwrap();
    }
}

#[test]
fn test_last_write_wins_and_delete() {
    let dir = tempdir().unwrap();
    let engine = Engine::open(test_options(dir.path(), IndexType::BTree)).unwrap();

    engine.put(b"x", b"1").unwrap();
    engine.put(b"x", b"2").unwrap();
    assert_eq!(engine.get(b"x").unwrap(), b"2");

    let old = engine.delete(b"x").unwrap();
    assert_eq!(old.fid, 0);
    assert!(matches!(engine.get(b"x"), Err(Error::KeyNotFound)));

    // Deleting a missing key reports the miss.
    assert!(matches!(engine.delete(b"x"), Err(Error::KeyNotFound)));
    engine.close().unwrap();
}

#[test]
fn test_empty_key_and_empty_value() {
    let dir = tempdir().unwrap();
    let engine = Engine::open(test_options(dir.path(), IndexType::BTree)).unwrap();

    assert!(matches!(engine.put(b"", b"v"), Err(Error::KeyIsEmpty)));
    assert!(matches!(engine.get(b""), Err(Error::KeyIsEmpty)));
    assert!(matches!(engine.delete(b""), Err(Error::KeyIsEmpty)));

    // Empty values are legal.
    engine.put(b"k", b"").unwrap();
    assert_eq!(engine.get(b"k").unwrap(), Vec::<u8>::new());
    engine.close().unwrap();
}

#[test]
fn test_delete_survives_reopen() {
    let dir = tempdir().unwrap();
    {
        let engine = Engine::open(test_options(dir.path(), IndexType::BTree)).unwrap();
        engine.put(b"gone", b"soon").unwrap();
        engine.delete(b"gone").unwrap();
        engine.close().unwrap();
    }
    let engine = Engine::open(test_options(dir.path(), IndexType::BTree)).unwrap();
    assert!(matches!(engine.get(b"gone"), Err(Error::KeyNotFound)));
    engine.close().unwrap();
}

#[test]
fn test_file_rotation() {
    let dir = tempdir().unwrap();
    let mut options = test_options(dir.path(), IndexType::BTree);
    options.file_size = 64 * 1024;
    let engine = Engine::open(options.clone()).unwrap();

    // ~150 bytes per record; a few thousand cross the 64 KiB cap repeatedly.
    let n = 2000;
    for i in 0..n {
        engine.put(&test_key(i), &test_value(i)).unwrap();
    }
    let stat = engine.stat().unwrap();
    assert!(stat.data_file_num >= 3, "expected rotation, got {stat:?}");
    assert_eq!(stat.key_num, n);

    // Every key still resolves, wherever its record landed.
    for i in 0..n {
        assert_eq!(engine.get(&test_key(i)).unwrap(), test_value(i));
    }
    engine.close().unwrap();
    drop(engine);

    // Rotated state replays cleanly.
    let engine = Engine::open(options).unwrap();
    assert_eq!(engine.get(&test_key(0)).unwrap(), test_value(0));
    assert_eq!(engine.get(&test_key(n - 1)).unwrap(), test_value(n - 1));
    engine.close().unwrap();
}

#[test]
fn test_sync_then_reopen_without_close() {
    let dir = tempdir().unwrap();
    {
        let engine = Engine::open(test_options(dir.path(), IndexType::BTree)).unwrap();
        engine.put(b"durable", b"yes").unwrap();
        engine.sync().unwrap();
        // Simulated crash: the engine is dropped without close().
        drop(engine);
    }
    let engine = Engine::open(test_options(dir.path(), IndexType::BTree)).unwrap();
    assert_eq!(engine.get(b"durable").unwrap(), b"yes");
    engine.close().unwrap();
}

#[test]
fn test_second_open_is_refused() {
    let dir = tempdir().unwrap();
    let engine = Engine::open(test_options(dir.path(), IndexType::BTree)).unwrap();
    assert!(matches!(
        Engine::open(test_options(dir.path(), IndexType::BTree)),
        Err(Error::DatabaseIsUsing)
    ));

    engine.close().unwrap();
    drop(engine);
    let engine = Engine::open(test_options(dir.path(), IndexType::BTree)).unwrap();
    engine.close().unwrap();
}

#[test]
fn test_corrupt_older_file_fails_open() {
    let dir = tempdir().unwrap();
    let mut options = test_options(dir.path(), IndexType::BTree);
    options.file_size = 4 * 1024;
    {
        let engine = Engine::open(options.clone()).unwrap();
        for i in 0..200 {
            engine.put(&test_key(i), &test_value(i)).unwrap();
        }
        let stat = engine.stat().unwrap();
        assert!(stat.data_file_num >= 2);
        engine.close().unwrap();
    }

    // Flip a byte in the middle of the first (retired) data file.
    let victim = dir.path().join("000000000.data");
    let mut bytes = std::fs::read(&victim).unwrap();
    let mid = bytes.len() / 2;
    bytes[mid] ^= 0xFF;
    std::fs::write(&victim, &bytes).unwrap();

    assert!(matches!(
        Engine::open(options),
        Err(Error::DataDirCorrupted)
    ));
}

#[test]
fn test_torn_tail_is_discarded() {
    let dir = tempdir().unwrap();
    {
        let engine = Engine::open(test_options(dir.path(), IndexType::BTree)).unwrap();
        engine.put(b"kept", b"value").unwrap();
        engine.put(b"torn", b"value").unwrap();
        engine.close().unwrap();
    }

    // Chop the last record short, as a crash mid-append would.
    let active = dir.path().join("000000000.data");
    let bytes = std::fs::read(&active).unwrap();
    std::fs::write(&active, &bytes[..bytes.len() - 4]).unwrap();

    let engine = Engine::open(test_options(dir.path(), IndexType::BTree)).unwrap();
    assert_eq!(engine.get(b"kept").unwrap(), b"value");
    assert!(matches!(engine.get(b"torn"), Err(Error::KeyNotFound)));

    // The rewound offset accepts fresh appends.
    engine.put(b"torn", b"rewritten").unwrap();
    assert_eq!(engine.get(b"torn").unwrap(), b"rewritten");
    engine.close().unwrap();
}

#[test]
fn test_mmap_at_startup_replay() {
    let dir = tempdir().unwrap();
    {
        let engine = Engine::open(test_options(dir.path(), IndexType::BTree)).unwrap();
        for i in 0..100 {
            engine.put(&test_key(i), &test_value(i)).unwrap();
        }
        engine.close().unwrap();
    }
    let mut options = test_options(dir.path(), IndexType::BTree);
    options.mmap_at_startup = true;
    let engine = Engine::open(options).unwrap();
    for i in 0..100 {
        assert_eq!(engine.get(&test_key(i)).unwrap(), test_value(i));
    }
    // Still writable after the mmap replay.
    engine.put(b"after-replay", b"ok").unwrap();
    assert_eq!(engine.get(b"after-replay").unwrap(), b"ok");
    engine.close().unwrap();
}

#[test]
fn test_bptree_skips_replay() {
    let dir = tempdir().unwrap();
    {
        let engine = Engine::open(test_options(dir.path(), IndexType::BPlusTree)).unwrap();
        for i in 0..50 {
            engine.put(&test_key(i), &test_value(i)).unwrap();
        }
        engine.delete(&test_key(7)).unwrap();
        engine.close().unwrap();
    }
    let engine = Engine::open(test_options(dir.path(), IndexType::BPlusTree)).unwrap();
    assert_eq!(engine.get(&test_key(3)).unwrap(), test_value(3));
    assert!(matches!(engine.get(&test_key(7)), Err(Error::KeyNotFound)));
    assert_eq!(engine.stat().unwrap().key_num, 49);
    engine.close().unwrap();
}

#[test]
fn test_list_keys_and_fold() {
    let dir = tempdir().unwrap();
    let engine = Engine::open(test_options(dir.path(), IndexType::BTree)).unwrap();
    engine.put(b"apple", b"1").unwrap();
    engine.put(b"apricot", b"2").unwrap();
    engine.put(b"banana", b"3").unwrap();

    let keys = engine.list_keys(IteratorOptions::default());
    assert_eq!(keys, vec![b"apple".to_vec(), b"apricot".to_vec(), b"banana".to_vec()]);

    let keys = engine.list_keys(IteratorOptions { prefix: b"ap".to_vec(), reverse: false });
    assert_eq!(keys, vec![b"apple".to_vec(), b"apricot".to_vec()]);

    let mut seen = Vec::new();
    engine
        .fold(IteratorOptions::default(), |key, value| {
            seen.push((key.to_vec(), value));
            // Stop before the last pair.
            seen.len() < 2
        })
        .unwrap();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0], (b"apple".to_vec(), b"1".to_vec()));
    engine.close().unwrap();
}

#[test]
fn test_engine_iterator() {
    let dir = tempdir().unwrap();
    let engine = Engine::open(test_options(dir.path(), IndexType::Art)).unwrap();
    engine.put(b"ccde", b"3").unwrap();
    engine.put(b"adse", b"1").unwrap();
    engine.put(b"bbed", b"2").unwrap();

    let mut iter = engine.iter(IteratorOptions::default());
    assert!(iter.valid());
    assert_eq!(iter.key(), b"adse");
    assert_eq!(iter.value().unwrap(), b"1");

    iter.seek(b"b");
    assert_eq!(iter.key(), b"bbed");
    iter.next();
    assert_eq!(iter.key(), b"ccde");
    iter.next();
    assert!(!iter.valid());

    iter.rewind();
    assert_eq!(iter.key(), b"adse");

    let mut iter = engine.iter(IteratorOptions { prefix: Vec::new(), reverse: true });
    assert_eq!(iter.key(), b"ccde");
    iter.next();
    assert_eq!(iter.key(), b"bbed");
    engine.close().unwrap();
}

#[test]
fn test_stat_reclaimable_grows() {
    let dir = tempdir().unwrap();
    let engine = Engine::open(test_options(dir.path(), IndexType::BTree)).unwrap();
    engine.put(b"a", b"1").unwrap();
    assert_eq!(engine.stat().unwrap().reclaimable_size, 0);

    engine.put(b"a", b"2").unwrap();
    let after_overwrite = engine.stat().unwrap().reclaimable_size;
    assert!(after_overwrite > 0);

    engine.delete(b"a").unwrap();
    let after_delete = engine.stat().unwrap().reclaimable_size;
    assert!(after_delete > after_overwrite);

    let stat = engine.stat().unwrap();
    assert_eq!(stat.key_num, 0);
    assert!(stat.disk_size > 0);
    engine.close().unwrap();
}

#[test]
fn test_invalid_options() {
    assert!(matches!(
        Engine::open(Options { dir_path: "".into(), ..Options::default() }),
        Err(Error::DirPathInvalid)
    ));
    let dir = tempdir().unwrap();
    assert!(matches!(
        Engine::open(Options {
            dir_path: dir.path().to_path_buf(),
            file_size: 0,
            ..Options::default()
        }),
        Err(Error::FileSizeInvalid)
    ));
    assert!(matches!(
        Engine::open(Options {
            dir_path: dir.path().to_path_buf(),
            merge_ratio: 1.5,
            ..Options::default()
        }),
        Err(Error::InvalidMergeRatio)
    ));
}
