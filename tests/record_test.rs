use emberkv::data_file::DataFile;
use emberkv::fio::IoType;
use emberkv::record::{
    decode_log_record_header, encode_log_record, LogRecord, LogRecordType,
};
use emberkv::Error;
use tempfile::tempdir;

fn sample_record(key: &[u8], value: &[u8], rec_type: LogRecordType) -> LogRecord {
    LogRecord {
        key: key.to_vec(),
        value: value.to_vec(),
        rec_type,
    }
}

#[test]
fn test_encode_decode_header() {
    let record = sample_record(b"name", b"lily", LogRecordType::Normal);
    let (enc, size) = encode_log_record(&record);
    assert_eq!(size as usize, enc.len());
    // crc(4) + type(1) + varint(4)=1 + varint(4)=1 + 4 + 4
    assert_eq!(enc.len(), 4 + 1 + 1 + 1 + 4 + 4);

    let (header, header_len) = decode_log_record_header(&enc).unwrap();
    assert_eq!(header_len, 7);
    assert_eq!(header.rec_type, LogRecordType::Normal as u8);
    assert_eq!(header.key_size, 4);
    assert_eq!(header.value_size, 4);

    // Truncated headers do not decode.
    assert!(decode_log_record_header(&enc[..4]).is_none());
}

#[test]
fn test_empty_value_and_tombstone() {
    let record = sample_record(b"k", b"", LogRecordType::Normal);
    let (enc, _) = encode_log_record(&record);
    let (header, _) = decode_log_record_header(&enc).unwrap();
    assert_eq!(header.value_size, 0);

    let tomb = sample_record(b"k", b"", LogRecordType::Deleted);
    let (enc, _) = encode_log_record(&tomb);
    let (header, _) = decode_log_record_header(&enc).unwrap();
    assert_eq!(header.rec_type, LogRecordType::Deleted as u8);
}

#[test]
fn test_data_file_roundtrip() {
    let dir = tempdir().unwrap();
    let mut df = DataFile::open(dir.path(), 0, IoType::Standard).unwrap();
    assert_eq!(df.fid(), 0);
    assert_eq!(df.write_off(), 0);

    let rec_a = sample_record(b"key-a", b"value-a", LogRecordType::Normal);
    let rec_b = sample_record(b"key-b", b"value-b", LogRecordType::Normal);
    let (enc_a, size_a) = encode_log_record(&rec_a);
    let (enc_b, size_b) = encode_log_record(&rec_b);

    df.append(&enc_a).unwrap();
    df.append(&enc_b).unwrap();
    assert_eq!(df.write_off(), size_a + size_b);

    let (got_a, got_size_a) = df.read_log_record(0).unwrap();
    assert_eq!(got_a, rec_a);
    assert_eq!(got_size_a, size_a);

    let (got_b, _) = df.read_log_record(size_a).unwrap();
    assert_eq!(got_b, rec_b);

    // Reading at the end of the written log is EOF, not corruption.
    assert!(matches!(
        df.read_log_record(size_a + size_b),
        Err(Error::Eof)
    ));
}

#[test]
fn test_single_byte_flip_is_detected() {
    let dir = tempdir().unwrap();
    let record = sample_record(b"stable-key", b"stable-value", LogRecordType::Normal);
    let (enc, _) = encode_log_record(&record);

    // Flip one byte inside the value region and lay the bytes down directly.
    let mut corrupted = enc.clone();
    let flip_at = corrupted.len() - 3;
    corrupted[flip_at] ^= 0xFF;
    std::fs::write(dir.path().join("000000007.data"), &corrupted).unwrap();

    let df = DataFile::open(dir.path(), 7, IoType::Standard).unwrap();
    assert!(matches!(
        df.read_log_record(0),
        Err(Error::InvalidRecordCrc)
    ));
}

#[test]
fn test_mmap_reads_match_standard_reads() {
    let dir = tempdir().unwrap();
    let record = sample_record(b"mm-key", b"mm-value", LogRecordType::Normal);
    let (enc, size) = encode_log_record(&record);
    {
        let mut df = DataFile::open(dir.path(), 3, IoType::Standard).unwrap();
        df.append(&enc).unwrap();
        df.sync().unwrap();
    }

    let df = DataFile::open(dir.path(), 3, IoType::MemoryMap).unwrap();
    assert_eq!(df.write_off(), size);
    let (got, _) = df.read_log_record(0).unwrap();
    assert_eq!(got, record);
}
