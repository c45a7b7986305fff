//! Stream-merge engine.
//!
//! # Responsibilities
//! - Fold a record stream into one JSON object: scalars from the first
//!   record, every sequence field concatenated across records
//! - Keep memory bounded by the number of distinct sequence fields: the
//!   primary sequence streams straight to the output, the others go to spills
//! - Fall back to newline-delimited records when the first record has no
//!   sequence field
//!
//! # Design Decisions
//! - Field kinds come from record descriptors; a field keeps its kind for the whole session
//! - Sequence values are serialized whole and bracket-trimmed, so element
//!   encoding stays with serde
//! - Commas are tracked per output stream; empty sequences add nothing
//! - Spill failures drop only the affected field; the primary sequence and
//!   the other spills still complete. A read error after part of a spill was
//!   copied ends the merge, since the document cannot be closed validly

use std::collections::HashMap;
use std::io::Read;

use serde_json::Value;
use thiserror::Error;

use crate::merge::output::{ChunkSink, ResponseWriter, SinkClosed};
use crate::merge::spill::{SpillError, SpillResource, SpillStore};
use crate::merge::trim::trim_brackets;
use crate::observability::metrics;
use crate::rpc::receiver::{Receiver, RecvError};
use crate::rpc::record::{FieldKind, Record};
use crate::rpc::status::Status;

const COPY_CHUNK: usize = 16 * 1024;

#[derive(Debug, Error)]
pub enum MergeError {
    #[error("new scalar field {0:?} after the first record")]
    NewScalar(String),

    #[error("field {field:?} is a {now} but was a {was}")]
    KindConflict {
        field: String,
        was: FieldKind,
        now: FieldKind,
    },

    #[error("receive: {0}")]
    Recv(#[source] Status),

    #[error("encode {record}: {source}")]
    Encode {
        record: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Spill(#[from] SpillError),

    #[error(transparent)]
    Closed(#[from] SinkClosed),
}

impl MergeError {
    /// Metric label for the step that failed.
    pub fn stage(&self) -> &'static str {
        match self {
            MergeError::NewScalar(_) | MergeError::KindConflict { .. } => "merge",
            MergeError::Recv(_) => "recv",
            MergeError::Encode { .. } => "encode",
            MergeError::Spill(_) => "spill",
            MergeError::Closed(_) => "client",
        }
    }
}

/// Outcome of a completed merge or record stream.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MergeSummary {
    pub records: u64,
    pub spilled_fields: usize,
    pub spill_bytes: u64,
    /// Spills that failed to open, write or read back; their fields are missing from the output.
    pub spill_failures: usize,
}

/// One visible field of a record, encoded.
struct EncodedField {
    name: &'static str,
    wire: &'static str,
    kind: FieldKind,
    json: Vec<u8>,
}

fn classify(record: &dyn Record) -> Result<Vec<EncodedField>, MergeError> {
    let desc = record.descriptor();
    let encode_err = |source: serde_json::Error| MergeError::Encode {
        record: desc.name,
        source,
    };
    let value = record.to_value().map_err(encode_err)?;
    let Value::Object(map) = value else {
        return Err(encode_err(serde::ser::Error::custom("record is not a JSON object")));
    };
    let mut fields = Vec::with_capacity(desc.fields.len());
    for (wire, field) in desc.visible_fields() {
        let json = match map.get(wire) {
            Some(v) => serde_json::to_vec(v).map_err(encode_err)?,
            None if field.kind == FieldKind::Sequence => b"[]".to_vec(),
            None => b"null".to_vec(),
        };
        fields.push(EncodedField {
            name: field.name,
            wire,
            kind: field.kind,
            json,
        });
    }
    Ok(fields)
}

struct Spill {
    wire: &'static str,
    /// `None` once the resource has failed.
    resource: Option<SpillResource>,
    empty: bool,
}

/// Per-request merge state.
struct MergeSession<'a> {
    store: &'a SpillStore,
    kinds: HashMap<&'static str, FieldKind>,
    primary: &'static str,
    primary_empty: bool,
    spills: Vec<Spill>,
    spill_index: HashMap<&'static str, usize>,
    spill_failures: usize,
}

impl<'a> MergeSession<'a> {
    /// Open the spill for `field`. A failed open is logged and the field's later values are dropped.
    fn open_spill(&mut self, field: &EncodedField) -> usize {
        let opened = self.store.open(field.wire).and_then(|mut resource| {
            resource.append(&wire_key(field.wire))?;
            resource.append(b":[")?;
            Ok(resource)
        });
        let resource = match opened {
            Ok(resource) => {
                tracing::debug!(field = field.name, "Opened spill for sequence field");
                Some(resource)
            }
            Err(e) => {
                tracing::warn!(field = field.name, error = %e, "Spill unavailable, dropping field");
                self.spill_failures += 1;
                None
            }
        };
        let idx = self.spills.len();
        self.spills.push(Spill {
            wire: field.wire,
            resource,
            empty: true,
        });
        self.spill_index.insert(field.name, idx);
        self.kinds.insert(field.name, FieldKind::Sequence);
        idx
    }

    fn append_spill(&mut self, idx: usize, encoded: &[u8]) {
        let elements = trim_brackets(encoded);
        if elements.is_empty() {
            return;
        }
        let spill = &mut self.spills[idx];
        let Some(resource) = spill.resource.as_mut() else {
            return;
        };
        let written = if spill.empty {
            resource.append(elements)
        } else {
            resource.append(b",").and_then(|()| resource.append(elements))
        };
        match written {
            Ok(()) => spill.empty = false,
            Err(e) => {
                tracing::warn!(field = spill.wire, error = %e, "Spill write failed, dropping field");
                spill.resource = None;
                self.spill_failures += 1;
            }
        }
    }

    async fn append_primary<S: ChunkSink>(
        &mut self,
        out: &mut ResponseWriter<S>,
        encoded: &[u8],
    ) -> Result<(), MergeError> {
        let elements = trim_brackets(encoded);
        if elements.is_empty() {
            return Ok(());
        }
        if !self.primary_empty {
            out.write(b",").await?;
        }
        out.write(elements).await?;
        self.primary_empty = false;
        Ok(())
    }

    /// Check a later record against the known field kinds, opening spills for new sequences.
    fn admit(&mut self, fields: &[EncodedField]) -> Result<(), MergeError> {
        for field in fields {
            match (self.kinds.get(field.name), field.kind) {
                (Some(&was), now) if was != now => {
                    return Err(MergeError::KindConflict {
                        field: field.name.to_string(),
                        was,
                        now,
                    })
                }
                (Some(_), _) => {}
                (None, FieldKind::Scalar) => {
                    return Err(MergeError::NewScalar(field.name.to_string()))
                }
                (None, FieldKind::Sequence) => {
                    self.open_spill(field);
                }
            }
        }
        Ok(())
    }
}

fn wire_key(wire: &str) -> Vec<u8> {
    // serializing a &str cannot fail
    serde_json::to_vec(wire).unwrap_or_else(|_| format!("\"{}\"", wire).into_bytes())
}

/// Merge `first` and the rest of `recv` into one JSON document on `out`.
///
/// Output is flushed on success. On error the document is left unterminated.
pub async fn merge_stream<S: ChunkSink>(
    first: Box<dyn Record>,
    recv: &mut dyn Receiver,
    out: &mut ResponseWriter<S>,
    store: &SpillStore,
) -> Result<MergeSummary, MergeError> {
    let fields = classify(first.as_ref())?;
    let Some(primary) = fields.iter().find(|f| f.kind == FieldKind::Sequence) else {
        tracing::debug!(record = first.descriptor().name, "No sequence field, streaming records as-is");
        return write_records(first, recv, out).await;
    };

    let primary_name = primary.name;
    let mut session = MergeSession {
        store,
        kinds: fields.iter().map(|f| (f.name, f.kind)).collect(),
        primary: primary_name,
        primary_empty: true,
        spills: Vec::new(),
        spill_index: HashMap::new(),
        spill_failures: 0,
    };

    out.write(b"{").await?;
    for field in fields.iter().filter(|f| f.kind == FieldKind::Scalar) {
        out.write(&wire_key(field.wire)).await?;
        out.write(b":").await?;
        out.write(&field.json).await?;
        out.write(b",").await?;
    }
    out.write(&wire_key(primary.wire)).await?;
    out.write(b":[").await?;
    session.append_primary(out, &primary.json).await?;
    for field in fields.iter().filter(|f| f.kind == FieldKind::Sequence && f.name != primary_name) {
        let idx = session.open_spill(field);
        session.append_spill(idx, &field.json);
    }

    let mut records = 1u64;
    loop {
        let record = match recv.recv().await {
            Ok(record) => record,
            Err(RecvError::Exhausted) => break,
            Err(RecvError::Status(status)) => return Err(MergeError::Recv(status)),
        };
        records += 1;
        let fields = classify(record.as_ref())?;
        session.admit(&fields)?;
        if !fields.iter().any(|f| f.kind == FieldKind::Sequence) {
            tracing::debug!(records, "Record without sequence fields ends the merge");
            break;
        }
        for field in fields.iter().filter(|f| f.kind == FieldKind::Sequence) {
            if field.name == session.primary {
                session.append_primary(out, &field.json).await?;
            } else if let Some(&idx) = session.spill_index.get(field.name) {
                session.append_spill(idx, &field.json);
            }
        }
    }
    out.write(b"]").await?;

    let mut summary = MergeSummary {
        records,
        spilled_fields: session.spills.len(),
        spill_failures: session.spill_failures,
        ..MergeSummary::default()
    };
    let mut chunk = vec![0u8; COPY_CHUNK];
    for spill in session.spills {
        let Some(resource) = spill.resource else {
            continue;
        };
        summary.spill_bytes += resource.bytes_written();
        let mut reader = match resource.finish() {
            Ok(reader) => reader,
            Err(e) => {
                tracing::warn!(field = spill.wire, error = %e, "Dropping spilled field");
                summary.spill_failures += 1;
                continue;
            }
        };
        // The separator is held back until the first chunk arrives, so a
        // spill that fails straight away leaves no trace in the output.
        let mut copied = false;
        loop {
            let n = match reader.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) if !copied => {
                    tracing::warn!(field = spill.wire, error = %e, "Spill read-back failed, dropping field");
                    summary.spill_failures += 1;
                    break;
                }
                Err(source) => {
                    return Err(MergeError::Spill(SpillError::Read {
                        field: spill.wire.to_string(),
                        source,
                    }))
                }
            };
            if !copied {
                out.write(b",").await?;
                copied = true;
            }
            out.write(&chunk[..n]).await?;
        }
        if copied {
            out.write(b"]").await?;
        }
    }
    out.write(b"}\n").await?;
    out.flush().await?;

    metrics::record_merge(summary.records, summary.spill_bytes, summary.spill_failures);
    Ok(summary)
}

/// Encode `first` and every following record as newline-delimited JSON.
///
/// A receive failure ends the stream with `MergeError::Recv` after the
/// records written so far have been flushed.
pub async fn write_records<S: ChunkSink>(
    first: Box<dyn Record>,
    recv: &mut dyn Receiver,
    out: &mut ResponseWriter<S>,
) -> Result<MergeSummary, MergeError> {
    let mut buf = Vec::with_capacity(256);
    let mut record = first;
    let mut summary = MergeSummary::default();
    loop {
        buf.clear();
        record
            .encode_json(&mut buf)
            .map_err(|source| MergeError::Encode {
                record: record.descriptor().name,
                source,
            })?;
        buf.push(b'\n');
        out.write(&buf).await?;
        summary.records += 1;

        record = match recv.recv().await {
            Ok(next) => next,
            Err(RecvError::Exhausted) => break,
            Err(RecvError::Status(status)) => {
                out.flush().await?;
                return Err(MergeError::Recv(status));
            }
        };
    }
    out.flush().await?;
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SpillConfig;
    use crate::merge::spill::Fault;
    use crate::rpc::receiver::VecReceiver;
    use crate::rpc::record::{FieldDescriptor, FieldType, RecordDescriptor, Schema};
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Default, Serialize, Deserialize)]
    struct Flat {
        #[serde(rename = "A")]
        a: i64,
        #[serde(rename = "B")]
        b: String,
    }

    static FLAT_FIELDS: [FieldDescriptor; 2] = [
        FieldDescriptor::scalar("A", FieldType::Int),
        FieldDescriptor::scalar("B", FieldType::String),
    ];
    static FLAT: RecordDescriptor = RecordDescriptor {
        name: "Flat",
        fields: &FLAT_FIELDS,
    };
    impl Schema for Flat {
        fn descriptor() -> &'static RecordDescriptor {
            &FLAT
        }
    }

    #[derive(Debug, Default, Serialize, Deserialize)]
    struct List {
        #[serde(rename = "A")]
        a: Vec<String>,
    }

    static LIST_FIELDS: [FieldDescriptor; 1] = [FieldDescriptor::sequence("A", FieldType::String)];
    static LIST: RecordDescriptor = RecordDescriptor {
        name: "List",
        fields: &LIST_FIELDS,
    };
    impl Schema for List {
        fn descriptor() -> &'static RecordDescriptor {
            &LIST
        }
    }

    #[derive(Debug, Default, Serialize, Deserialize)]
    struct Page {
        #[serde(rename = "Total")]
        total: u32,
        #[serde(rename = "Rows")]
        rows: Vec<u32>,
        #[serde(rename = "Notes")]
        notes: Vec<String>,
        #[serde(skip)]
        cursor: String,
    }

    static PAGE_FIELDS: [FieldDescriptor; 4] = [
        FieldDescriptor::scalar("total", FieldType::UInt).wire("Total"),
        FieldDescriptor::sequence("rows", FieldType::UInt).wire("Rows"),
        FieldDescriptor::sequence("notes", FieldType::String).wire("Notes"),
        FieldDescriptor::scalar("cursor", FieldType::String).skip(),
    ];
    static PAGE: RecordDescriptor = RecordDescriptor {
        name: "Page",
        fields: &PAGE_FIELDS,
    };
    impl Schema for Page {
        fn descriptor() -> &'static RecordDescriptor {
            &PAGE
        }
    }

    /// Same field `A`, but a scalar.
    #[derive(Debug, Default, Serialize, Deserialize)]
    struct ScalarA {
        #[serde(rename = "A")]
        a: String,
    }

    static SCALAR_A_FIELDS: [FieldDescriptor; 1] = [FieldDescriptor::scalar("A", FieldType::String)];
    static SCALAR_A: RecordDescriptor = RecordDescriptor {
        name: "ScalarA",
        fields: &SCALAR_A_FIELDS,
    };
    impl Schema for ScalarA {
        fn descriptor() -> &'static RecordDescriptor {
            &SCALAR_A
        }
    }

    /// `A` plus a sequence that only later records carry.
    #[derive(Debug, Default, Serialize, Deserialize)]
    struct ListExtra {
        #[serde(rename = "A")]
        a: Vec<String>,
        #[serde(rename = "Extra")]
        extra: Vec<i32>,
    }

    static LIST_EXTRA_FIELDS: [FieldDescriptor; 2] = [
        FieldDescriptor::sequence("A", FieldType::String),
        FieldDescriptor::sequence("Extra", FieldType::Int),
    ];
    static LIST_EXTRA: RecordDescriptor = RecordDescriptor {
        name: "ListExtra",
        fields: &LIST_EXTRA_FIELDS,
    };
    impl Schema for ListExtra {
        fn descriptor() -> &'static RecordDescriptor {
            &LIST_EXTRA
        }
    }

    /// Primary `A` and two spilled sequences.
    #[derive(Debug, Default, Serialize, Deserialize)]
    struct Wide {
        #[serde(rename = "A")]
        a: Vec<String>,
        #[serde(rename = "B")]
        b: Vec<i32>,
        #[serde(rename = "C")]
        c: Vec<i32>,
    }

    static WIDE_FIELDS: [FieldDescriptor; 3] = [
        FieldDescriptor::sequence("A", FieldType::String),
        FieldDescriptor::sequence("B", FieldType::Int),
        FieldDescriptor::sequence("C", FieldType::Int),
    ];
    static WIDE: RecordDescriptor = RecordDescriptor {
        name: "Wide",
        fields: &WIDE_FIELDS,
    };
    impl Schema for Wide {
        fn descriptor() -> &'static RecordDescriptor {
            &WIDE
        }
    }

    fn wide_records() -> Vec<Box<dyn Record>> {
        vec![
            Box::new(Wide {
                a: vec!["x".into()],
                b: vec![1],
                c: vec![3],
            }),
            Box::new(Wide {
                a: vec!["y".into()],
                b: vec![2],
                c: vec![4],
            }),
        ]
    }

    fn list(items: &[&str]) -> Box<dyn Record> {
        Box::new(List {
            a: items.iter().map(|s| s.to_string()).collect(),
        })
    }

    async fn run(records: Vec<Box<dyn Record>>, store: &SpillStore) -> (Result<MergeSummary, MergeError>, String) {
        let mut records = records.into_iter();
        let first = records.next().unwrap();
        let mut recv = VecReceiver::new(records.collect());
        let mut out = ResponseWriter::new(Vec::new(), 8);
        let result = merge_stream(first, &mut recv, &mut out, store).await;
        let _ = out.flush().await;
        (result, String::from_utf8(out.into_inner()).unwrap())
    }

    #[tokio::test]
    async fn test_scalar_only_passes_through() {
        let (result, text) = run(
            vec![Box::new(Flat {
                a: 1,
                b: "x".into(),
            })],
            &SpillStore::default(),
        )
        .await;
        assert_eq!(result.unwrap().records, 1);
        assert_eq!(text, "{\"A\":1,\"B\":\"x\"}\n");
    }

    #[tokio::test]
    async fn test_single_sequence_concatenates() {
        let (result, text) = run(vec![list(&["1"]), list(&["2"]), list(&["3"])], &SpillStore::default()).await;
        assert_eq!(result.unwrap().records, 3);
        assert_eq!(text, "{\"A\":[\"1\",\"2\",\"3\"]}\n");
    }

    #[tokio::test]
    async fn test_empty_sequences_stay_valid() {
        let (_, text) = run(vec![list(&[]), list(&["1"]), list(&[]), list(&["2"])], &SpillStore::default()).await;
        assert_eq!(text, "{\"A\":[\"1\",\"2\"]}\n");
        let (_, text) = run(vec![list(&[]), list(&[])], &SpillStore::default()).await;
        assert_eq!(text, "{\"A\":[]}\n");
    }

    #[tokio::test]
    async fn test_multi_field_merge_with_spills_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = SpillStore::new(&SpillConfig {
            directory: Some(dir.path().to_path_buf()),
            memory_threshold_bytes: 0,
            compress: true,
        });
        let mut records: Vec<Box<dyn Record>> = Vec::new();
        for i in 0..50u32 {
            records.push(Box::new(Page {
                total: 1000 + i,
                rows: vec![i * 2, i * 2 + 1],
                notes: if i % 10 == 0 { vec![format!("n{}", i)] } else { vec![] },
                cursor: "hidden".into(),
            }));
        }
        let (result, text) = run(records, &store).await;
        let summary = result.unwrap();
        assert_eq!(summary.records, 50);
        assert_eq!(summary.spilled_fields, 1);
        assert_eq!(summary.spill_failures, 0);

        assert!(text.ends_with("}\n"));
        let doc: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(doc["Total"], 1000);
        assert_eq!(doc["Rows"].as_array().unwrap().len(), 100);
        assert_eq!(doc["Rows"][99], 99);
        assert_eq!(doc["Notes"], serde_json::json!(["n0", "n10", "n20", "n30", "n40"]));
        assert!(doc.get("cursor").is_none());
        let keys: Vec<_> = doc.as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys, vec!["Total", "Rows", "Notes"]);
    }

    #[tokio::test]
    async fn test_unavailable_spill_drops_only_that_field() {
        let dir = tempfile::tempdir().unwrap();
        let store = SpillStore::new(&SpillConfig {
            directory: Some(dir.path().join("missing")),
            memory_threshold_bytes: 0,
            compress: true,
        });
        let records: Vec<Box<dyn Record>> = (0..3u32)
            .map(|i| {
                Box::new(Page {
                    total: 7,
                    rows: vec![i],
                    notes: vec![format!("n{}", i)],
                    cursor: String::new(),
                }) as Box<dyn Record>
            })
            .collect();
        let (result, text) = run(records, &store).await;
        let summary = result.unwrap();
        assert_eq!(summary.records, 3);
        assert_eq!(summary.spill_failures, 1);
        assert_eq!(text, "{\"Total\":7,\"Rows\":[0,1,2]}\n");
    }

    #[tokio::test]
    async fn test_spill_write_failure_keeps_streaming() {
        let store = SpillStore::default().with_fault("Extra", Fault::Append);
        let records: Vec<Box<dyn Record>> = vec![
            list(&["1"]),
            Box::new(ListExtra {
                a: vec!["2".into()],
                extra: vec![7],
            }),
            Box::new(ListExtra {
                a: vec!["3".into()],
                extra: vec![8],
            }),
        ];
        let (result, text) = run(records, &store).await;
        assert_eq!(result.unwrap().spill_failures, 1);
        assert_eq!(text, "{\"A\":[\"1\",\"2\",\"3\"]}\n");
    }

    #[tokio::test]
    async fn test_failed_spill_drain_keeps_other_spills() {
        let cases = [
            (Fault::Finish, "B", "{\"A\":[\"x\",\"y\"],\"C\":[3,4]}\n"),
            (Fault::Read, "B", "{\"A\":[\"x\",\"y\"],\"C\":[3,4]}\n"),
            (Fault::Read, "C", "{\"A\":[\"x\",\"y\"],\"B\":[1,2]}\n"),
        ];
        for (fault, field, want) in cases {
            let store = SpillStore::default().with_fault(field, fault);
            let (result, text) = run(wide_records(), &store).await;
            let summary = result.unwrap();
            assert_eq!(summary.spilled_fields, 2, "{:?} on {}", fault, field);
            assert_eq!(summary.spill_failures, 1, "{:?} on {}", fault, field);
            assert_eq!(text, want, "{:?} on {}", fault, field);
            serde_json::from_str::<Value>(&text).unwrap();
        }
        let (result, text) = run(wide_records(), &SpillStore::default()).await;
        assert_eq!(result.unwrap().spill_failures, 0);
        assert_eq!(text, "{\"A\":[\"x\",\"y\"],\"B\":[1,2],\"C\":[3,4]}\n");
    }

    #[tokio::test]
    async fn test_kind_conflict_is_fatal() {
        let records: Vec<Box<dyn Record>> = vec![
            list(&["1"]),
            Box::new(ScalarA { a: "oops".into() }),
            list(&["3"]),
        ];
        let (result, text) = run(records, &SpillStore::default()).await;
        match result {
            Err(MergeError::KindConflict { field, was, now }) => {
                assert_eq!(field, "A");
                assert_eq!(was, FieldKind::Sequence);
                assert_eq!(now, FieldKind::Scalar);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(text, "{\"A\":[\"1\"");
    }

    #[tokio::test]
    async fn test_new_scalar_is_fatal() {
        let records: Vec<Box<dyn Record>> = vec![list(&["1"]), Box::new(Page::default())];
        let (result, _) = run(records, &SpillStore::default()).await;
        assert!(matches!(result, Err(MergeError::NewScalar(name)) if name == "total"));
    }

    #[tokio::test]
    async fn test_lazy_sequence_field() {
        let records: Vec<Box<dyn Record>> = vec![
            list(&["1"]),
            Box::new(ListExtra {
                a: vec!["2".into()],
                extra: vec![7, 8],
            }),
            Box::new(ListExtra {
                a: vec!["3".into()],
                extra: vec![9],
            }),
        ];
        let (result, text) = run(records, &SpillStore::default()).await;
        assert_eq!(result.unwrap().spilled_fields, 1);
        assert_eq!(text, "{\"A\":[\"1\",\"2\",\"3\"],\"Extra\":[7,8,9]}\n");
    }

    #[tokio::test]
    async fn test_recv_failure_leaves_document_open() {
        let first = list(&["1"]);
        let mut recv = VecReceiver::failing_after(vec![list(&["2"])], Status::internal("gone"));
        let mut out = ResponseWriter::new(Vec::new(), 1024);
        let result = merge_stream(first, &mut recv, &mut out, &SpillStore::default()).await;
        assert!(matches!(result, Err(MergeError::Recv(_))));
        out.flush().await.unwrap();
        assert_eq!(out.into_inner(), b"{\"A\":[\"1\",\"2\"");
    }

    #[tokio::test]
    async fn test_write_records_ndjson() {
        let first = list(&["1"]);
        let mut recv = VecReceiver::failing_after(vec![list(&["2"])], Status::internal("gone"));
        let mut out = ResponseWriter::new(Vec::new(), 1024);
        let result = write_records(first, &mut recv, &mut out).await;
        assert!(matches!(result, Err(MergeError::Recv(_))));
        assert_eq!(out.into_inner(), b"{\"A\":[\"1\"]}\n{\"A\":[\"2\"]}\n");
    }
}
