// Report JSON shape and writer tests

mod common;

use std::path::{Path, PathBuf};

use common::{device, sample};
use monitoring_agent::models::{Datasets, DeviceSpec, Report, Sample, Spec};
use monitoring_agent::report_writer::{
    FALLBACK_FILE_NAME, ReportWriter, WriteError, default_output_path, resolve_output_path,
};
use serde_json::json;

fn report() -> Report {
    Report {
        spec: Spec {
            mem_total: 8192,
            devices: vec![DeviceSpec {
                index: 0,
                mem_total: 16_384,
            }],
        },
        datasets: Datasets {
            fifteen_minutes: vec![Sample::new(1_700_000_000, 12, 1024, vec![device(0, 512, 30)])],
            one_hour: vec![sample(1_700_000_000, 12, 1024)],
            three_hours: vec![],
            lifetime: vec![],
        },
    }
}

#[test]
fn report_serializes_with_wire_names() {
    let value = serde_json::to_value(report()).unwrap();
    assert_eq!(
        value,
        json!({
            "spec": {
                "mem_total": 8192,
                "GPU": [{ "index": 0, "mem_total": 16384 }]
            },
            "datasets": {
                "15m": [{
                    "timestamp": 1_700_000_000,
                    "cpu_util": 12,
                    "mem_used": 1024,
                    "GPU": [{ "index": 0, "mem_used": 512, "gpu_util": 30 }]
                }],
                "1h": [{
                    "timestamp": 1_700_000_000,
                    "cpu_util": 12,
                    "mem_used": 1024,
                    "GPU": []
                }],
                "3h": [],
                "lifetime": []
            }
        })
    );
}

#[test]
fn sample_without_gpu_field_deserializes() {
    let s: Sample =
        serde_json::from_str(r#"{"timestamp": 5, "cpu_util": 1, "mem_used": 2}"#).unwrap();
    assert_eq!(s, sample(5, 1, 2));
}

#[test]
fn writer_replaces_file_contents() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("monitoring");
    std::fs::write(&path, "stale contents that are longer than nothing").unwrap();
    let writer = ReportWriter::new(&path);
    assert_eq!(writer.path(), path.as_path());

    let empty = Report::default();
    let bytes = writer.write(&empty).unwrap();
    assert_eq!(bytes as u64, std::fs::metadata(&path).unwrap().len());
    let back: Report = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
    assert_eq!(back, empty);

    writer.write(&report()).unwrap();
    let back: Report = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
    assert_eq!(back, report());
}

#[test]
fn writer_reports_io_errors() {
    let dir = tempfile::TempDir::new().unwrap();
    let writer = ReportWriter::new(dir.path().join("missing").join("monitoring"));
    let err = writer.write(&report()).unwrap_err();
    assert!(matches!(err, WriteError::Io { .. }));
}

#[test]
fn default_output_path_layout() {
    assert_eq!(
        default_output_path(Path::new("/phfs/jobArtifacts"), "job-test"),
        PathBuf::from("/phfs/jobArtifacts/job-test/.metadata/monitoring")
    );
}

#[test]
fn resolve_keeps_path_when_directory_exists() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("monitoring");
    assert_eq!(resolve_output_path(&path, Path::new("/work")), path);
}

#[test]
fn resolve_falls_back_to_cwd() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("job").join(".metadata").join("monitoring");
    let cwd = tempfile::TempDir::new().unwrap();
    assert_eq!(
        resolve_output_path(&path, cwd.path()),
        cwd.path().join(FALLBACK_FILE_NAME)
    );
}
