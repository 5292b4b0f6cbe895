//! Artifact writing.
//!
//! Every file a run produces goes through [`ArtifactWriter`], which
//! records its size and SHA-256 digest. `finish` writes the landing page
//! and `manifest.json` last.

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};

use crate::logging::{log_artifact, log_skipped, run_id};
use crate::render::site;

pub const MANIFEST_FILE: &str = "manifest.json";
pub const INDEX_FILE: &str = "index.html";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meta {
    pub as_of_utc: String,
}

impl Meta {
    pub fn new(as_of: DateTime<Utc>) -> Self {
        Self {
            as_of_utc: as_of.to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }
}

/// JSON artifact body: run metadata plus a list of records.
#[derive(Debug, Serialize)]
pub struct Payload<'a, T: Serialize> {
    pub meta: &'a Meta,
    pub data: &'a [T],
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactEntry {
    pub path: String,
    pub report: String,
    pub bytes: usize,
    pub rows: usize,
    pub sha256: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedEntry {
    pub path: String,
    pub report: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub run_id: String,
    pub meta: Meta,
    pub artifacts: Vec<ArtifactEntry>,
    pub skipped: Vec<SkippedEntry>,
}

impl Manifest {
    pub fn find(&self, path: &str) -> Option<&ArtifactEntry> {
        self.artifacts.iter().find(|a| a.path == path)
    }
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

pub struct ArtifactWriter {
    out_dir: PathBuf,
    manifest: Manifest,
    /// (file name, page title) of every HTML page, for the landing page.
    pages: Vec<(String, String)>,
}

impl ArtifactWriter {
    pub fn new(out_dir: &Path, as_of: DateTime<Utc>) -> Result<Self> {
        fs::create_dir_all(out_dir)
            .with_context(|| format!("failed to create output dir {}", out_dir.display()))?;
        Ok(Self {
            out_dir: out_dir.to_path_buf(),
            manifest: Manifest {
                run_id: run_id(),
                meta: Meta::new(as_of),
                artifacts: Vec::new(),
                skipped: Vec::new(),
            },
            pages: Vec::new(),
        })
    }

    pub fn meta(&self) -> &Meta {
        &self.manifest.meta
    }

    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    pub fn artifacts(&self) -> &[ArtifactEntry] {
        &self.manifest.artifacts
    }

    pub fn skipped(&self) -> &[SkippedEntry] {
        &self.manifest.skipped
    }

    /// Pretty-printed `{"meta": ..., "data": [...]}`.
    pub fn write_json<T: Serialize>(&mut self, report: &str, name: &str, data: &[T]) -> Result<PathBuf> {
        let payload = Payload { meta: &self.manifest.meta, data };
        let body = serde_json::to_vec_pretty(&payload)
            .with_context(|| format!("failed to serialize {}", name))?;
        self.write_bytes(report, name, &body, data.len())
    }

    /// CSV with an explicit header, so zero-row outputs still carry one.
    pub fn write_csv<T: Serialize>(
        &mut self,
        report: &str,
        name: &str,
        header: &[&str],
        rows: &[T],
    ) -> Result<PathBuf> {
        let mut wtr = csv::WriterBuilder::new().has_headers(false).from_writer(Vec::new());
        wtr.write_record(header)?;
        for row in rows {
            wtr.serialize(row)
                .with_context(|| format!("failed to serialize row of {}", name))?;
        }
        let body = wtr
            .into_inner()
            .map_err(|e| anyhow::anyhow!("failed to flush {}: {}", name, e.error()))?;
        self.write_bytes(report, name, &body, rows.len())
    }

    pub fn write_html(&mut self, report: &str, name: &str, title: &str, html: &str) -> Result<PathBuf> {
        let path = self.write_bytes(report, name, html.as_bytes(), 0)?;
        self.pages.retain(|(n, _)| n != name);
        self.pages.push((name.to_string(), title.to_string()));
        Ok(path)
    }

    pub fn skip(&mut self, report: &str, name: &str, reason: &str) {
        log_skipped(report, name, reason);
        self.manifest.skipped.push(SkippedEntry {
            path: name.to_string(),
            report: report.to_string(),
            reason: reason.to_string(),
        });
    }

    fn write_bytes(&mut self, report: &str, name: &str, body: &[u8], rows: usize) -> Result<PathBuf> {
        let path = self.out_dir.join(name);
        fs::write(&path, body).with_context(|| format!("failed to write {}", path.display()))?;
        log_artifact(report, name, body.len(), rows);
        let entry = ArtifactEntry {
            path: name.to_string(),
            report: report.to_string(),
            bytes: body.len(),
            rows,
            sha256: sha256_hex(body),
        };
        // Rewriting a file replaces its entry.
        self.manifest.artifacts.retain(|a| a.path != name);
        self.manifest.artifacts.push(entry);
        Ok(path)
    }

    /// Write the landing page (when any page exists) and the manifest.
    pub fn finish(mut self) -> Result<Manifest> {
        if !self.pages.is_empty() {
            let html = site::index_page(&self.manifest.meta, &self.pages);
            self.write_bytes("index", INDEX_FILE, html.as_bytes(), self.pages.len())?;
        }
        let path = self.out_dir.join(MANIFEST_FILE);
        let body = serde_json::to_vec_pretty(&self.manifest)?;
        fs::write(&path, &body).with_context(|| format!("failed to write {}", path.display()))?;
        log_artifact("index", MANIFEST_FILE, body.len(), self.manifest.artifacts.len());
        Ok(self.manifest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[derive(Serialize)]
    struct Row {
        name: String,
        n: Option<u64>,
    }

    fn writer(dir: &Path) -> ArtifactWriter {
        let as_of = Utc.with_ymd_and_hms(2024, 1, 15, 8, 30, 0).unwrap();
        ArtifactWriter::new(dir, as_of).unwrap()
    }

    #[test]
    fn json_payload_has_meta_and_data() {
        let dir = tempfile::tempdir().unwrap();
        let mut w = writer(dir.path());
        let rows = vec![Row { name: "a".into(), n: Some(2) }];
        let path = w.write_json("test", "rows.json", &rows).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&fs::read(path).unwrap()).unwrap();
        assert_eq!(value["meta"]["as_of_utc"], "2024-01-15T08:30:00Z");
        assert_eq!(value["data"][0]["name"], "a");
        assert_eq!(value["data"][0]["n"], 2);
    }

    #[test]
    fn empty_csv_keeps_header() {
        let dir = tempfile::tempdir().unwrap();
        let mut w = writer(dir.path());
        let path = w.write_csv::<Row>("test", "empty.csv", &["name", "n"], &[]).unwrap();
        assert_eq!(fs::read_to_string(path).unwrap(), "name,n\n");

        let rows = vec![Row { name: "x, y".into(), n: None }];
        let path = w.write_csv("test", "one.csv", &["name", "n"], &rows).unwrap();
        assert_eq!(fs::read_to_string(path).unwrap(), "name,n\n\"x, y\",\n");
    }

    #[test]
    fn manifest_digests_match_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let mut w = writer(dir.path());
        w.write_html("test", "page.html", "Page", "<p>hi</p>").unwrap();
        w.write_html("test", "page.html", "Page", "<p>hello</p>").unwrap();
        w.skip("test", "none.html", "no rows");
        let manifest = w.finish().unwrap();

        let page = manifest.find("page.html").unwrap();
        assert_eq!(page.sha256, sha256_hex(b"<p>hello</p>"));
        assert_eq!(page.bytes, 12);
        assert_eq!(manifest.artifacts.iter().filter(|a| a.path == "page.html").count(), 1);
        assert_eq!(manifest.skipped.len(), 1);

        let index = fs::read(dir.path().join(INDEX_FILE)).unwrap();
        assert_eq!(manifest.find(INDEX_FILE).unwrap().sha256, sha256_hex(&index));
        let on_disk: Manifest =
            serde_json::from_slice(&fs::read(dir.path().join(MANIFEST_FILE)).unwrap()).unwrap();
        assert_eq!(on_disk, manifest);
    }
}
