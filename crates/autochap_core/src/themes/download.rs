//! Theme download planning and execution.
//!
//! Remote lookup is behind [`ThemeProvider`]. Planning compares the listing
//! with the manifest; execution fetches the remaining themes on a bounded
//! pool of worker threads. Workers write distinct files and return their
//! outcomes; the manifest is updated afterwards on the calling thread.

use std::collections::VecDeque;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::thread;

use parking_lot::Mutex;

use crate::audio::ThemeId;

use super::manifest::{sha256_hex, ManifestEntry, ThemeManifest};
use super::{ThemeError, ThemeResult};

/// A theme as offered by a provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTheme {
    pub id: ThemeId,
    /// Changes whenever the provider's audio changes.
    pub fingerprint: String,
    /// Provider-specific locator (URL, key, ...).
    pub locator: String,
    /// File extension of the fetched audio, without the dot.
    pub extension: String,
}

impl RemoteTheme {
    /// File name the theme is stored under.
    pub fn file_name(&self) -> String {
        format!("{}.{}", self.id, self.extension)
    }
}

/// A provider's answer to a series search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThemeListing {
    pub series_name: String,
    pub themes: Vec<RemoteTheme>,
}

/// External theme metadata and audio source.
pub trait ThemeProvider: Send + Sync {
    /// Find the series matching `query` and list its themes.
    fn lookup(&self, query: &str) -> ThemeResult<ThemeListing>;

    /// Fetch the audio bytes of one theme.
    fn fetch(&self, theme: &RemoteTheme) -> ThemeResult<Vec<u8>>;
}

/// Which listed themes need fetching.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadPlan {
    pub series_name: String,
    /// Already stored with the same fingerprint.
    pub up_to_date: Vec<ThemeId>,
    pub to_fetch: Vec<RemoteTheme>,
}

/// Outcome of a download pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadReport {
    pub downloaded: Vec<(ThemeId, PathBuf)>,
    pub failed: Vec<(ThemeId, String)>,
}

/// Split `listing` into themes to keep and themes to fetch.
///
/// The manifest must already be reconciled with the listing's series.
pub fn plan_downloads(manifest: &ThemeManifest, listing: &ThemeListing) -> DownloadPlan {
    let mut plan = DownloadPlan {
        series_name: listing.series_name.clone(),
        ..DownloadPlan::default()
    };

    for theme in &listing.themes {
        // Several versions may map to the same id; the first one listed wins
        if plan.up_to_date.contains(&theme.id) || plan.to_fetch.iter().any(|t| t.id == theme.id) {
            continue;
        }
        let key = theme.id.to_string();
        if manifest.fingerprint(&key) == Some(theme.fingerprint.as_str()) {
            tracing::info!("Already have {}, skipping download", theme.id);
            plan.up_to_date.push(theme.id);
        } else {
            plan.to_fetch.push(theme.clone());
        }
    }
    plan
}

struct Fetched {
    theme: RemoteTheme,
    path: PathBuf,
    sha256: String,
}

/// Fetch planned themes into `dir` using at most `concurrency` workers.
///
/// Individual failures are reported, not returned as errors. Successful
/// downloads are recorded in `manifest` once every worker has finished;
/// the caller persists it.
pub fn execute_downloads(
    plan: &DownloadPlan,
    provider: &dyn ThemeProvider,
    dir: &Path,
    concurrency: usize,
    manifest: &mut ThemeManifest,
) -> ThemeResult<DownloadReport> {
    let mut report = DownloadReport::default();
    if plan.to_fetch.is_empty() {
        return Ok(report);
    }
    fs::create_dir_all(dir)?;

    let queue: Mutex<VecDeque<&RemoteTheme>> = Mutex::new(plan.to_fetch.iter().collect());
    let workers = concurrency.max(1).min(plan.to_fetch.len());

    tracing::debug!(
        "Downloading {} themes with {} workers",
        plan.to_fetch.len(),
        workers
    );

    let queue = &queue;
    let outcomes: Vec<Result<Fetched, (ThemeId, ThemeError)>> = thread::scope(|s| {
        let handles: Vec<_> = (0..workers)
            .map(|_| {
                s.spawn(move || {
                    let mut done = Vec::new();
                    // Pop under the lock, fetch outside it
                    loop {
                        let next = queue.lock().pop_front();
                        let Some(theme) = next else { break };
                        done.push(fetch_one(provider, theme, dir).map_err(|e| (theme.id, e)));
                    }
                    done
                })
            })
            .collect();

        handles
            .into_iter()
            .flat_map(|h| h.join().unwrap_or_else(|panic| std::panic::resume_unwind(panic)))
            .collect()
    });

    // Single writer: merge into the manifest after the fan-out
    for outcome in outcomes {
        match outcome {
            Ok(fetched) => {
                let key = fetched.theme.id.to_string();
                let file = fetched.theme.file_name();
                if let Some(previous) = manifest.themes.get(&key) {
                    if previous.file != file {
                        let stale = dir.join(&previous.file);
                        match fs::remove_file(&stale) {
                            Ok(()) => tracing::debug!("Removed replaced {}", stale.display()),
                            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                            Err(e) => {
                                tracing::warn!("Could not remove {}: {}", stale.display(), e)
                            }
                        }
                    }
                }
                manifest.themes.insert(
                    key,
                    ManifestEntry {
                        fingerprint: fetched.theme.fingerprint.clone(),
                        file,
                        sha256: fetched.sha256,
                    },
                );
                tracing::info!("{} downloaded", fetched.theme.id);
                report.downloaded.push((fetched.theme.id, fetched.path));
            }
            Err((id, e)) => {
                tracing::warn!("Failed to download {}: {}", id, e);
                report.failed.push((id, e.to_string()));
            }
        }
    }

    report.downloaded.sort_by(|a, b| a.0.cmp(&b.0));
    report.failed.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(report)
}

fn fetch_one(provider: &dyn ThemeProvider, theme: &RemoteTheme, dir: &Path) -> ThemeResult<Fetched> {
    let bytes = provider.fetch(theme)?;
    if bytes.is_empty() {
        return Err(ThemeError::Download(format!("{} returned no data", theme.id)));
    }

    let path = dir.join(theme.file_name());
    let temp_path = dir.join(format!("{}.part", theme.file_name()));
    if let Err(e) = write_then_rename(&temp_path, &path, &bytes) {
        if let Err(cleanup) = fs::remove_file(&temp_path) {
            if cleanup.kind() != io::ErrorKind::NotFound {
                tracing::warn!("Could not remove {}: {}", temp_path.display(), cleanup);
            }
        }
        return Err(e.into());
    }

    Ok(Fetched {
        theme: theme.clone(),
        path,
        sha256: sha256_hex(&bytes),
    })
}

fn write_then_rename(temp_path: &Path, path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = fs::File::create(temp_path)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    drop(file);
    fs::rename(temp_path, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeProvider {
        listing: ThemeListing,
        fail: HashSet<String>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl FakeProvider {
        fn new(themes: &[(&str, &str)], fail: &[&str]) -> Self {
            Self {
                listing: ThemeListing {
                    series_name: "Show".to_string(),
                    themes: themes
                        .iter()
                        .map(|(id, fp)| RemoteTheme {
                            id: id.parse().unwrap(),
                            fingerprint: fp.to_string(),
                            locator: format!("https://example.invalid/{}", id),
                            extension: "ogg".to_string(),
                        })
                        .collect(),
                },
                fail: fail.iter().map(|s| s.to_string()).collect(),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
            }
        }
    }

    impl ThemeProvider for FakeProvider {
        fn lookup(&self, _query: &str) -> ThemeResult<ThemeListing> {
            Ok(self.listing.clone())
        }

        fn fetch(&self, theme: &RemoteTheme) -> ThemeResult<Vec<u8>> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(std::time::Duration::from_millis(10));
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.fail.contains(&theme.id.to_string()) {
                return Err(ThemeError::Download("status 404".to_string()));
            }
            Ok(format!("audio of {}", theme.id).into_bytes())
        }
    }

    #[test]
    fn plan_skips_matching_fingerprints() {
        let provider = FakeProvider::new(&[("OP1", "a"), ("ED1", "b"), ("ED2", "c")], &[]);
        let mut manifest = ThemeManifest::for_series("Show");
        manifest.themes.insert(
            "OP1".to_string(),
            ManifestEntry {
                fingerprint: "a".to_string(),
                file: "OP1.ogg".to_string(),
                sha256: String::new(),
            },
        );
        manifest.themes.insert(
            "ED1".to_string(),
            ManifestEntry {
                fingerprint: "old".to_string(),
                file: "ED1.ogg".to_string(),
                sha256: String::new(),
            },
        );

        let plan = plan_downloads(&manifest, &provider.listing);
        assert_eq!(plan.up_to_date, vec!["OP1".parse::<ThemeId>().unwrap()]);
        let fetch: Vec<String> = plan.to_fetch.iter().map(|t| t.id.to_string()).collect();
        assert_eq!(fetch, vec!["ED1", "ED2"]);
    }

    #[test]
    fn plan_keeps_first_listing_per_id() {
        let provider = FakeProvider::new(&[("OP1", "a"), ("OP1", "b")], &[]);
        let plan = plan_downloads(&ThemeManifest::default(), &provider.listing);
        assert_eq!(plan.to_fetch.len(), 1);
        assert_eq!(plan.to_fetch[0].fingerprint, "a");
    }

    #[test]
    fn downloads_respect_pool_width_and_record_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let ids = [("OP1", "1"), ("OP2", "2"), ("ED1", "3"), ("ED2", "4"), ("ED3", "5")];
        let provider = FakeProvider::new(&ids, &[]);
        let mut manifest = ThemeManifest::for_series("Show");
        let plan = plan_downloads(&manifest, &provider.listing);

        let report = execute_downloads(&plan, &provider, dir.path(), 2, &mut manifest).unwrap();

        assert_eq!(report.downloaded.len(), 5);
        assert!(report.failed.is_empty());
        assert!(provider.max_in_flight.load(Ordering::SeqCst) <= 2);
        assert_eq!(manifest.themes.len(), 5);
        assert_eq!(manifest.fingerprint("ED2"), Some("4"));
        assert_eq!(
            fs::read(dir.path().join("OP1.ogg")).unwrap(),
            b"audio of OP1".to_vec()
        );
        assert!(!dir.path().join("OP1.ogg.part").exists());
    }

    #[test]
    fn failed_downloads_are_reported_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let provider = FakeProvider::new(&[("OP1", "1"), ("ED1", "2")], &["ED1"]);
        let mut manifest = ThemeManifest::for_series("Show");
        let plan = plan_downloads(&manifest, &provider.listing);

        let report = execute_downloads(&plan, &provider, dir.path(), 4, &mut manifest).unwrap();

        assert_eq!(report.downloaded.len(), 1);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0.to_string(), "ED1");
        assert!(manifest.fingerprint("ED1").is_none());
        assert!(!dir.path().join("ED1.ogg").exists());
    }

    #[test]
    fn failed_write_leaves_no_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        // A non-empty directory where the theme file should go makes the rename fail
        fs::create_dir_all(dir.path().join("OP1.ogg").join("blocker")).unwrap();
        let provider = FakeProvider::new(&[("OP1", "1")], &[]);
        let mut manifest = ThemeManifest::for_series("Show");
        let plan = plan_downloads(&manifest, &provider.listing);

        let report = execute_downloads(&plan, &provider, dir.path(), 1, &mut manifest).unwrap();

        assert_eq!(report.failed.len(), 1);
        assert!(!dir.path().join("OP1.ogg.part").exists());
        assert!(manifest.fingerprint("OP1").is_none());
    }

    #[test]
    fn redownload_with_new_extension_removes_old_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("OP1.mp3"), b"old").unwrap();
        let provider = FakeProvider::new(&[("OP1", "2")], &[]);
        let mut manifest = ThemeManifest::for_series("Show");
        manifest.themes.insert(
            "OP1".to_string(),
            ManifestEntry {
                fingerprint: "1".to_string(),
                file: "OP1.mp3".to_string(),
                sha256: String::new(),
            },
        );
        let plan = plan_downloads(&manifest, &provider.listing);

        execute_downloads(&plan, &provider, dir.path(), 1, &mut manifest).unwrap();

        assert!(!dir.path().join("OP1.mp3").exists());
        assert!(dir.path().join("OP1.ogg").is_file());
        assert_eq!(manifest.themes["OP1"].file, "OP1.ogg");
    }

    #[test]
    fn empty_plan_does_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let provider = FakeProvider::new(&[], &[]);
        let mut manifest = ThemeManifest::default();
        let report =
            execute_downloads(&DownloadPlan::default(), &provider, dir.path(), 4, &mut manifest)
                .unwrap();
        assert_eq!(report, DownloadReport::default());
    }
}
