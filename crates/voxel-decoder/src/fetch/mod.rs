//! Local copy of the Haxby (2001) dataset, subject 2.
//!
//! Layout under the data directory:
//!
//! ```text
//! <data_dir>/haxby2001/
//! ├── mask.nii.gz
//! └── subj2/
//!     ├── anat.nii.gz
//!     ├── bold.nii.gz
//!     ├── labels.txt
//!     ├── mask4_vt.nii.gz
//!     ├── mask8b_face_vt.nii.gz
//!     └── mask8b_house_vt.nii.gz
//! ```
//!
//! Missing files are downloaded from the PyMVPA mirror: the brain mask on its
//! own, the subject files as one gzipped tarball that is unpacked and then
//! removed. Files already present are never fetched again.

mod archive;

use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

pub use archive::{extract_tar_gz, sanitize_archive_path};

/// Mirror hosting the dataset.
pub const DEFAULT_BASE_URL: &str = "http://data.pymvpa.org/datasets/haxby2001/";

/// Directory below the data directory holding the dataset.
pub const DATASET_DIR: &str = "haxby2001";

const SUBJECT_DIR: &str = "subj2";
const SUBJECT_ARCHIVE: &str = "subj2-2010.01.14.tar.gz";
const MASK_FILE: &str = "mask.nii.gz";

/// Errors raised while fetching the dataset.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("download of {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: Box<ureq::Error>,
    },

    #[error("download of {url} failed: {source}")]
    Transfer {
        url: String,
        #[source]
        source: io::Error,
    },

    #[error("dataset incomplete after fetching, missing: {}", .missing.join(", "))]
    Incomplete { missing: Vec<String> },
}

pub(crate) fn io_error(path: &Path) -> impl FnOnce(io::Error) -> FetchError + '_ {
    move |source| FetchError::Io {
        path: path.display().to_string(),
        source,
    }
}

// =============================================================================
// Transport
// =============================================================================

/// Source of remote files.
pub trait Transport {
    /// Open a reader over the body of `url`.
    fn open(&self, url: &str) -> Result<Box<dyn Read + Send>, FetchError>;
}

/// Plain HTTP(S) transport.
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpTransport;

impl Transport for HttpTransport {
    fn open(&self, url: &str) -> Result<Box<dyn Read + Send>, FetchError> {
        let response = ureq::get(url).call().map_err(|source| FetchError::Http {
            url: url.to_string(),
            source: Box::new(source),
        })?;
        Ok(Box::new(response.into_reader()))
    }
}

// =============================================================================
// HaxbyDataset
// =============================================================================

/// Paths of the dataset files for one subject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HaxbyDataset {
    pub root: PathBuf,
    /// Whole-brain mask shared by all subjects.
    pub mask: PathBuf,
    pub anat: PathBuf,
    /// 4D functional series.
    pub func: PathBuf,
    /// Per-frame condition and session table.
    pub session_target: PathBuf,
    /// Ventral temporal cortex mask.
    pub mask_vt: PathBuf,
    pub mask_face: PathBuf,
    pub mask_house: PathBuf,
}

impl HaxbyDataset {
    /// Expected file locations below `data_dir`; nothing is checked.
    pub fn at(data_dir: &Path) -> Self {
        let root = data_dir.join(DATASET_DIR);
        let subject = root.join(SUBJECT_DIR);
        Self {
            mask: root.join(MASK_FILE),
            anat: subject.join("anat.nii.gz"),
            func: subject.join("bold.nii.gz"),
            session_target: subject.join("labels.txt"),
            mask_vt: subject.join("mask4_vt.nii.gz"),
            mask_face: subject.join("mask8b_face_vt.nii.gz"),
            mask_house: subject.join("mask8b_house_vt.nii.gz"),
            root,
        }
    }

    fn subject_files(&self) -> [&Path; 6] {
        [
            &self.anat,
            &self.func,
            &self.session_target,
            &self.mask_vt,
            &self.mask_face,
            &self.mask_house,
        ]
    }

    /// Files that are not on disk yet.
    pub fn missing(&self) -> Vec<PathBuf> {
        std::iter::once(self.mask.as_path())
            .chain(self.subject_files())
            .filter(|p| !p.is_file())
            .map(Path::to_path_buf)
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.missing().is_empty()
    }
}

// =============================================================================
// DatasetFetcher
// =============================================================================

/// Downloads missing dataset files into a data directory.
#[derive(Debug, Clone)]
pub struct DatasetFetcher<T = HttpTransport> {
    data_dir: PathBuf,
    base_url: String,
    transport: T,
}

impl DatasetFetcher<HttpTransport> {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self::with_transport(data_dir, DEFAULT_BASE_URL, HttpTransport)
    }
}

impl<T: Transport> DatasetFetcher<T> {
    pub fn with_transport(data_dir: impl Into<PathBuf>, base_url: impl Into<String>, transport: T) -> Self {
        let mut base_url = base_url.into();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        Self {
            data_dir: data_dir.into(),
            base_url,
            transport,
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Ensure every dataset file is present locally and return their paths.
    pub fn fetch(&self) -> Result<HaxbyDataset, FetchError> {
        let dataset = HaxbyDataset::at(&self.data_dir);
        if dataset.is_complete() {
            debug!(root = %dataset.root.display(), "dataset already present");
            return Ok(dataset);
        }
        fs::create_dir_all(&dataset.root).map_err(io_error(&dataset.root))?;

        if !dataset.mask.is_file() {
            self.download(MASK_FILE, &dataset.mask)?;
        }

        if dataset.subject_files().iter().any(|p| !p.is_file()) {
            let archive = dataset.root.join(SUBJECT_ARCHIVE);
            if !archive.is_file() {
                self.download(SUBJECT_ARCHIVE, &archive)?;
            }
            let n_files = extract_tar_gz(&archive, &dataset.root)?;
            info!(archive = %archive.display(), n_files, "extracted subject archive");
            fs::remove_file(&archive).map_err(io_error(&archive))?;
        }

        let missing = dataset.missing();
        if !missing.is_empty() {
            return Err(FetchError::Incomplete {
                missing: missing.iter().map(|p| p.display().to_string()).collect(),
            });
        }
        Ok(dataset)
    }

    /// Download `name` relative to the base URL to `dest`.
    ///
    /// The body goes to `<dest>.part` first and is renamed once complete.
    fn download(&self, name: &str, dest: &Path) -> Result<u64, FetchError> {
        let url = format!("{}{}", self.base_url, name);
        info!(%url, dest = %dest.display(), "downloading");

        let mut partial = dest.as_os_str().to_owned();
        partial.push(".part");
        let partial = PathBuf::from(partial);

        let mut body = self.transport.open(&url)?;
        let written = fs::File::create(&partial)
            .map_err(io_error(&partial))
            .and_then(|mut file| {
                let bytes = io::copy(&mut body, &mut file).map_err(|source| FetchError::Transfer {
                    url: url.clone(),
                    source,
                })?;
                file.sync_all().map_err(io_error(&partial))?;
                Ok(bytes)
            });
        let bytes = match written {
            Ok(bytes) => bytes,
            Err(err) => {
                if let Err(cleanup) = fs::remove_file(&partial) {
                    if cleanup.kind() != io::ErrorKind::NotFound {
                        warn!(path = %partial.display(), error = %cleanup, "could not remove partial download");
                    }
                }
                return Err(err);
            }
        };
        fs::rename(&partial, dest).map_err(io_error(dest))?;

        debug!(%url, bytes, "download complete");
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    /// Serves files from a local directory, recording requested URLs.
    struct DirTransport {
        dir: PathBuf,
        requests: RefCell<Vec<String>>,
    }

    impl Transport for DirTransport {
        fn open(&self, url: &str) -> Result<Box<dyn Read + Send>, FetchError> {
            self.requests.borrow_mut().push(url.to_string());
            let name = url.rsplit('/').next().unwrap_or_default();
            let path = self.dir.join(name);
            let file = fs::File::open(&path).map_err(io_error(&path))?;
            Ok(Box::new(file))
        }
    }

    fn write_mirror(dir: &Path) {
        fs::write(dir.join(MASK_FILE), b"mask").unwrap();

        let file = fs::File::create(dir.join(SUBJECT_ARCHIVE)).unwrap();
        let encoder = flate2::write::GzEncoder::new(file, flate2::Compression::fast());
        let mut builder = tar::Builder::new(encoder);
        for name in [
            "anat.nii.gz",
            "bold.nii.gz",
            "labels.txt",
            "mask4_vt.nii.gz",
            "mask8b_face_vt.nii.gz",
            "mask8b_house_vt.nii.gz",
        ] {
            let data = name.as_bytes();
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder
                .append_data(&mut header, format!("subj2/{name}"), data)
                .unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap();
    }

    #[test]
    fn dataset_paths() {
        let dataset = HaxbyDataset::at(Path::new("/data"));
        assert_eq!(dataset.mask, Path::new("/data/haxby2001/mask.nii.gz"));
        assert_eq!(dataset.func, Path::new("/data/haxby2001/subj2/bold.nii.gz"));
        assert_eq!(dataset.session_target, Path::new("/data/haxby2001/subj2/labels.txt"));
        assert_eq!(dataset.missing().len(), 7);
    }

    #[test]
    fn fetch_downloads_then_reuses() {
        let mirror = tempfile::tempdir().unwrap();
        let data = tempfile::tempdir().unwrap();
        write_mirror(mirror.path());

        let fetcher = DatasetFetcher::with_transport(
            data.path(),
            "http://mirror.invalid/haxby2001",
            DirTransport {
                dir: mirror.path().to_path_buf(),
                requests: RefCell::new(Vec::new()),
            },
        );

        let dataset = fetcher.fetch().unwrap();
        assert!(dataset.is_complete());
        assert_eq!(fs::read_to_string(&dataset.session_target).unwrap(), "labels.txt");
        assert!(!dataset.root.join(SUBJECT_ARCHIVE).exists());
        assert_eq!(
            *fetcher.transport.requests.borrow(),
            vec![
                "http://mirror.invalid/haxby2001/mask.nii.gz".to_string(),
                "http://mirror.invalid/haxby2001/subj2-2010.01.14.tar.gz".to_string(),
            ]
        );

        let again = fetcher.fetch().unwrap();
        assert_eq!(again, dataset);
        assert_eq!(fetcher.transport.requests.borrow().len(), 2);
    }

    #[test]
    fn only_missing_parts_are_fetched() {
        let mirror = tempfile::tempdir().unwrap();
        let data = tempfile::tempdir().unwrap();
        write_mirror(mirror.path());

        let dataset = HaxbyDataset::at(data.path());
        fs::create_dir_all(&dataset.root).unwrap();
        fs::write(&dataset.mask, b"already here").unwrap();

        let fetcher = DatasetFetcher::with_transport(
            data.path(),
            "http://mirror.invalid/",
            DirTransport {
                dir: mirror.path().to_path_buf(),
                requests: RefCell::new(Vec::new()),
            },
        );
        fetcher.fetch().unwrap();

        assert_eq!(fetcher.transport.requests.borrow().len(), 1);
        assert_eq!(fs::read(&dataset.mask).unwrap(), b"already here");
    }

    #[test]
    fn failed_download_leaves_no_file() {
        let mirror = tempfile::tempdir().unwrap();
        let data = tempfile::tempdir().unwrap();
        let fetcher = DatasetFetcher::with_transport(
            data.path(),
            "http://mirror.invalid/",
            DirTransport {
                dir: mirror.path().to_path_buf(),
                requests: RefCell::new(Vec::new()),
            },
        );

        assert!(matches!(fetcher.fetch(), Err(FetchError::Io { .. })));
        assert!(!HaxbyDataset::at(data.path()).mask.exists());
    }

    /// Yields a few bytes, then fails like a dropped connection.
    struct BrokenBody {
        sent: bool,
    }

    impl Read for BrokenBody {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.sent {
                return Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset by peer"));
            }
            self.sent = true;
            buf[..4].copy_from_slice(b"NIfT");
            Ok(4)
        }
    }

    struct BrokenTransport;

    impl Transport for BrokenTransport {
        fn open(&self, _url: &str) -> Result<Box<dyn Read + Send>, FetchError> {
            Ok(Box::new(BrokenBody { sent: false }))
        }
    }

    #[test]
    fn interrupted_transfer_removes_partial_file() {
        let data = tempfile::tempdir().unwrap();
        let fetcher = DatasetFetcher::with_transport(data.path(), "http://mirror.invalid/", BrokenTransport);

        assert!(matches!(fetcher.fetch(), Err(FetchError::Transfer { .. })));

        let dataset = HaxbyDataset::at(data.path());
        assert!(!dataset.mask.exists());
        let leftovers: Vec<_> = fs::read_dir(&dataset.root)
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert!(leftovers.is_empty(), "left behind {leftovers:?}");
    }
}
