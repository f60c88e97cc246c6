//! Tarball byte streams.
//!
//! Both sources are produced on the blocking pool and handed to the async side
//! through a bounded channel of [`CHUNK_SIZE`] chunks, so memory stays bounded
//! no matter how large the package is.

use std::{
    fmt,
    fs::{self, File},
    io::{self, Write},
    path::{Path, PathBuf},
    pin::Pin,
    task::{Context, Poll},
};

use bytes::Bytes;
use flate2::{write::GzEncoder, Compression};
use futures::stream::{self, BoxStream, Stream, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};

pub const CHUNK_SIZE: usize = 64 * 1024;

const CHANNEL_DEPTH: usize = 8;

/// Top-level directory npm expects inside a package tarball.
pub const PACKAGE_PREFIX: &str = "package";

/// Directories left out when packing a source directory.
pub const PACK_SKIPPED_DIRS: [&str; 4] = ["node_modules", ".git", ".hg", ".svn"];

/// A stream of tarball bytes.
///
/// Errors inside the stream are I/O failures that happened after the
/// response started; the consumer should terminate the transfer.
pub struct TarballStream {
    content_length: Option<u64>,
    inner: BoxStream<'static, io::Result<Bytes>>,
}

impl TarballStream {
    /// Streams an existing file verbatim.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn from_file(path: &Path) -> io::Result<Self> {
        let mut file = File::open(path)?;
        let content_length = file.metadata()?.len();

        let inner = spawn_producer(path.display().to_string(), move |writer| {
            io::copy(&mut file, writer).map(|_| ())
        });

        Ok(Self {
            content_length: Some(content_length),
            inner,
        })
    }

    /// Packs `root` into a `.tgz` while it is being streamed.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn from_directory(root: PathBuf) -> Self {
        let inner = spawn_producer(root.display().to_string(), move |writer| {
            pack_directory(&root, writer).map(|_| ())
        });

        Self {
            content_length: None,
            inner,
        }
    }

    /// Size in bytes when known up front (tarball files only).
    pub fn content_length(&self) -> Option<u64> {
        self.content_length
    }
}

impl fmt::Debug for TarballStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TarballStream")
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

impl Stream for TarballStream {
    type Item = io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx)
    }
}

/// Writes a gzip compressed tar of `root` to `writer`, files under `package/`.
///
/// Entries are added in sorted order with normalized metadata, so packing the
/// same tree twice yields the same archive. Symlinks are followed; a link back
/// into one of its own ancestors is skipped, as are dangling links.
pub fn pack_directory<W: Write>(root: &Path, writer: W) -> io::Result<W> {
    let mut builder = tar::Builder::new(GzEncoder::new(writer, Compression::default()));
    builder.mode(tar::HeaderMode::Deterministic);

    let mut ancestors = vec![fs::canonicalize(root)?];
    append_tree(&mut builder, root, Path::new(PACKAGE_PREFIX), &mut ancestors)?;

    builder.into_inner()?.finish()
}

fn append_tree<W: Write>(
    builder: &mut tar::Builder<W>,
    dir: &Path,
    prefix: &Path,
    ancestors: &mut Vec<PathBuf>,
) -> io::Result<()> {
    let mut entries = fs::read_dir(dir)?.collect::<io::Result<Vec<_>>>()?;
    entries.sort_by_key(|entry| entry.file_name());

    for entry in entries {
        let path = entry.path();
        let file_name = entry.file_name();
        let archive_path = prefix.join(&file_name);

        let metadata = match fs::metadata(&path) {
            Ok(metadata) => metadata,
            Err(err) if entry.file_type()?.is_symlink() => {
                debug!("skipping dangling symlink {}: {err}", path.display());
                continue;
            }
            Err(err) => return Err(err),
        };

        if metadata.is_dir() {
            if PACK_SKIPPED_DIRS.contains(&&*file_name.to_string_lossy()) {
                continue;
            }

            let canonical = fs::canonicalize(&path)?;
            if ancestors.contains(&canonical) {
                debug!("skipping symlink cycle at {}", path.display());
                continue;
            }

            ancestors.push(canonical);
            append_tree(builder, &path, &archive_path, ancestors)?;
            ancestors.pop();
        } else {
            builder.append_path_with_name(&path, &archive_path)?;
        }
    }

    Ok(())
}

/// `Write` end of the producer channel; buffers up to [`CHUNK_SIZE`].
struct ChannelWriter {
    sender: mpsc::Sender<io::Result<Bytes>>,
    buffer: Vec<u8>,
}

impl ChannelWriter {
    fn new(sender: mpsc::Sender<io::Result<Bytes>>) -> Self {
        Self {
            sender,
            buffer: Vec::with_capacity(CHUNK_SIZE),
        }
    }

    fn send_buffer(&mut self) -> io::Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }

        let chunk = std::mem::replace(&mut self.buffer, Vec::with_capacity(CHUNK_SIZE));
        self.sender
            .blocking_send(Ok(Bytes::from(chunk)))
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "receiver dropped"))
    }
}

impl Write for ChannelWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        if self.buffer.len() >= CHUNK_SIZE {
            self.send_buffer()?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.send_buffer()
    }
}

fn spawn_producer<F>(label: String, produce: F) -> BoxStream<'static, io::Result<Bytes>>
where
    F: FnOnce(&mut ChannelWriter) -> io::Result<()> + Send + 'static,
{
    let (sender, receiver) = mpsc::channel(CHANNEL_DEPTH);

    tokio::task::spawn_blocking(move || {
        let mut writer = ChannelWriter::new(sender.clone());

        if let Err(err) = produce(&mut writer).and_then(|()| writer.flush()) {
            if err.kind() == io::ErrorKind::BrokenPipe {
                debug!(source = %label, "download aborted by client");
            } else {
                warn!(source = %label, "failed to stream tarball: {err}");
                let _ = sender.blocking_send(Err(err));
            }
        }
    });

    stream::unfold(receiver, |mut receiver| {
        async move { receiver.recv().await.map(|item| (item, receiver)) }
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use flate2::read::GzDecoder;

    use super::*;

    fn archive_paths(bytes: &[u8]) -> Vec<String> {
        let mut archive = tar::Archive::new(GzDecoder::new(bytes));
        archive
            .entries()
            .unwrap()
            .map(|e| e.unwrap().path().unwrap().to_string_lossy().into_owned())
            .collect()
    }

    async fn collect(stream: TarballStream) -> io::Result<Vec<u8>> {
        let chunks: Vec<io::Result<Bytes>> = stream.collect().await;
        let mut out = Vec::new();
        for chunk in chunks {
            out.extend_from_slice(&chunk?);
        }
        Ok(out)
    }

    fn sample_tree() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::write(root.join("package.json"), r#"{"name":"pkg","version":"2.0.0"}"#).unwrap();
        fs::create_dir_all(root.join("lib")).unwrap();
        fs::write(root.join("lib/index.js"), "module.exports = 2;").unwrap();
        fs::create_dir_all(root.join("node_modules/dep")).unwrap();
        fs::write(root.join("node_modules/dep/index.js"), "").unwrap();
        fs::create_dir_all(root.join(".git")).unwrap();
        fs::write(root.join(".git/HEAD"), "ref: refs/heads/main").unwrap();
        dir
    }

    #[test]
    fn test_pack_directory_layout() {
        let dir = sample_tree();
        let bytes = pack_directory(dir.path(), Vec::new()).unwrap();

        assert_eq!(
            archive_paths(&bytes),
            vec!["package/lib/index.js", "package/package.json"]
        );
    }

    #[test]
    fn test_pack_directory_is_deterministic() {
        let dir = sample_tree();
        let first = pack_directory(dir.path(), Vec::new()).unwrap();
        let second = pack_directory(dir.path(), Vec::new()).unwrap();
        assert_eq!(first, second);
    }

    #[cfg(unix)]
    #[test]
    fn test_pack_directory_follows_symlinks() {
        use std::os::unix::fs::symlink;

        let tmp = tempfile::tempdir().unwrap();
        let shared = tmp.path().join("shared");
        fs::create_dir_all(&shared).unwrap();
        fs::write(shared.join("util.js"), "module.exports = {};").unwrap();

        let root = tmp.path().join("pkg");
        fs::create_dir_all(&root).unwrap();
        fs::write(root.join("package.json"), r#"{"name":"pkg","version":"1.0.0"}"#).unwrap();
        fs::write(root.join("index.js"), "").unwrap();
        symlink(&shared, root.join("lib")).unwrap();
        symlink(shared.join("util.js"), root.join("util.js")).unwrap();
        symlink(&root, root.join("self")).unwrap();
        symlink(root.join("missing"), root.join("dangling")).unwrap();

        let bytes = pack_directory(&root, Vec::new()).unwrap();

        assert_eq!(
            archive_paths(&bytes),
            vec![
                "package/index.js",
                "package/lib/util.js",
                "package/package.json",
                "package/util.js",
            ]
        );
    }

    #[tokio::test]
    async fn test_file_stream_is_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blob.tgz");
        let content: Vec<u8> = (0..(3 * CHUNK_SIZE + 17)).map(|i| (i % 251) as u8).collect();
        fs::write(&path, &content).unwrap();

        let stream = TarballStream::from_file(&path).unwrap();
        assert_eq!(stream.content_length(), Some(content.len() as u64));
        assert_eq!(
            format!("{stream:?}"),
            format!("TarballStream {{ content_length: Some({}), .. }}", content.len())
        );
        assert_eq!(collect(stream).await.unwrap(), content);
    }

    #[tokio::test]
    async fn test_directory_stream_unpacks_to_manifest() {
        let dir = sample_tree();
        let stream = TarballStream::from_directory(dir.path().to_path_buf());
        assert_eq!(stream.content_length(), None);

        let bytes = collect(stream).await.unwrap();
        let mut archive = tar::Archive::new(GzDecoder::new(bytes.as_slice()));
        let mut manifest = String::new();
        for entry in archive.entries().unwrap() {
            let mut entry = entry.unwrap();
            if entry.path().unwrap().ends_with("package.json") {
                entry.read_to_string(&mut manifest).unwrap();
            }
        }
        assert!(manifest.contains(r#""version":"2.0.0""#));
    }

    #[tokio::test]
    async fn test_missing_directory_fails_inside_stream() {
        let dir = tempfile::tempdir().unwrap();
        let stream = TarballStream::from_directory(dir.path().join("gone"));

        assert!(collect(stream).await.is_err());
    }

    #[test]
    fn test_missing_file_fails_up_front() {
        let dir = tempfile::tempdir().unwrap();
        assert!(TarballStream::from_file(&dir.path().join("gone.tgz")).is_err());
    }
}
