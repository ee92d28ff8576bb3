//! Writable destinations for `redirect` and `append`.

use std::path::{Path, PathBuf};

use tokio::fs::File;
use tokio::io::AsyncWrite;

use crate::tee::SinkWriter;

/// Where a chain's final output goes: a filesystem path, a pre-opened
/// file, or any boxed byte sink.
///
/// Paths are opened by the stream pump (truncate mode for `redirect`,
/// append mode for `append`), so attaching never blocks the caller.
/// Pre-opened handles are used as-is; their mode is whatever they were
/// opened with.
pub struct SinkTarget {
    kind: TargetKind,
    label: String,
}

enum TargetKind {
    Path(PathBuf),
    Writer(SinkWriter),
}

impl SinkTarget {
    /// Redirect into an arbitrary byte sink. The label appears as the
    /// destination in the chain report.
    pub fn writer(
        label: impl Into<String>,
        writer: impl AsyncWrite + Send + Unpin + 'static,
    ) -> Self {
        Self {
            kind: TargetKind::Writer(SinkWriter::Ready(Box::new(writer))),
            label: label.into(),
        }
    }

    pub(crate) fn into_writer(self, append: bool) -> (SinkWriter, String) {
        match self.kind {
            TargetKind::Path(path) => (SinkWriter::PendingFile { path, append }, self.label),
            TargetKind::Writer(writer) => (writer, self.label),
        }
    }
}

impl From<&Path> for SinkTarget {
    fn from(path: &Path) -> Self {
        Self {
            kind: TargetKind::Path(path.to_path_buf()),
            label: path.display().to_string(),
        }
    }
}

impl From<PathBuf> for SinkTarget {
    fn from(path: PathBuf) -> Self {
        SinkTarget::from(path.as_path())
    }
}

impl From<&str> for SinkTarget {
    fn from(path: &str) -> Self {
        SinkTarget::from(Path::new(path))
    }
}

impl From<String> for SinkTarget {
    fn from(path: String) -> Self {
        SinkTarget::from(Path::new(&path))
    }
}

impl From<File> for SinkTarget {
    fn from(file: File) -> Self {
        Self {
            kind: TargetKind::Writer(SinkWriter::Ready(Box::new(file))),
            label: "<file>".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_targets_are_labeled_by_path() {
        let target = SinkTarget::from("/tmp/out.txt");
        let (writer, label) = target.into_writer(false);
        assert_eq!(label, "/tmp/out.txt");
        assert!(matches!(
            writer,
            SinkWriter::PendingFile { append: false, .. }
        ));
    }

    #[test]
    fn append_mode_flows_through() {
        let (writer, _) = SinkTarget::from(PathBuf::from("log.txt")).into_writer(true);
        assert!(matches!(writer, SinkWriter::PendingFile { append: true, .. }));
    }

    #[test]
    fn writer_targets_keep_their_label() {
        let target = SinkTarget::writer("memory", tokio::io::sink());
        let (writer, label) = target.into_writer(false);
        assert_eq!(label, "memory");
        assert!(matches!(writer, SinkWriter::Ready(_)));
    }
}
