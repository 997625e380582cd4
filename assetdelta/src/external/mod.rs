//! External transforms: bundle extraction, container unpacking and codec
//! decoding.
//!
//! The formats involved are opaque to this crate. Each collaborator is a
//! trait so the pipeline can be driven by any tool; the provided
//! implementations shell out to a command line configured as a template:
//!
//! ```text
//! extractor         = unbundle --in {input} --out {output}
//! container_decoder = unpack-archive {input} -d {output}
//! codec_decoder     = decode-audio {input} -o {output} --key {key}
//! ```

mod command;
mod error;

use std::path::{Path, PathBuf};

pub use command::{CommandCodecDecoder, CommandContainerDecoder, CommandExtractor, CommandTemplate};
pub use error::{ExternalError, ExternalResult};

/// Expands raw bundle files into a directory tree.
pub trait BundleExtractor: Send + Sync {
    /// Extract every bundle found in `input_dir` into `output_dir`.
    fn extract(&self, input_dir: &Path, output_dir: &Path) -> ExternalResult<()>;
}

/// Unpacks a container file holding several encoded streams.
pub trait ContainerDecoder: Send + Sync {
    /// Unpack `container` into `output_dir`.
    fn unpack(&self, container: &Path, output_dir: &Path) -> ExternalResult<()>;
}

/// Decodes one encoded stream into a playable file.
pub trait CodecDecoder: Send + Sync {
    /// Decode `input`, optionally with a decryption key, and return the path
    /// of the decoded file.
    fn decode(&self, input: &Path, key: Option<&str>) -> ExternalResult<PathBuf>;
}
