//! Reassembly of files split into numbered segments.
//!
//! Uploads occasionally split large artifacts into parts. This module finds
//! those parts by name, checks the ordinal sequence, and concatenates them
//! back into the original file, all-or-nothing per group.

mod error;
mod naming;
mod reassembler;

pub use error::{SegmentError, SegmentResult};
pub use naming::{parse_segment_name, SegmentName};
pub use reassembler::{
    merge_group, reassemble, scan_groups, MergedFile, ReassemblyOptions, ReassemblyReport,
    SegmentGroup,
};
