//! Platform layer for named POSIX segments.

mod linux;

pub use linux::{MappedSegment, current_pid, open_segment, posix_name, unlink_segment};
