/// One far-end/near-end frame pair, decoded and index-stamped by the reader
/// stage. Both signals carry exactly the configured samples-per-frame.
#[derive(Debug, Clone)]
pub struct FramePair {
    /// Zero-based frame index; pairs flow through the pipeline in strict
    /// index order.
    pub index: u64,
    /// Reference signal (what was played out of the loudspeaker).
    pub far_end: Vec<i16>,
    /// Captured signal, potentially containing echo of the far end.
    pub near_end: Vec<i16>,
}

/// One cancelled output frame, same length as its near-end input.
#[derive(Debug, Clone)]
pub struct CleanFrame {
    pub index: u64,
    pub samples: Vec<i16>,
}
