use crate::core::model::SegmentRange;

/// Split `[0, total)` into `count` contiguous ranges; the last one absorbs the
/// remainder of the integer division. Unknown size, no range support, an
/// empty resource or `count <= 1` all collapse to one whole-resource segment.
pub fn plan_segments(total: Option<u64>, supports_ranges: bool, count: usize) -> Vec<SegmentRange> {
    let total = match total {
        Some(t) if t > 0 => t,
        _ => return vec![SegmentRange { index: 0, start: 0, end: None }],
    };

    if !supports_ranges || count <= 1 {
        return vec![SegmentRange { index: 0, start: 0, end: Some(total - 1) }];
    }

    // never more segments than bytes
    let count = (count as u64).min(total);
    let base = total / count;

    let mut segs = Vec::with_capacity(count as usize);
    let mut offset = 0u64;
    for i in 0..count {
        let end = if i == count - 1 { total - 1 } else { offset + base - 1 };
        segs.push(SegmentRange { index: i as usize, start: offset, end: Some(end) });
        offset = end + 1;
    }
    segs
}
