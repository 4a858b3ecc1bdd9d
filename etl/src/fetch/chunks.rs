use std::ops::Range;

/// Splits pages `1..=page_count` into contiguous chunks that are fetched one after another.
///
/// Up to `threshold` pages form a single chunk. Above it, the number of break points is
/// `ceil(page_count ^ (1 - ln(threshold) / ln(page_count)))`, spread evenly over
/// `[1, page_count + 1]`, so the chunk count grows slowly with the page count. The returned
/// ranges are half-open, never empty, and cover every page exactly once.
pub fn chunk_pages(page_count: u32, threshold: u32) -> Vec<Range<u32>> {
    if page_count == 0 {
        return Vec::new();
    }

    let end = page_count + 1;
    if page_count <= threshold || threshold < 2 {
        return vec![1..end];
    }

    let exponent = 1.0 - (threshold as f64).ln() / (page_count as f64).ln();
    let breaks = ((page_count as f64).powf(exponent).ceil() as u64).max(2);

    let span = u64::from(page_count);
    let points: Vec<u32> = (0..breaks)
        .map(|i| 1 + (i * span / (breaks - 1)) as u32)
        .collect();

    points
        .windows(2)
        .map(|pair| pair[0]..pair[1])
        .filter(|range| !range.is_empty())
        .collect()
}
