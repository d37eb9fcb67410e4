/// Split `targets` into `min(workers, len)` contiguous chunks whose sizes
/// differ by at most one, earlier chunks taking the remainder. Order is
/// preserved; no chunk is empty.
pub fn partition<T: Clone>(targets: &[T], workers: usize) -> Vec<Vec<T>> {
    if targets.is_empty() {
        return Vec::new();
    }
    let chunks = workers.clamp(1, targets.len());
    let base = targets.len() / chunks;
    let extra = targets.len() % chunks;

    let mut out = Vec::with_capacity(chunks);
    let mut start = 0;
    for i in 0..chunks {
        let size = base + usize::from(i < extra);
        out.push(targets[start..start + size].to_vec());
        start += size;
    }
    out
}
