/// Concurrency used per available CPU when `MAX_CONCURRENT_REQUESTS` is not set.
const CONCURRENT_REQUESTS_PER_CPU: usize = 64;

/// Maximum amount of in-flight hits of an attack,
/// from `MAX_CONCURRENT_REQUESTS` or derived from the available parallelism.
pub fn compute_concurrent_request_count() -> usize {
    concurrent_request_count(
        std::env::var("MAX_CONCURRENT_REQUESTS").ok().as_deref(),
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1),
    )
}

fn concurrent_request_count(value: Option<&str>, cpus: usize) -> usize {
    value
        .and_then(|v| v.trim().parse().ok())
        .filter(|n| *n > 0)
        .unwrap_or(cpus * CONCURRENT_REQUESTS_PER_CPU)
}
