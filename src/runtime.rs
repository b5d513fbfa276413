use std::io;
use tokio::runtime::{Builder, Runtime};

/// Worker stack size. An snmp2 session keeps its 64 KiB receive buffer
/// inline and copies it along the get path; unoptimized builds overflow
/// the 2 MiB default.
pub const WORKER_STACK_SIZE: usize = 8 << 20;

pub fn build() -> io::Result<Runtime> {
    Builder::new_multi_thread()
        .enable_all()
        .thread_stack_size(WORKER_STACK_SIZE)
        .build()
}

/// Runs `fut` on a fresh daemon-shaped runtime from a thread with the same
/// stack size as its workers.
#[cfg(test)]
pub(crate) fn block_on<F>(fut: F) -> F::Output
where
    F: std::future::Future + Send + 'static,
    F::Output: Send + 'static,
{
    std::thread::Builder::new()
        .stack_size(WORKER_STACK_SIZE)
        .spawn(move || build().expect("runtime").block_on(fut))
        .expect("spawn test thread")
        .join()
        .unwrap_or_else(|panic| std::panic::resume_unwind(panic))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spawned_tasks_get_large_stacks() {
        let sum = block_on(async {
            tokio::spawn(async {
                // larger than the 2 MiB default
                let buf = [1u8; 3 << 20];
                std::hint::black_box(&buf).iter().map(|b| *b as u64).sum::<u64>()
            })
            .await
            .unwrap()
        });
        assert_eq!(sum, 3 << 20);
    }
}
