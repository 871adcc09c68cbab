use anyhow::{Context, Result};
use rayon::ThreadPoolBuilder;

pub fn run_in_pool<T, F>(cores: Option<usize>, context: &'static str, f: F) -> Result<T>
where
    F: FnOnce() -> T + Send,
    T: Send,
{
    if let Some(cores) = cores {
        let pool = ThreadPoolBuilder::new()
            .num_threads(cores)
            .build()
            .context(context)?;
        Ok(pool.install(f))
    } else {
        Ok(f())
    }
}
