//! Begin/end logging around named container activities.

use std::fmt::Display;
use std::future::Future;
use tracing::Instrument;

/// Run `fut` as the activity `activity` for `container_id`.
///
/// Logs the start of the activity, then its outcome: `result = "Success"`
/// at info level, or `result = "Error"` with the error at error level.
/// The future runs inside an `activity` span so nested logs carry the same
/// fields.
pub async fn run_activity<F, T, E>(activity: &'static str, container_id: &str, fut: F) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
    E: Display,
{
    let span = tracing::info_span!("activity", activity, container_id);
    let start = std::time::Instant::now();
    tracing::info!(parent: &span, activity, container_id, "begin");

    let result = fut.instrument(span.clone()).await;

    let elapsed_ms = start.elapsed().as_millis() as u64;
    match &result {
        Ok(_) => {
            tracing::info!(parent: &span, activity, result = "Success", elapsed_ms, "end");
        }
        Err(e) => {
            tracing::error!(
                parent: &span,
                activity,
                result = "Error",
                error = %e,
                elapsed_ms,
                "end"
            );
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_passes_through_success() {
        let result: Result<u32, String> = run_activity("Create", "c1", async { Ok(7) }).await;
        assert_eq!(result, Ok(7));
    }

    #[tokio::test]
    async fn test_passes_through_error() {
        let result: Result<(), String> =
            run_activity("Delete", "c1", async { Err("boom".to_string()) }).await;
        assert_eq!(result, Err("boom".to_string()));
    }
}
