//! Dual-RPC hedged reads.
//!
//! Issues a read to the primary RPC immediately and, if it hasn't
//! completed after a delay, fires the same call at a secondary endpoint
//! via `tokio::select!` racing, returning whichever resolves first.

use std::future::Future;
use std::time::Duration;
use tracing::{instrument, warn};

#[derive(Debug, Clone)]
pub struct HedgedProviderConfig {
    pub primary_url: String,
    pub secondary_url: String,
    pub hedge_delay_ms: u64,
}

/// Issues a call to the primary endpoint immediately; after
/// `hedge_delay_ms` without completion also issues it to the secondary.
/// Returns the first successful result; the loser is ignored
/// (best-effort cancellation — its task is simply dropped).
pub struct HedgedProvider {
    config: HedgedProviderConfig,
}

#[derive(Debug, thiserror::Error)]
#[error("hedged call '{op_name}' failed on both endpoints: primary={primary}, secondary={secondary:?}")]
pub struct HedgedError {
    pub op_name: String,
    pub primary: String,
    pub secondary: Option<String>,
}

impl HedgedProvider {
    pub fn new(config: HedgedProviderConfig) -> Self {
        Self { config }
    }

    /// `fn_for_url` is invoked once per endpoint with that endpoint's URL.
    #[instrument(skip(self, fn_for_url), fields(op = op_name))]
    pub async fn hedged_call<T, E, F, Fut>(&self, op_name: &str, fn_for_url: F) -> Result<T, HedgedError>
    where
        T: Send + 'static,
        E: ToString + Send + 'static,
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let fn_for_url = std::sync::Arc::new(fn_for_url);

        let primary_fn = fn_for_url.clone();
        let primary_url = self.config.primary_url.clone();
        let mut primary = tokio::spawn(async move { primary_fn(primary_url).await });

        let delay = tokio::time::sleep(Duration::from_millis(self.config.hedge_delay_ms));
        tokio::pin!(delay);

        tokio::select! {
            result = &mut primary => {
                match result {
                    Ok(Ok(v)) => return Ok(v),
                    Ok(Err(e)) => {
                        // Primary failed before the hedge window elapsed;
                        // fall through to try secondary immediately.
                        return self.try_secondary(op_name, fn_for_url, e.to_string()).await;
                    }
                    Err(_join_err) => {
                        return self.try_secondary(op_name, fn_for_url, "primary task panicked".to_string()).await;
                    }
                }
            }
            _ = &mut delay => {
                warn!(op = op_name, "hedge delay elapsed without primary completion, firing secondary");
            }
        }

        let secondary_fn = fn_for_url.clone();
        let secondary_url = self.config.secondary_url.clone();
        let secondary = tokio::spawn(async move { secondary_fn(secondary_url).await });
        tokio::pin!(secondary);

        tokio::select! {
            result = &mut primary => {
                match result {
                    Ok(Ok(v)) => Ok(v),
                    _ => {
                        match secondary.await {
                            Ok(Ok(v)) => Ok(v),
                            Ok(Err(e)) => Err(HedgedError {
                                op_name: op_name.to_string(),
                                primary: "primary failed".to_string(),
                                secondary: Some(e.to_string()),
                            }),
                            Err(_) => Err(HedgedError {
                                op_name: op_name.to_string(),
                                primary: "primary failed".to_string(),
                                secondary: Some("secondary task panicked".to_string()),
                            }),
                        }
                    }
                }
            }
            result = &mut secondary => {
                match result {
                    Ok(Ok(v)) => Ok(v),
                    _ => {
                        match primary.await {
                            Ok(Ok(v)) => Ok(v),
                            Ok(Err(e)) => Err(HedgedError {
                                op_name: op_name.to_string(),
                                primary: e.to_string(),
                                secondary: Some("secondary failed".to_string()),
                            }),
                            Err(_) => Err(HedgedError {
                                op_name: op_name.to_string(),
                                primary: "primary task panicked".to_string(),
                                secondary: Some("secondary failed".to_string()),
                            }),
                        }
                    }
                }
            }
        }
    }

    async fn try_secondary<T, E, F, Fut>(
        &self,
        op_name: &str,
        fn_for_url: std::sync::Arc<F>,
        primary_error: String,
    ) -> Result<T, HedgedError>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: ToString,
    {
        match fn_for_url(self.config.secondary_url.clone()).await {
            Ok(v) => Ok(v),
            Err(e) => Err(HedgedError {
                op_name: op_name.to_string(),
                primary: primary_error,
                secondary: Some(e.to_string()),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn cfg() -> HedgedProviderConfig {
        HedgedProviderConfig {
            primary_url: "http://primary".to_string(),
            secondary_url: "http://secondary".to_string(),
            hedge_delay_ms: 20,
        }
    }

    #[tokio::test]
    async fn returns_first_success_and_ignores_loser() {
        let hedged = HedgedProvider::new(cfg());
        let secondary_calls = Arc::new(AtomicU32::new(0));
        let secondary_calls_clone = secondary_calls.clone();

        let result = hedged
            .hedged_call::<u32, String, _, _>("get_block", move |url| {
                let secondary_calls = secondary_calls_clone.clone();
                async move {
                    if url == "http://primary" {
                        Ok::<u32, String>(42)
                    } else {
                        secondary_calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        Ok::<u32, String>(99)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn fires_secondary_after_delay_and_returns_it() {
        let hedged = HedgedProvider::new(cfg());
        let result = hedged
            .hedged_call::<u32, String, _, _>("get_block", |url| async move {
                if url == "http://primary" {
                    tokio::time::sleep(Duration::from_millis(200)).await;
                    Ok::<u32, String>(1)
                } else {
                    Ok::<u32, String>(2)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 2);
    }

    #[tokio::test]
    async fn both_failing_returns_aggregate_error() {
        let hedged = HedgedProvider::new(cfg());
        let result = hedged
            .hedged_call::<u32, String, _, _>("get_block", |_url| async move {
                Err::<u32, String>("boom".to_string())
            })
            .await;

        assert!(result.is_err());
    }
}
