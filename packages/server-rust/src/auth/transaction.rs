//! Explicit transactional blocks.
//!
//! [`transactional`] opens a transaction, runs the enclosed operations with a
//! context bound to it, commits on success, and rolls back on failure. A call
//! made with a context that already carries a transaction joins it instead of
//! opening a new one.

use std::future::Future;

use gaekit_core::{RequestContext, TransactionManager};
use tracing::{debug, warn};

/// Runs `f` inside a transaction managed by `manager`.
///
/// # Errors
///
/// Returns `f`'s error after rolling back, or the manager's error if the
/// transaction cannot be opened or committed. A failed rollback is logged and
/// does not replace `f`'s error.
pub async fn transactional<T, E, F, Fut>(
    manager: &dyn TransactionManager,
    ctx: &RequestContext,
    f: F,
) -> Result<T, E>
where
    F: FnOnce(RequestContext) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: From<anyhow::Error>,
{
    if ctx.transaction.is_some() {
        return f(ctx.clone()).await;
    }

    let tx = manager.begin(ctx).await?;
    debug!(tx = tx.0, scope_id = ctx.scope.id(), "transaction opened");

    match f(ctx.with_transaction(tx)).await {
        Ok(value) => {
            manager.commit(tx).await?;
            debug!(tx = tx.0, "transaction committed");
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = manager.rollback(tx).await {
                warn!(tx = tx.0, error = %rollback_err, "transaction rollback failed");
            }
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use gaekit_core::TransactionId;

    use super::*;
    use crate::auth::memory::{RecordingTransactions, TransactionEvent};

    #[tokio::test]
    async fn commits_on_success() {
        let manager = RecordingTransactions::new();
        let ctx = RequestContext::default();

        let seen = transactional(&manager, &ctx, |tx_ctx| async move {
            Ok::<_, anyhow::Error>(tx_ctx.transaction)
        })
        .await
        .unwrap();

        assert_eq!(seen, Some(TransactionId(1)));
        assert_eq!(
            manager.events(),
            vec![
                TransactionEvent::Begin(TransactionId(1)),
                TransactionEvent::Commit(TransactionId(1)),
            ]
        );
    }

    #[tokio::test]
    async fn rolls_back_and_returns_original_error() {
        let manager = RecordingTransactions::new();
        let ctx = RequestContext::default();

        let err = transactional(&manager, &ctx, |_| async {
            Err::<(), _>(anyhow::anyhow!("write failed"))
        })
        .await
        .unwrap_err();

        assert_eq!(err.to_string(), "write failed");
        assert_eq!(
            manager.events(),
            vec![
                TransactionEvent::Begin(TransactionId(1)),
                TransactionEvent::Rollback(TransactionId(1)),
            ]
        );
    }

    #[tokio::test]
    async fn nested_block_joins_outer_transaction() {
        let manager = RecordingTransactions::new();
        let ctx = RequestContext::default();

        transactional(&manager, &ctx, |outer| {
            let manager = &manager;
            async move {
                transactional(manager, &outer, |inner| async move {
                    assert_eq!(inner.transaction, Some(TransactionId(1)));
                    Ok::<_, anyhow::Error>(())
                })
                .await
            }
        })
        .await
        .unwrap();

        assert_eq!(manager.events().len(), 2);
    }

    #[tokio::test]
    async fn begin_failure_skips_block() {
        let manager = RecordingTransactions::failing_begin();
        let ctx = RequestContext::default();
        let mut ran = false;

        let result = transactional(&manager, &ctx, |_| {
            ran = true;
            async { Ok::<_, anyhow::Error>(()) }
        })
        .await;

        assert!(result.is_err());
        assert!(!ran);
    }
}
