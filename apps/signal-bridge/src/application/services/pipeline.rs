//! Signal Pipeline
//!
//! Turns each received trade signal into exactly one [`TradeResult`]:
//! validate, call the order executor once, wrap the outcome. Execution runs
//! on its own task so a slow broker never blocks the session's message loop.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::application::ports::OrderExecutor;
use crate::domain::signal::{TradeResult, TradeSignal};
use crate::infrastructure::metrics;

/// Dispatches signals to the executor and forwards results to the session.
#[derive(Clone)]
pub struct SignalPipeline {
    executor: Arc<dyn OrderExecutor>,
    results_tx: mpsc::Sender<TradeResult>,
}

impl SignalPipeline {
    /// Create a pipeline that reports results on `results_tx`.
    #[must_use]
    pub fn new(executor: Arc<dyn OrderExecutor>, results_tx: mpsc::Sender<TradeResult>) -> Self {
        Self {
            executor,
            results_tx,
        }
    }

    /// Execute `signal` in the background.
    ///
    /// The returned handle completes once the result has been handed to the
    /// results channel.
    pub fn dispatch(&self, signal: TradeSignal) -> JoinHandle<()> {
        let executor = Arc::clone(&self.executor);
        let results_tx = self.results_tx.clone();

        tokio::spawn(async move {
            let result = execute_signal(executor, signal).await;
            if results_tx.send(result).await.is_err() {
                tracing::warn!("Result channel closed, trade result discarded");
            }
        })
    }
}

impl std::fmt::Debug for SignalPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalPipeline").finish_non_exhaustive()
    }
}

/// Execute one signal and build its result.
///
/// Invalid signals fail without reaching the executor. A panicking executor
/// still yields a failed result.
pub async fn execute_signal(executor: Arc<dyn OrderExecutor>, signal: TradeSignal) -> TradeResult {
    if let Err(e) = signal.validate() {
        tracing::warn!(
            symbol = %signal.symbol,
            pair_id = signal.pair_id,
            error = %e,
            "Rejecting invalid trade signal"
        );
        return TradeResult::failed(signal, e.to_string());
    }

    tracing::info!(
        action = %signal.action,
        symbol = %signal.symbol,
        quantity = %signal.quantity,
        order_type = signal.order_type.as_str(),
        pair_id = signal.pair_id,
        "Executing trade signal"
    );

    let started = Instant::now();
    let task_signal = signal.clone();
    let outcome = tokio::spawn(async move { executor.execute(&task_signal).await }).await;
    metrics::record_execution_duration(started.elapsed());

    match outcome {
        Ok(Ok(order)) => {
            tracing::info!(order_id = %order.id, status = %order.status, "Order placed");
            TradeResult::placed(signal, order.id)
        }
        Ok(Err(e)) => {
            tracing::warn!(symbol = %signal.symbol, error = %e, "Order execution failed");
            TradeResult::failed(signal, e.message())
        }
        Err(join_error) => {
            tracing::error!(error = %join_error, "Order execution task aborted");
            TradeResult::failed(signal, format!("execution task failed: {join_error}"))
        }
    }
}
