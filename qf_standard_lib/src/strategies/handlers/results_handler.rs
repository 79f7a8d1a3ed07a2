use crate::standardized_types::enums::AlgorithmStatus;
use crate::standardized_types::new_types::Price;
use crate::standardized_types::orders::{Order, OrderEvent};
use log::{info, warn};
use rust_decimal::Decimal;
use serde_derive::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const RESULT_CHANNEL_CAPACITY: usize = 512;

#[derive(Clone, Serialize, Debug)]
pub struct ChartPoint {
    pub x: i64,
    pub y: Decimal,
}

#[derive(Clone, Serialize, Debug, Default)]
pub struct Series {
    pub name: String,
    pub values: Vec<ChartPoint>,
}

#[derive(Clone, Serialize, Debug, Default)]
pub struct Chart {
    pub name: String,
    pub series: Vec<Series>,
}

/// Final packaged run output: user plots, the order log and the summary
/// statistics the outside world renders.
#[derive(Clone, Serialize, Debug)]
pub struct BacktestResult {
    pub charts: Vec<Chart>,
    pub orders: Vec<Order>,
    pub profit_loss: Decimal,
    pub total_portfolio_value: Decimal,
    pub statistics: BTreeMap<String, String>,
    pub runtime_statistics: BTreeMap<String, String>,
}

/// Typed messages the core emits to the outside world, serialized as JSON
/// packets. The packet shapes are stable, everything downstream is opaque to
/// the engine.
#[derive(Clone, Serialize, Debug)]
#[serde(tag = "type")]
pub enum ResultPacket {
    AlgorithmStatus {
        algorithm_id: String,
        status: AlgorithmStatus,
        message: Option<String>,
    },
    Debug {
        message: String,
        toast: bool,
    },
    HandledError {
        message: String,
        stack_trace: String,
    },
    OrderEvent(OrderEvent),
    BacktestResult(BacktestResult),
}

/// Where serialized packets land. The default sink logs, tests capture.
pub trait ResultSink: Send {
    fn emit(&mut self, packet_json: String);
}

pub struct LogSink;

impl ResultSink for LogSink {
    fn emit(&mut self, packet_json: String) {
        info!("Result: {}", packet_json);
    }
}

/// Captures packets in memory, used by tests and embedders.
#[derive(Clone, Default)]
pub struct VecSink {
    pub packets: Arc<Mutex<Vec<String>>>,
}

impl ResultSink for VecSink {
    fn emit(&mut self, packet_json: String) {
        self.packets.lock().unwrap().push(packet_json);
    }
}

struct TokenBucket {
    tokens: f64,
    capacity: f64,
    per_second: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(per_hour: u32) -> Self {
        TokenBucket {
            tokens: per_hour as f64,
            capacity: per_hour as f64,
            per_second: per_hour as f64 / 3600.0,
            last_refill: Instant::now(),
        }
    }

    fn try_take(&mut self) -> bool {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.last_refill = now;
        self.tokens = (self.tokens + elapsed * self.per_second).min(self.capacity);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// The engine side of the result channel: non-blocking sends with a
/// warn-and-drop policy when the consumer falls behind. A drainer task
/// serializes packets, rate-limits notifications and writes to the sink.
#[derive(Clone)]
pub struct ResultsHandler {
    sender: mpsc::Sender<ResultPacket>,
}

impl ResultsHandler {
    /// Spawns the drainer task. Dropping every handler clone closes the
    /// channel and lets the task finish flushing.
    pub fn spawn(mut sink: Box<dyn ResultSink>, notification_rate_per_hour: u32) -> (Self, JoinHandle<()>) {
        let (sender, mut receiver) = mpsc::channel::<ResultPacket>(RESULT_CHANNEL_CAPACITY);
        let handle = tokio::spawn(async move {
            let mut bucket = TokenBucket::new(notification_rate_per_hour);
            while let Some(packet) = receiver.recv().await {
                if matches!(packet, ResultPacket::Debug { .. }) && !bucket.try_take() {
                    warn!("Result Handler: notification rate limit reached, dropping debug message");
                    continue;
                }
                match serde_json::to_string(&packet) {
                    Ok(json) => sink.emit(json),
                    Err(e) => warn!("Result Handler: cannot serialize packet: {}", e),
                }
            }
        });
        (ResultsHandler { sender }, handle)
    }

    fn send(&self, packet: ResultPacket) {
        if let Err(e) = self.sender.try_send(packet) {
            warn!("Result Handler: channel full, dropping packet: {}", e);
        }
    }

    pub fn algorithm_status(&self, algorithm_id: &str, status: AlgorithmStatus, message: Option<String>) {
        self.send(ResultPacket::AlgorithmStatus {
            algorithm_id: algorithm_id.to_string(),
            status,
            message,
        });
    }

    pub fn debug(&self, message: &str, toast: bool) {
        self.send(ResultPacket::Debug {
            message: message.to_string(),
            toast,
        });
    }

    pub fn handled_error(&self, message: &str, stack_trace: &str) {
        self.send(ResultPacket::HandledError {
            message: message.to_string(),
            stack_trace: stack_trace.to_string(),
        });
    }

    pub fn order_event(&self, event: &OrderEvent) {
        self.send(ResultPacket::OrderEvent(event.clone()));
    }

    pub fn backtest_result(&self, result: BacktestResult) {
        self.send(ResultPacket::BacktestResult(result));
    }
}

/// Accumulates user plots over the run, drained into the final result.
#[derive(Default)]
pub struct ChartCollector {
    charts: BTreeMap<String, BTreeMap<String, Vec<ChartPoint>>>,
}

impl ChartCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn plot(&mut self, chart: &str, series: &str, time_unix: i64, value: Price) {
        self.charts
            .entry(chart.to_string())
            .or_default()
            .entry(series.to_string())
            .or_default()
            .push(ChartPoint {
                x: time_unix,
                y: value,
            });
    }

    pub fn into_charts(self) -> Vec<Chart> {
        self.charts
            .into_iter()
            .map(|(name, series)| Chart {
                name,
                series: series
                    .into_iter()
                    .map(|(series_name, values)| Series {
                        name: series_name,
                        values,
                    })
                    .collect(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn packets_reach_the_sink_in_order() {
        let sink = VecSink::default();
        let packets = sink.packets.clone();
        let (handler, handle) = ResultsHandler::spawn(Box::new(sink), 30);

        handler.algorithm_status("algo-1", AlgorithmStatus::Running, None);
        handler.debug("hello", false);
        handler.handled_error("boom", "stack");
        drop(handler);
        handle.await.unwrap();

        let captured = packets.lock().unwrap();
        assert_eq!(captured.len(), 3);
        assert!(captured[0].contains("AlgorithmStatus"));
        assert!(captured[0].contains("Running"));
        assert!(captured[1].contains("hello"));
        assert!(captured[2].contains("HandledError"));
    }

    #[tokio::test]
    async fn debug_messages_are_rate_limited() {
        let sink = VecSink::default();
        let packets = sink.packets.clone();
        let (handler, handle) = ResultsHandler::spawn(Box::new(sink), 2);

        for i in 0..5 {
            handler.debug(&format!("message {}", i), false);
        }
        // Status packets bypass the notification limit.
        handler.algorithm_status("algo-1", AlgorithmStatus::Completed, None);
        drop(handler);
        handle.await.unwrap();

        let captured = packets.lock().unwrap();
        let debugs = captured.iter().filter(|p| p.contains("Debug")).count();
        assert_eq!(debugs, 2);
        assert!(captured.iter().any(|p| p.contains("Completed")));
    }

    #[test]
    fn chart_collector_groups_series() {
        let mut collector = ChartCollector::new();
        collector.plot("Strategy Equity", "Equity", 1, dec!(100_000));
        collector.plot("Strategy Equity", "Equity", 2, dec!(100_500));
        collector.plot("Strategy Equity", "Drawdown", 1, dec!(0));
        let charts = collector.into_charts();
        assert_eq!(charts.len(), 1);
        assert_eq!(charts[0].series.len(), 2);
        let equity = charts[0].series.iter().find(|s| s.name == "Equity").unwrap();
        assert_eq!(equity.values.len(), 2);
    }
}
