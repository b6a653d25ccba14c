//! Mock market-data source
//!
//! Random-walks a mid price per symbol, maintains ten synthetic book
//! levels, and emits L1/L2/trade events at configurable per-type rates
//! from a ~1 kHz generation loop. Every 15 seconds it bursts at 10x for
//! one second to exercise downstream backpressure.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use crossfire::TrySendError;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use spine_metrics::{Counter, MetricsCollector};
use tokio_util::sync::CancellationToken;

use crate::{Aggressor, FeedHandle, FeedSource, RawEvent, RawEventTx, RawL1, RawL2, RawTrade};

/// Generation loop tick
const TICK: Duration = Duration::from_millis(1);

/// Book depth maintained per symbol
const BOOK_LEVELS: usize = 10;

/// Burst cadence and length
const BURST_EVERY: Duration = Duration::from_secs(15);
const BURST_FOR: Duration = Duration::from_secs(1);
const BURST_MULTIPLIER: u32 = 10;

/// Mock feed configuration
#[derive(Debug, Clone)]
pub struct MockFeedConfig {
    pub symbols: Vec<String>,
    pub l1_per_sec: u32,
    pub l2_per_sec: u32,
    pub trades_per_sec: u32,
}

impl Default for MockFeedConfig {
    fn default() -> Self {
        Self {
            symbols: vec!["BTCUSDT".into(), "ETHUSDT".into(), "SOLUSDT".into()],
            l1_per_sec: 50_000,
            l2_per_sec: 30_000,
            trades_per_sec: 5_000,
        }
    }
}

/// Live-adjustable per-type rates (events per second)
#[derive(Debug)]
pub struct RateControl {
    l1: AtomicU32,
    l2: AtomicU32,
    trades: AtomicU32,
}

impl RateControl {
    fn new(config: &MockFeedConfig) -> Self {
        Self {
            l1: AtomicU32::new(config.l1_per_sec),
            l2: AtomicU32::new(config.l2_per_sec),
            trades: AtomicU32::new(config.trades_per_sec),
        }
    }

    /// Replace all three rates at once
    pub fn set(&self, l1_per_sec: u32, l2_per_sec: u32, trades_per_sec: u32) {
        self.l1.store(l1_per_sec, Ordering::Relaxed);
        self.l2.store(l2_per_sec, Ordering::Relaxed);
        self.trades.store(trades_per_sec, Ordering::Relaxed);
        tracing::info!(
            l1 = l1_per_sec,
            l2 = l2_per_sec,
            trades = trades_per_sec,
            "mock feed rates updated"
        );
    }

    fn load(&self) -> (u32, u32, u32) {
        (
            self.l1.load(Ordering::Relaxed),
            self.l2.load(Ordering::Relaxed),
            self.trades.load(Ordering::Relaxed),
        )
    }
}

/// Cumulative event counts
#[derive(Debug, Default)]
pub struct MockFeedStats {
    pub l1_events: AtomicU64,
    pub l2_events: AtomicU64,
    pub trade_events: AtomicU64,
    pub queue_drops: AtomicU64,
}

impl MockFeedStats {
    pub fn total(&self) -> u64 {
        self.l1_events.load(Ordering::Relaxed)
            + self.l2_events.load(Ordering::Relaxed)
            + self.trade_events.load(Ordering::Relaxed)
    }
}

struct SymbolState {
    name: String,
    mid: f64,
    spread: f64,
    bids: Vec<(f64, f64)>,
    asks: Vec<(f64, f64)>,
    seq: u64,
    rng: StdRng,
}

impl SymbolState {
    fn new(name: String, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let mid = 100.0;
        let spread = 0.01;

        let mut bids = Vec::with_capacity(BOOK_LEVELS);
        let mut asks = Vec::with_capacity(BOOK_LEVELS);
        for level in 0..BOOK_LEVELS {
            let offset = level as f64 * 0.01;
            let size = exp_sample(&mut rng) * 100.0;
            bids.push((mid - spread / 2.0 - offset, size));
            asks.push((mid + spread / 2.0 + offset, size));
        }

        Self {
            name,
            mid,
            spread,
            bids,
            asks,
            seq: 1,
            rng,
        }
    }

    fn next_seq(&mut self) -> u64 {
        let seq = self.seq;
        self.seq += 1;
        seq
    }
}

/// Unit-mean exponential sample via inversion
fn exp_sample(rng: &mut StdRng) -> f64 {
    let u: f64 = rng.gen_range(f64::EPSILON..1.0);
    -u.ln()
}

/// The built-in random-walk source
pub struct MockFeed {
    config: MockFeedConfig,
    tx: RawEventTx,
    stats: Arc<MockFeedStats>,
    rates: Arc<RateControl>,
    events_counter: Arc<Counter>,
    drops_counter: Arc<Counter>,
}

impl MockFeed {
    pub fn new(config: MockFeedConfig, tx: RawEventTx, metrics: &MetricsCollector) -> Self {
        let rates = Arc::new(RateControl::new(&config));
        Self {
            config,
            tx,
            stats: Arc::new(MockFeedStats::default()),
            rates,
            events_counter: metrics.counter("feed_events_total"),
            drops_counter: metrics.counter("feed_queue_drops_total"),
        }
    }

    /// Shared stats handle, valid after `start()` consumes the feed
    pub fn stats(&self) -> Arc<MockFeedStats> {
        Arc::clone(&self.stats)
    }

    /// Live rate control handle
    pub fn rate_control(&self) -> Arc<RateControl> {
        Arc::clone(&self.rates)
    }

    async fn run(self, token: CancellationToken) {
        let mut states: Vec<SymbolState> = self
            .config
            .symbols
            .iter()
            .enumerate()
            .map(|(i, name)| SymbolState::new(name.clone(), 12_345 + i as u64))
            .collect();

        if states.is_empty() {
            tracing::warn!("mock feed has no symbols, exiting");
            return;
        }

        tracing::info!(symbols = states.len(), "mock feed started");

        // Fractional events carried between ticks so low rates still emit
        let mut l1_carry = 0.0f64;
        let mut l2_carry = 0.0f64;
        let mut trade_carry = 0.0f64;

        let started = Instant::now();
        let mut last_burst = Instant::now();
        let mut burst_until: Option<Instant> = None;
        let mut last_stats = Instant::now();
        let mut round_robin = 0usize;

        loop {
            if token.is_cancelled() {
                break;
            }

            let now = Instant::now();
            if now.duration_since(last_burst) >= BURST_EVERY {
                burst_until = Some(now + BURST_FOR);
                last_burst = now;
            }
            let bursting = burst_until.map_or(false, |until| now < until);
            let multiplier = if bursting { BURST_MULTIPLIER } else { 1 };

            let (l1_rate, l2_rate, trade_rate) = self.rates.load();
            let tick_secs = TICK.as_secs_f64();

            l1_carry += f64::from(l1_rate * multiplier) * tick_secs;
            l2_carry += f64::from(l2_rate * multiplier) * tick_secs;
            trade_carry += f64::from(trade_rate * multiplier) * tick_secs;

            let l1_now = l1_carry as u32;
            let l2_now = l2_carry as u32;
            let trades_now = trade_carry as u32;
            l1_carry -= f64::from(l1_now);
            l2_carry -= f64::from(l2_now);
            trade_carry -= f64::from(trades_now);

            let states_len = states.len();
            for _ in 0..l1_now {
                let state = &mut states[round_robin % states_len];
                round_robin = round_robin.wrapping_add(1);
                let event = gen_l1(state);
                self.emit(event, &self.stats.l1_events);
            }
            for _ in 0..l2_now {
                let state = &mut states[round_robin % states_len];
                round_robin = round_robin.wrapping_add(1);
                let event = gen_l2(state);
                self.emit(event, &self.stats.l2_events);
            }
            for _ in 0..trades_now {
                let state = &mut states[round_robin % states_len];
                round_robin = round_robin.wrapping_add(1);
                let event = gen_trade(state);
                self.emit(event, &self.stats.trade_events);
            }

            if now.duration_since(last_stats) >= Duration::from_secs(5) {
                tracing::debug!(
                    l1 = self.stats.l1_events.load(Ordering::Relaxed),
                    l2 = self.stats.l2_events.load(Ordering::Relaxed),
                    trades = self.stats.trade_events.load(Ordering::Relaxed),
                    drops = self.stats.queue_drops.load(Ordering::Relaxed),
                    bursting,
                    uptime_s = started.elapsed().as_secs(),
                    "mock feed stats"
                );
                last_stats = now;
            }

            tokio::select! {
                _ = tokio::time::sleep(TICK) => {}
                _ = token.cancelled() => break,
            }
        }

        tracing::info!(events = self.stats.total(), "mock feed stopped");
    }

    fn emit(&self, event: RawEvent, stat: &AtomicU64) {
        match self.tx.try_send(event) {
            Ok(()) => {
                stat.fetch_add(1, Ordering::Relaxed);
                self.events_counter.inc();
            }
            Err(TrySendError::Full(_)) => {
                self.stats.queue_drops.fetch_add(1, Ordering::Relaxed);
                self.drops_counter.inc();
            }
            Err(TrySendError::Disconnected(_)) => {}
        }
    }
}

impl FeedSource for MockFeed {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn start(self: Box<Self>) -> FeedHandle {
        let token = CancellationToken::new();
        let child = token.clone();
        let join = tokio::spawn(async move { self.run(child).await });
        FeedHandle::new("mock", token, join)
    }
}

fn now_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

fn gen_l1(state: &mut SymbolState) -> RawEvent {
    let walk = (state.rng.gen::<f64>() - 0.5) * 0.002 * state.mid;
    state.mid = (state.mid + walk).max(0.01);
    state.spread = (0.01 + walk.abs() * 10.0).max(0.001);

    let bid_price = state.mid - state.spread / 2.0;
    let ask_price = state.mid + state.spread / 2.0;
    let bid_size = exp_sample(&mut state.rng) * 1_000.0;
    let ask_size = exp_sample(&mut state.rng) * 1_000.0;

    state.bids[0] = (bid_price, bid_size);
    state.asks[0] = (ask_price, ask_size);

    RawEvent::L1(RawL1 {
        symbol: state.name.clone(),
        ts_ns: now_ns(),
        seq: state.next_seq(),
        bid_price,
        bid_size,
        ask_price,
        ask_size,
    })
}

fn gen_l2(state: &mut SymbolState) -> RawEvent {
    use spine_protocol::{BookAction, Side};

    let level = state.rng.gen_range(0..BOOK_LEVELS as u16);
    let side = if state.rng.gen_bool(0.5) {
        Side::Bid
    } else {
        Side::Ask
    };

    // 80% update, 15% insert, 5% delete
    let roll = state.rng.gen_range(0..100u32);
    let action = if roll < 80 {
        BookAction::Update
    } else if roll < 95 {
        BookAction::Insert
    } else {
        BookAction::Delete
    };

    let levels = match side {
        Side::Bid => &mut state.bids,
        Side::Ask => &mut state.asks,
    };
    let slot = level as usize;

    let (price, size) = if action == BookAction::Delete {
        (levels[slot].0, 0.0)
    } else {
        let base = match side {
            Side::Bid => state.mid - state.spread / 2.0 - f64::from(level) * 0.01,
            Side::Ask => state.mid + state.spread / 2.0 + f64::from(level) * 0.01,
        };
        let price = base + (state.rng.gen::<f64>() - 0.5) * 0.002;
        let size = exp_sample(&mut state.rng) * 500.0;
        levels[slot] = (price, size);
        (price, size)
    };

    RawEvent::L2(RawL2 {
        symbol: state.name.clone(),
        ts_ns: now_ns(),
        seq: state.next_seq(),
        side,
        action,
        level,
        price,
        size,
    })
}

fn gen_trade(state: &mut SymbolState) -> RawEvent {
    let price = state.mid + (state.rng.gen::<f64>() - 0.5) * 0.001 * state.mid;
    let size = exp_sample(&mut state.rng) * 100.0;
    let aggressor = if state.rng.gen_bool(0.5) {
        Aggressor::Buy
    } else {
        Aggressor::Sell
    };

    RawEvent::Trade(RawTrade {
        symbol: state.name.clone(),
        ts_ns: now_ns(),
        seq: state.next_seq(),
        price,
        size,
        aggressor,
    })
}

#[cfg(test)]
#[path = "mock_test.rs"]
mod tests;
