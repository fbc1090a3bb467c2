use super::statistic::{TotalsSnapshot, TOTALS};

use actix::{Actor, AsyncContext, Context, Handler};

use std::time::{Duration, Instant};

use tracing::{info, trace};

/// Process-wide throughput, per second.
#[derive(Debug, Clone, Copy, Default, PartialEq, MessageResponse)]
pub struct Rates {
    pub sent_bytes: f64,
    pub received_bytes: f64,
    pub sent_messages: f64,
    pub received_messages: f64,
}

impl Rates {
    pub fn between(previous: &TotalsSnapshot, current: &TotalsSnapshot, elapsed: Duration) -> Rates {
        let secs = elapsed.as_secs_f64();
        if secs <= 0.0 {
            return Rates::default();
        }
        let rate = |before: u64, after: u64| after.saturating_sub(before) as f64 / secs;
        Rates {
            sent_bytes: rate(previous.sent_bytes, current.sent_bytes),
            received_bytes: rate(previous.received_bytes, current.received_bytes),
            sent_messages: rate(previous.sent_messages, current.sent_messages),
            received_messages: rate(previous.received_messages, current.received_messages),
        }
    }
}

#[derive(Debug, Clone, Message)]
#[rtype(result = "Rates")]
pub struct GetRates;

/// Recomputes the process-wide rates periodically and logs a traffic summary.
pub struct StatisticsReporter {
    rate_interval: Duration,
    log_interval: Duration,
    previous: TotalsSnapshot,
    previous_at: Instant,
    rates: Rates,
}

impl StatisticsReporter {
    pub fn new(rate_interval: Duration, log_interval: Duration) -> Self {
        StatisticsReporter {
            rate_interval,
            log_interval,
            previous: TOTALS.snapshot(),
            previous_at: Instant::now(),
            rates: Rates::default(),
        }
    }

    fn update_rates(&mut self) {
        let now = Instant::now();
        let current = TOTALS.snapshot();
        self.rates = Rates::between(&self.previous, &current, now - self.previous_at);
        self.previous = current;
        self.previous_at = now;
    }

    fn log_summary(&self) {
        let totals = TOTALS.snapshot();
        info!(
            "Network statistics: sent {} bytes in {} messages ({:.1} msg/s), received {} bytes in {} messages ({:.1} msg/s)",
            totals.sent_bytes,
            totals.sent_messages,
            self.rates.sent_messages,
            totals.received_bytes,
            totals.received_messages,
            self.rates.received_messages,
        );
        let mut by_kind: Vec<(String, u64)> = TOTALS.received_by_kind().into_iter().collect();
        by_kind.sort_by(|a, b| b.1.cmp(&a.1));
        for (kind, count) in by_kind {
            info!("  {}: {}", kind, count);
        }
    }
}

impl Default for StatisticsReporter {
    fn default() -> Self {
        StatisticsReporter::new(Duration::from_secs(1), Duration::from_secs(60 * 60))
    }
}

impl Actor for StatisticsReporter {
    type Context = Context<Self>;

    fn started(&mut self, ctx: &mut Context<Self>) {
        trace!("statistics reporter started");
        ctx.run_interval(self.rate_interval, |act, _ctx| act.update_rates());
        ctx.run_interval(self.log_interval, |act, _ctx| act.log_summary());
    }

    fn stopped(&mut self, _ctx: &mut Context<Self>) {
        trace!("statistics reporter stopped");
    }
}

impl Handler<GetRates> for StatisticsReporter {
    type Result = Rates;

    fn handle(&mut self, _msg: GetRates, _ctx: &mut Context<Self>) -> Self::Result {
        self.rates
    }
}
