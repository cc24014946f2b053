use rand::Rng;
use tokio::time::Duration;

use crate::agent::AgentContext;

// Outcome of a probe wake-up.
pub(crate) enum ProbeStep {
    // The caller should send its probe query now; the next wake-up is
    // already scheduled.
    SendProbe,
    // Three probes went unanswered; the probed name is unique.
    Done,
}

// Shared sequencing for uniqueness probes (RFC 6762 section 8.1): a random
// initial delay of up to 250 ms, then three probe queries 250 ms apart,
// completing 250 ms after the last one if no conflict was observed.
pub(crate) struct ProbeSequence {
    probes_remaining: u32,
}

impl ProbeSequence {
    const PROBE_COUNT: u32 = 3;
    const PROBE_INTERVAL: Duration = Duration::from_millis(250);

    pub(crate) fn new() -> Self {
        ProbeSequence {
            probes_remaining: Self::PROBE_COUNT,
        }
    }

    // Schedules the first probe wake-up with the initial jitter.
    pub(crate) fn schedule_first(&self, token: u64, ctx: &mut AgentContext) {
        let jitter = Duration::from_millis(rand::rng().random_range(0..250));
        let at = ctx.now() + jitter;
        ctx.post_task_at(token, at);
    }

    pub(crate) fn advance(&mut self, token: u64, ctx: &mut AgentContext) -> ProbeStep {
        if self.probes_remaining == 0 {
            return ProbeStep::Done;
        }

        self.probes_remaining -= 1;
        let at = ctx.now() + Self::PROBE_INTERVAL;
        ctx.post_task_at(token, at);
        ProbeStep::SendProbe
    }
}
