use std::{
    io::{self, Write},
    time::Duration,
};

use clap::Args;
use rama::error::{BoxError, ErrorContext as _};
use thrpt_lib::pacer::{Pacer, Schedule};

use crate::config::AttackMode;

/// Preview the schedule of a pacer, without sending any traffic.
#[derive(Debug, Clone, Args)]
pub struct PaceCommand {
    /// Pacing of the attack.
    #[arg(long, value_enum, default_value_t = AttackMode::Constant)]
    pub mode: AttackMode,

    /// Hits per second (max rate of a ramp attack).
    #[arg(long, value_name = "HITS/SEC")]
    pub rate: u64,

    /// Duration of the simulated attack.
    #[arg(long, default_value = "10s")]
    pub duration: humantime::Duration,
}

pub fn exec(args: PaceCommand) -> Result<(), BoxError> {
    if args.rate == 0 {
        return Err(BoxError::from(
            "an unlimited rate (0) has no schedule to preview",
        ));
    }

    let duration = args.duration.into();
    let pacer = args.mode.pacer(args.rate, duration)?;

    let stdout = io::stdout();
    write_schedule(&mut stdout.lock(), &pacer, duration)
}

/// Writes, for every second of the attack, the amount of hits the pacer
/// issues within it next to the rate it is expected to sustain.
pub fn write_schedule<W, P>(out: &mut W, pacer: &P, duration: Duration) -> Result<(), BoxError>
where
    W: Write,
    P: Pacer + ?Sized,
{
    let seconds = usize::try_from(duration.as_secs())
        .context("attack duration in seconds")?
        + usize::from(duration.subsec_nanos() > 0);
    let mut buckets = vec![0u64; seconds.max(1)];

    for at in Schedule::new(pacer, duration) {
        // a hit at exactly 1s belongs to the first second
        let idx = usize::try_from(at.as_nanos().saturating_sub(1) / 1_000_000_000)
            .unwrap_or(usize::MAX)
            .min(buckets.len() - 1);
        buckets[idx] += 1;
    }

    writeln!(out, "{pacer} for {duration:?}").context("write schedule header")?;
    writeln!(out, "{:>8}  {:>10}  {:>10}", "second", "hits", "expected").context("write schedule header")?;
    let mut total = 0;
    for (idx, hits) in buckets.iter().enumerate() {
        // rate at the middle of the second, away from interval edges
        let expected = pacer.rate(Duration::from_millis(idx as u64 * 1_000 + 500));
        writeln!(out, "{:>8}  {hits:>10}  {expected:>10.0}", idx + 1).context("write schedule line")?;
        total += hits;
    }
    writeln!(out, "{:>8}  {total:>10}", "total").context("write schedule total")?;

    Ok(())
}
