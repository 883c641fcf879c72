use std::collections::BTreeMap;
use std::time::{Duration, Instant};




/**
 * The phases of a ghost update or an adaptation step which report to an
 * `Observer`.
 */
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Phase {
    GhostUpdate,
    Projection,
    Prediction,
    Periodic,
    Boundary,
    Exchange,
    Adaptation,
    Graduation,
    Migration,
}




/**
 * Receives start and stop events of the engine's phases. Phases may nest
 * (a `Projection` happens inside a `GhostUpdate`), but a phase never nests
 * inside itself.
 */
pub trait Observer {
    fn start(&mut self, _phase: Phase) {}
    fn stop(&mut self, _phase: Phase) {}
}




/**
 * An observer which ignores every event.
 */
#[derive(Clone, Copy, Debug, Default)]
pub struct Silent;

impl Observer for Silent {}




/**
 * An observer which accumulates wall-clock time and call counts per phase.
 */
#[derive(Clone, Debug, Default)]
pub struct Timers {
    open: BTreeMap<Phase, Instant>,
    totals: BTreeMap<Phase, (Duration, usize)>,
}




// ============================================================================
impl Timers {

    pub fn new() -> Self {
        Self::default()
    }

    pub fn total(&self, phase: Phase) -> Duration {
        self.totals.get(&phase).map_or(Duration::ZERO, |t| t.0)
    }

    pub fn count(&self, phase: Phase) -> usize {
        self.totals.get(&phase).map_or(0, |t| t.1)
    }

    /**
     * Return one row per phase which has completed at least once, sorted by
     * phase.
     */
    pub fn report(&self) -> Vec<(Phase, Duration, usize)> {
        self.totals.iter().map(|(phase, (time, count))| (*phase, *time, *count)).collect()
    }
}




// ============================================================================
impl Observer for Timers {
    fn start(&mut self, phase: Phase) {
        self.open.insert(phase, Instant::now());
    }

    fn stop(&mut self, phase: Phase) {
        if let Some(start) = self.open.remove(&phase) {
            let entry = self.totals.entry(phase).or_insert((Duration::ZERO, 0));
            entry.0 += start.elapsed();
            entry.1 += 1;
        }
    }
}




/**
 * Run a closure between `start` and `stop` events of a phase. The stop event
 * is emitted whether the closure returns `Ok` or `Err`; a panic in the
 * closure skips it.
 */
pub(crate) fn timed<O, T, F>(observer: &mut O, phase: Phase, f: F) -> T
where
    O: Observer + ?Sized,
    F: FnOnce(&mut O) -> T,
{
    observer.start(phase);
    let result = f(observer);
    observer.stop(phase);
    result
}




// ============================================================================
#[cfg(test)]
mod test {

    use super::{timed, Observer, Phase, Timers};

    #[test]
    fn timers_count_nested_phases() {
        let mut timers = Timers::new();

        timed(&mut timers, Phase::GhostUpdate, |t| {
            timed(t, Phase::Projection, |_| ());
            timed(t, Phase::Projection, |_| ());
        });
        assert_eq!(timers.count(Phase::GhostUpdate), 1);
        assert_eq!(timers.count(Phase::Projection), 2);
        assert_eq!(timers.count(Phase::Prediction), 0);
        assert!(timers.total(Phase::GhostUpdate) >= timers.total(Phase::Projection));
        assert_eq!(timers.report().iter().map(|r| r.0).collect::<Vec<_>>(), vec![Phase::GhostUpdate, Phase::Projection]);
    }

    #[test]
    fn failing_phase_is_still_closed() {
        let mut timers = Timers::new();
        let result: Result<(), &str> = timed(&mut timers, Phase::Exchange, |_| Err("lost peer"));
        assert!(result.is_err());
        assert_eq!(timers.count(Phase::Exchange), 1);
    }

    #[test]
    fn unmatched_stop_is_ignored() {
        let mut timers = Timers::new();
        timers.stop(Phase::Exchange);
        assert!(timers.report().is_empty());
    }
}
