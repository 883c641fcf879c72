use std::time::Duration;

/// An endless stream of delays between connection attempts: the first delay
/// is `start`, and each following one is `factor` times longer, up to `max`.
/// Use `take` to bound the number of attempts.
///
#[derive(Clone, Debug)]
pub struct ExponentialBackoff {
    next: Duration,
    max: Duration,
    factor: u32,
}

impl ExponentialBackoff {
    pub fn new(start: Duration, max: Duration, factor: u32) -> Self {
        Self { next: start.min(max), max, factor }
    }
}

impl Iterator for ExponentialBackoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        let delay = self.next;
        self.next = (self.next * self.factor).min(self.max);
        Some(delay)
    }
}

/// Call `f` once per delay until it succeeds. After a failed attempt which
/// is not the last, `wait` receives the error and the delay to sleep before
/// the next one. Returns the first success or the last error, or `None` if
/// there were no delays at all.
///
pub fn retry<I, F, W, T, E>(delays: I, mut f: F, wait: W) -> Option<Result<T, E>>
where
    I: IntoIterator<Item = Duration>,
    F: FnMut() -> Result<T, E>,
    W: Fn(&E, Duration),
{
    let mut delays = delays.into_iter().peekable();
    let mut outcome = None;

    while let Some(delay) = delays.next() {
        match f() {
            Ok(value) => return Some(Ok(value)),
            Err(e) => {
                if delays.peek().is_some() {
                    wait(&e, delay)
                }
                outcome = Some(Err(e))
            }
        }
    }
    outcome
}

#[cfg(test)]
mod test {

    use std::cell::Cell;
    use std::time::Duration;
    use super::{retry, ExponentialBackoff};

    #[test]
    fn backoff_grows_up_to_the_maximum() {
        let ms: Vec<_> = ExponentialBackoff::new(Duration::from_millis(10), Duration::from_millis(50), 2)
            .take(5)
            .map(|d| d.as_millis())
            .collect();
        assert_eq!(ms, vec![10, 20, 40, 50, 50]);
    }

    #[test]
    fn retry_returns_the_last_error() {
        let attempts = Cell::new(0);
        let waits = Cell::new(0);
        let result: Option<Result<(), usize>> = retry(
            ExponentialBackoff::new(Duration::ZERO, Duration::ZERO, 2).take(3),
            || { attempts.set(attempts.get() + 1); Err(attempts.get()) },
            |_, _| waits.set(waits.get() + 1));
        assert_eq!(result, Some(Err(3)));
        assert_eq!(attempts.get(), 3);
        assert_eq!(waits.get(), 2);
    }

    #[test]
    fn retry_stops_on_success() {
        let attempts = Cell::new(0);
        let result: Option<Result<usize, ()>> = retry(
            vec![Duration::ZERO; 10],
            || { attempts.set(attempts.get() + 1); if attempts.get() == 2 { Ok(2) } else { Err(()) } },
            |_, _| {});
        assert_eq!(result, Some(Ok(2)));
    }

    #[test]
    fn retry_without_delays_makes_no_attempt() {
        let result: Option<Result<(), ()>> = retry(Vec::new(), || Ok(()), |_, _| {});
        assert_eq!(result, None);
    }
}
