/// A sequence of values sampled at evenly spaced times.
///
/// Sampling rounds to the nearest sample and never reads past either end.
#[derive(Clone, Debug)]
pub struct Profile<T> {
    offset: f64,
    step: f64,
    values: Vec<T>,
}

impl<T: Clone> Profile<T> {
    /// Creates a profile holding `value` at each of `times`.
    ///
    /// `times` must be evenly spaced and non-empty.
    pub fn constant(times: &[f64], value: T) -> Self {
        let offset = times.first().copied().unwrap_or(0.0);
        let step = match times {
            [first, second, ..] => second - first,
            _ => 1.0,
        };
        Self {
            offset,
            step,
            values: vec![value; times.len().max(1)],
        }
    }
}

impl<T> Profile<T> {
    /// Samples the profile at time `t`.
    pub fn sample(&self, t: f64) -> &T {
        let idx = ((t - self.offset) / self.step).round().max(0.0);
        let idx = usize::min(idx as usize, self.values.len() - 1);
        &self.values[idx]
    }

    /// The number of samples.
    pub fn len(&self) -> usize {
        self.values.len()
    }
}
