//! A fixed-step Runge-Kutta solver for small systems of ordinary differential equations.

/// A state that can be integrated by [integrate].
pub trait OdeState: Copy {
    /// Computes `self + scale * rate`.
    fn add_scaled(self, scale: f64, rate: Self) -> Self;
}

impl OdeState for f64 {
    fn add_scaled(self, scale: f64, rate: Self) -> Self {
        self + scale * rate
    }
}

impl<const N: usize> OdeState for [f64; N] {
    fn add_scaled(mut self, scale: f64, rate: Self) -> Self {
        for (y, dy) in self.iter_mut().zip(rate) {
            *y += scale * dy;
        }
        self
    }
}

/// Integrates `dy/dt = f(y, t)` from `y0` at `times[0]`, returning the state at each of `times`.
///
/// Each interval between consecutive entries of `times` is covered by `substeps`
/// classic fourth-order Runge-Kutta steps. The first returned state is `y0`.
///
/// # Parameters
/// * `f` - The derivative function, taking the state and the time
/// * `y0` - The initial state
/// * `times` - The output times, in increasing order
/// * `substeps` - The number of RK4 steps per output interval (at least 1)
pub fn integrate<S, F>(mut f: F, y0: S, times: &[f64], substeps: usize) -> Vec<S>
where
    S: OdeState,
    F: FnMut(S, f64) -> S,
{
    let substeps = substeps.max(1);
    let mut out = Vec::with_capacity(times.len());
    let mut y = y0;
    if times.is_empty() {
        return out;
    }
    out.push(y);
    for window in times.windows(2) {
        let h = (window[1] - window[0]) / substeps as f64;
        let mut t = window[0];
        for _ in 0..substeps {
            y = rk4_step(&mut f, y, t, h);
            t += h;
        }
        out.push(y);
    }
    out
}

fn rk4_step<S, F>(f: &mut F, y: S, t: f64, h: f64) -> S
where
    S: OdeState,
    F: FnMut(S, f64) -> S,
{
    let k1 = f(y, t);
    let k2 = f(y.add_scaled(0.5 * h, k1), t + 0.5 * h);
    let k3 = f(y.add_scaled(0.5 * h, k2), t + 0.5 * h);
    let k4 = f(y.add_scaled(h, k3), t + h);
    y.add_scaled(h / 6.0, k1)
        .add_scaled(h / 3.0, k2)
        .add_scaled(h / 3.0, k3)
        .add_scaled(h / 6.0, k4)
}
