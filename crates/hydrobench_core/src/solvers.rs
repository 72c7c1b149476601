use crate::traits::{DynamicalSystem, EmbeddedStepper, Scalar, Steppable};
use serde::{Deserialize, Serialize};

/// Fixed-step fourth order scheme used by the `rk4` variant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FixedScheme {
    /// Kutta's 3/8 rule ([`Rk38`]).
    #[default]
    ThreeEighths,
    /// The classic tableau ([`RK4`]).
    Classic,
}

/// Classic Runge-Kutta 4th Order Solver
pub struct RK4<T: Scalar> {
    k1: Vec<T>,
    k2: Vec<T>,
    k3: Vec<T>,
    k4: Vec<T>,
    tmp: Vec<T>,
}

impl<T: Scalar> RK4<T> {
    pub fn new(dim: usize) -> Self {
        Self {
            k1: vec![T::zero(); dim],
            k2: vec![T::zero(); dim],
            k3: vec![T::zero(); dim],
            k4: vec![T::zero(); dim],
            tmp: vec![T::zero(); dim],
        }
    }
}

impl<T: Scalar> Steppable<T> for RK4<T> {
    fn step(&mut self, system: &impl DynamicalSystem<T>, t: &mut T, state: &mut [T], dt: T) {
        let half = T::cst(0.5);
        let sixth = T::cst(1.0 / 6.0);
        let two = T::cst(2.0);

        let t0 = *t;

        // k1 = f(t, y)
        system.apply(t0, state, &mut self.k1);

        // k2 = f(t + dt/2, y + dt*k1/2)
        for i in 0..state.len() {
            self.tmp[i] = state[i] + dt * self.k1[i] * half;
        }
        system.apply(t0 + dt * half, &self.tmp, &mut self.k2);

        // k3 = f(t + dt/2, y + dt*k2/2)
        for i in 0..state.len() {
            self.tmp[i] = state[i] + dt * self.k2[i] * half;
        }
        system.apply(t0 + dt * half, &self.tmp, &mut self.k3);

        // k4 = f(t + dt, y + dt*k3)
        for i in 0..state.len() {
            self.tmp[i] = state[i] + dt * self.k3[i];
        }
        system.apply(t0 + dt, &self.tmp, &mut self.k4);

        // y_next = y + dt/6 * (k1 + 2k2 + 2k3 + k4)
        for i in 0..state.len() {
            state[i] = state[i]
                + dt * sixth * (self.k1[i] + two * self.k2[i] + two * self.k3[i] + self.k4[i]);
        }

        *t = t0 + dt;
    }

    fn stages(&self) -> usize {
        4
    }
}

/// Runge-Kutta 4th order with Kutta's 3/8 rule. Same order as [`RK4`] with a
/// smaller error constant; this is the default fixed-grid RK4 of the
/// auto-diff-framework benchmark.
pub struct Rk38<T: Scalar> {
    k1: Vec<T>,
    k2: Vec<T>,
    k3: Vec<T>,
    k4: Vec<T>,
    tmp: Vec<T>,
}

impl<T: Scalar> Rk38<T> {
    pub fn new(dim: usize) -> Self {
        Self {
            k1: vec![T::zero(); dim],
            k2: vec![T::zero(); dim],
            k3: vec![T::zero(); dim],
            k4: vec![T::zero(); dim],
            tmp: vec![T::zero(); dim],
        }
    }
}

impl<T: Scalar> Steppable<T> for Rk38<T> {
    fn step(&mut self, system: &impl DynamicalSystem<T>, t: &mut T, state: &mut [T], dt: T) {
        let third = T::cst(1.0 / 3.0);
        let two_thirds = T::cst(2.0 / 3.0);
        let three = T::cst(3.0);
        let eighth = T::cst(0.125);

        let t0 = *t;

        system.apply(t0, state, &mut self.k1);

        for i in 0..state.len() {
            self.tmp[i] = state[i] + dt * self.k1[i] * third;
        }
        system.apply(t0 + dt * third, &self.tmp, &mut self.k2);

        for i in 0..state.len() {
            self.tmp[i] = state[i] + dt * (self.k2[i] - self.k1[i] * third);
        }
        system.apply(t0 + dt * two_thirds, &self.tmp, &mut self.k3);

        for i in 0..state.len() {
            self.tmp[i] = state[i] + dt * (self.k1[i] - self.k2[i] + self.k3[i]);
        }
        system.apply(t0 + dt, &self.tmp, &mut self.k4);

        // y_next = y + dt/8 * (k1 + 3k2 + 3k3 + k4)
        for i in 0..state.len() {
            state[i] = state[i]
                + dt * eighth * (self.k1[i] + three * (self.k2[i] + self.k3[i]) + self.k4[i]);
        }

        *t = t0 + dt;
    }

    fn stages(&self) -> usize {
        4
    }
}

/// Tsitouras 5/4 Solver
pub struct Tsit5<T: Scalar> {
    k1: Vec<T>,
    k2: Vec<T>,
    k3: Vec<T>,
    k4: Vec<T>,
    k5: Vec<T>,
    k6: Vec<T>,
    k7: Vec<T>,
    tmp: Vec<T>,
}

impl<T: Scalar> Tsit5<T> {
    pub fn new(dim: usize) -> Self {
        let z = T::zero();
        Self {
            k1: vec![z; dim],
            k2: vec![z; dim],
            k3: vec![z; dim],
            k4: vec![z; dim],
            k5: vec![z; dim],
            k6: vec![z; dim],
            k7: vec![z; dim],
            tmp: vec![z; dim],
        }
    }

    /// Evaluates stages k1..k6 and writes the 5th order solution to `y_new`.
    fn advance(&mut self, system: &impl DynamicalSystem<T>, t0: T, state: &[T], dt: T, y_new: &mut [T]) {
        // Tsit5 Coefficients
        let c2 = T::cst(0.161);
        let c3 = T::cst(0.327);
        let c4 = T::cst(0.9);
        let c5 = T::cst(0.9800255409045097);
        let c6 = T::one();

        let a21 = T::cst(0.161);

        let a31 = T::cst(-0.008480655492356989);
        let a32 = T::cst(0.335480655492357);

        let a41 = T::cst(2.898);
        let a42 = T::cst(-6.359447987781783);
        let a43 = T::cst(4.361447987781783);

        let a51 = T::cst(5.325864858437957);
        let a52 = T::cst(-11.748883564062828);
        let a53 = T::cst(7.495539342889693);
        let a54 = T::cst(-0.09249506636030195);

        let a61 = T::cst(5.86145544294642);
        let a62 = T::cst(-12.92096931784711);
        let a63 = T::cst(8.159367898576159);
        let a64 = T::cst(-0.071584973281401);
        let a65 = T::cst(-0.02826857949054663);

        // b coefficients (5th order) equal the 7th row of A.
        let b1 = T::cst(0.09646076681806523);
        let b2 = T::cst(0.01);
        let b3 = T::cst(0.4798896504144996);
        let b4 = T::cst(1.379008574103742);
        let b5 = T::cst(-3.290069515436099);
        let b6 = T::cst(2.324710524099774);

        let n = state.len();

        // k1
        system.apply(t0, state, &mut self.k1);

        // k2
        for i in 0..n {
            self.tmp[i] = state[i] + dt * (a21 * self.k1[i]);
        }
        system.apply(t0 + c2 * dt, &self.tmp, &mut self.k2);

        // k3
        for i in 0..n {
            self.tmp[i] = state[i] + dt * (a31 * self.k1[i] + a32 * self.k2[i]);
        }
        system.apply(t0 + c3 * dt, &self.tmp, &mut self.k3);

        // k4
        for i in 0..n {
            self.tmp[i] = state[i] + dt * (a41 * self.k1[i] + a42 * self.k2[i] + a43 * self.k3[i]);
        }
        system.apply(t0 + c4 * dt, &self.tmp, &mut self.k4);

        // k5
        for i in 0..n {
            self.tmp[i] = state[i]
                + dt * (a51 * self.k1[i] + a52 * self.k2[i] + a53 * self.k3[i] + a54 * self.k4[i]);
        }
        system.apply(t0 + c5 * dt, &self.tmp, &mut self.k5);

        // k6
        for i in 0..n {
            self.tmp[i] = state[i]
                + dt * (a61 * self.k1[i]
                    + a62 * self.k2[i]
                    + a63 * self.k3[i]
                    + a64 * self.k4[i]
                    + a65 * self.k5[i]);
        }
        system.apply(t0 + c6 * dt, &self.tmp, &mut self.k6);

        for i in 0..n {
            y_new[i] = state[i]
                + dt * (b1 * self.k1[i]
                    + b2 * self.k2[i]
                    + b3 * self.k3[i]
                    + b4 * self.k4[i]
                    + b5 * self.k5[i]
                    + b6 * self.k6[i]);
        }
    }
}

impl<T: Scalar> EmbeddedStepper<T> for Tsit5<T> {
    fn error_order(&self) -> usize {
        4
    }

    fn stages(&self) -> usize {
        7
    }

    fn trial_step(
        &mut self,
        system: &impl DynamicalSystem<T>,
        t: T,
        state: &[T],
        dt: T,
        y_new: &mut [T],
        error: &mut [T],
    ) {
        // Difference between the 5th and embedded 4th order weights.
        let e1 = T::cst(-0.00178001105222577714);
        let e2 = T::cst(-0.0008164344596567469);
        let e3 = T::cst(0.007880878010261995);
        let e4 = T::cst(-0.1447110071732629);
        let e5 = T::cst(0.5823571654525552);
        let e6 = T::cst(-0.45808210592918697);
        let e7 = T::cst(0.015151515151515152);

        self.advance(system, t, state, dt, y_new);
        system.apply(t + dt, y_new, &mut self.k7);

        for i in 0..state.len() {
            error[i] = dt
                * (e1 * self.k1[i]
                    + e2 * self.k2[i]
                    + e3 * self.k3[i]
                    + e4 * self.k4[i]
                    + e5 * self.k5[i]
                    + e6 * self.k6[i]
                    + e7 * self.k7[i]);
        }
    }
}

/// Dormand-Prince 5(4) pair, the explicit Runge-Kutta scheme behind the
/// reference solver's `RK45` method.
pub struct Dopri5<T: Scalar> {
    k: [Vec<T>; 7],
    tmp: Vec<T>,
}

impl<T: Scalar> Dopri5<T> {
    const C: [f64; 6] = [0.0, 1.0 / 5.0, 3.0 / 10.0, 4.0 / 5.0, 8.0 / 9.0, 1.0];
    const A: [[f64; 5]; 6] = [
        [0.0, 0.0, 0.0, 0.0, 0.0],
        [1.0 / 5.0, 0.0, 0.0, 0.0, 0.0],
        [3.0 / 40.0, 9.0 / 40.0, 0.0, 0.0, 0.0],
        [44.0 / 45.0, -56.0 / 15.0, 32.0 / 9.0, 0.0, 0.0],
        [19372.0 / 6561.0, -25360.0 / 2187.0, 64448.0 / 6561.0, -212.0 / 729.0, 0.0],
        [9017.0 / 3168.0, -355.0 / 33.0, 46732.0 / 5247.0, 49.0 / 176.0, -5103.0 / 18656.0],
    ];
    const B: [f64; 6] = [
        35.0 / 384.0,
        0.0,
        500.0 / 1113.0,
        125.0 / 192.0,
        -2187.0 / 6784.0,
        11.0 / 84.0,
    ];
    const E: [f64; 7] = [
        -71.0 / 57600.0,
        0.0,
        71.0 / 16695.0,
        -71.0 / 1920.0,
        17253.0 / 339200.0,
        -22.0 / 525.0,
        1.0 / 40.0,
    ];

    pub fn new(dim: usize) -> Self {
        Self {
            k: std::array::from_fn(|_| vec![T::zero(); dim]),
            tmp: vec![T::zero(); dim],
        }
    }

    fn advance(&mut self, system: &impl DynamicalSystem<T>, t0: T, state: &[T], dt: T, y_new: &mut [T]) {
        let n = state.len();
        system.apply(t0, state, &mut self.k[0]);
        for s in 1..6 {
            for i in 0..n {
                let mut acc = T::zero();
                for j in 0..s {
                    acc = acc + T::cst(Self::A[s][j]) * self.k[j][i];
                }
                self.tmp[i] = state[i] + dt * acc;
            }
            system.apply(t0 + T::cst(Self::C[s]) * dt, &self.tmp, &mut self.k[s]);
        }
        for i in 0..n {
            let mut acc = T::zero();
            for j in 0..6 {
                acc = acc + T::cst(Self::B[j]) * self.k[j][i];
            }
            y_new[i] = state[i] + dt * acc;
        }
    }
}

impl<T: Scalar> EmbeddedStepper<T> for Dopri5<T> {
    fn error_order(&self) -> usize {
        4
    }

    fn stages(&self) -> usize {
        7
    }

    fn trial_step(
        &mut self,
        system: &impl DynamicalSystem<T>,
        t: T,
        state: &[T],
        dt: T,
        y_new: &mut [T],
        error: &mut [T],
    ) {
        self.advance(system, t, state, dt, y_new);
        system.apply(t + dt, y_new, &mut self.k[6]);
        for i in 0..state.len() {
            let mut acc = T::zero();
            for j in 0..7 {
                acc = acc + T::cst(Self::E[j]) * self.k[j][i];
            }
            error[i] = dt * acc;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Decay {
        rate: f64,
    }

    impl DynamicalSystem<f64> for Decay {
        fn dimension(&self) -> usize {
            1
        }

        fn apply(&self, _t: f64, x: &[f64], out: &mut [f64]) {
            out[0] = -self.rate * x[0];
        }
    }

    /// dy/dt = t^3, exact for any 4th order (or higher) quadrature.
    struct Cubic;

    impl DynamicalSystem<f64> for Cubic {
        fn dimension(&self) -> usize {
            1
        }

        fn apply(&self, t: f64, _x: &[f64], out: &mut [f64]) {
            out[0] = t * t * t;
        }
    }

    fn integrate(stepper: &mut impl Steppable<f64>, system: &impl DynamicalSystem<f64>, steps: usize, dt: f64) -> f64 {
        let mut t = 0.0;
        let mut y = [1.0];
        for _ in 0..steps {
            stepper.step(system, &mut t, &mut y, dt);
        }
        assert!((t - steps as f64 * dt).abs() < 1e-12);
        y[0]
    }

    #[test]
    fn rk4_matches_exponential_decay() {
        let y = integrate(&mut RK4::new(1), &Decay { rate: 1.0 }, 10, 0.1);
        assert!((y - (-1.0_f64).exp()).abs() < 1e-6);
    }

    #[test]
    fn rk38_matches_exponential_decay() {
        let y = integrate(&mut Rk38::new(1), &Decay { rate: 1.0 }, 10, 0.1);
        assert!((y - (-1.0_f64).exp()).abs() < 1e-6);
    }

    /// Chains accepted trial steps of an embedded pair.
    fn integrate_embedded(
        stepper: &mut impl EmbeddedStepper<f64>,
        system: &impl DynamicalSystem<f64>,
        steps: usize,
        dt: f64,
    ) -> f64 {
        let mut y = [1.0];
        let mut y_new = [0.0];
        let mut err = [0.0];
        for k in 0..steps {
            stepper.trial_step(system, k as f64 * dt, &y, dt, &mut y_new, &mut err);
            y = y_new;
        }
        y[0]
    }

    #[test]
    fn fourth_order_methods_integrate_cubics_exactly() {
        // y(2) = 1 + 2^4 / 4
        let expected = 5.0;
        for y in [
            integrate(&mut RK4::new(1), &Cubic, 4, 0.5),
            integrate(&mut Rk38::new(1), &Cubic, 4, 0.5),
            integrate_embedded(&mut Tsit5::new(1), &Cubic, 4, 0.5),
            integrate_embedded(&mut Dopri5::new(1), &Cubic, 4, 0.5),
        ] {
            assert!((y - expected).abs() < 1e-12, "got {y}");
        }
    }

    #[test]
    fn fifth_order_pairs_are_accurate_on_decay() {
        let exact = (-1.0_f64).exp();
        let tsit = integrate_embedded(&mut Tsit5::new(1), &Decay { rate: 1.0 }, 10, 0.1);
        let dopri = integrate_embedded(&mut Dopri5::new(1), &Decay { rate: 1.0 }, 10, 0.1);
        assert!((tsit - exact).abs() < 1e-8);
        assert!((dopri - exact).abs() < 1e-8);
    }

    fn local_error(stepper: &mut impl EmbeddedStepper<f64>, dt: f64) -> f64 {
        let mut y_new = [0.0];
        let mut err = [0.0];
        stepper.trial_step(&Decay { rate: 2.0 }, 0.0, &[1.0], dt, &mut y_new, &mut err);
        err[0].abs()
    }

    #[test]
    fn embedded_error_shrinks_with_step_size() {
        // Local error is O(dt^5): halving dt cuts it by roughly 32.
        let mut dopri = Dopri5::new(1);
        let coarse = local_error(&mut dopri, 0.2);
        let fine = local_error(&mut dopri, 0.1);
        assert!(fine < coarse / 16.0, "coarse {coarse}, fine {fine}");

        let mut tsit = Tsit5::new(1);
        let coarse = local_error(&mut tsit, 0.2);
        let fine = local_error(&mut tsit, 0.1);
        assert!(fine < coarse / 16.0, "coarse {coarse}, fine {fine}");
    }

    #[test]
    fn embedded_error_vanishes_on_polynomials_of_low_degree() {
        struct Linear;
        impl DynamicalSystem<f64> for Linear {
            fn dimension(&self) -> usize {
                1
            }
            fn apply(&self, t: f64, _x: &[f64], out: &mut [f64]) {
                out[0] = 2.0 * t + 1.0;
            }
        }

        let mut dopri = Dopri5::new(1);
        let mut tsit = Tsit5::new(1);
        let mut y_new = [0.0];
        let mut err = [0.0];
        dopri.trial_step(&Linear, 0.0, &[0.0], 0.5, &mut y_new, &mut err);
        assert!(err[0].abs() < 1e-14);
        assert!((y_new[0] - 0.75).abs() < 1e-14);
        tsit.trial_step(&Linear, 0.0, &[0.0], 0.5, &mut y_new, &mut err);
        assert!(err[0].abs() < 1e-12);
        assert!((y_new[0] - 0.75).abs() < 1e-12);
    }
}
