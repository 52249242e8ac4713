//! Finite-difference validation of the analytic gradient

use super::context::LasContext;
use super::hessian::LasHessian;
use super::problem::{LasKeyframe, LasProblem};
use super::ugg::UnitaryGroupGenerators;
use nalgebra::DVector;
use tracing::debug;

#[derive(Debug, Clone, Copy)]
pub struct GradientCheck {
    /// `g . x`
    pub analytic: f64,
    /// `(E(+h x) - E(-h x)) / 2h`
    pub numeric: f64,
}

impl GradientCheck {
    pub fn error(&self) -> f64 {
        (self.analytic - self.numeric).abs()
    }
}

/// Compare the directional derivative along `direction` with a central
/// difference of the energy. CI displacements are applied unscaled.
pub fn check_gradient(
    problem: &LasProblem,
    keyframe: &LasKeyframe,
    direction: &DVector<f64>,
    step: f64,
) -> GradientCheck {
    let ctx = LasContext::new(problem, keyframe);
    let ugg = UnitaryGroupGenerators::new(problem, &keyframe.ci);
    let hop = LasHessian::new(&ctx, &ugg, 0.0);
    let x = ugg.project_tangent(direction);
    let analytic = hop.get_grad().dot(&x);

    let unit = vec![1.0; problem.nroots()];
    let e_plus = LasContext::new(problem, &ugg.update_wfn(keyframe, &(&x * step), &unit)).e_tot;
    let e_minus = LasContext::new(problem, &ugg.update_wfn(keyframe, &(&x * -step), &unit)).e_tot;
    let numeric = (e_plus - e_minus) / (2.0 * step);

    debug!(
        "Gradient check: analytic = {:.10e}, numeric = {:.10e}, error = {:.3e}",
        analytic,
        numeric,
        (analytic - numeric).abs()
    );
    GradientCheck { analytic, numeric }
}
