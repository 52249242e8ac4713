#[cfg(test)]
mod tests {
    use crate::optim_impl::{DiagonalPreconditioner, LinearOperator, LinearSolverKind, PreconditionedCg};
    use nalgebra::{DMatrix, DVector};

    struct Dense(DMatrix<f64>);

    impl LinearOperator for Dense {
        fn dim(&self) -> usize {
            self.0.nrows()
        }

        fn matvec(&self, x: &DVector<f64>) -> DVector<f64> {
            &self.0 * x
        }
    }

    fn spd(n: usize) -> DMatrix<f64> {
        let a = DMatrix::from_fn(n, n, |i, j| ((i * 7 + j * 3) % 5) as f64 * 0.1);
        &a * a.transpose() + DMatrix::from_diagonal(&DVector::from_fn(n, |i, _| 1.0 + i as f64))
    }

    #[test]
    fn test_pcg_solves_spd_system() {
        let a = spd(8);
        let b = DVector::from_fn(8, |i, _| (i as f64).sin());
        let prec = DiagonalPreconditioner::new(a.diagonal(), 1e-8);
        let solver = PreconditionedCg::new(50, 1e-12);
        let op = Dense(a.clone());
        let out = solver.solve(&op, &prec, &b, DVector::zeros(8));
        assert!(out.converged);
        assert!(out.iterations <= 8 + 1);
        assert!((&a * &out.x - &b).norm() < 1e-10);
    }

    #[test]
    fn test_pcg_respects_iteration_limit_and_callback() {
        let a = spd(10);
        let b = DVector::from_element(10, 1.0);
        let prec = DiagonalPreconditioner::new(DVector::from_element(10, 1.0), 1e-8);
        let solver = PreconditionedCg::new(2, 1e-14);
        let mut seen = Vec::new();
        let out = solver.solve_with_callback(&Dense(a), &prec, &b, DVector::zeros(10), |it, _| seen.push(it));
        assert_eq!(out.iterations, 2);
        assert_eq!(seen, vec![1, 2]);
    }

    #[test]
    fn test_pcg_stops_on_negative_curvature() {
        let a = DMatrix::from_diagonal(&DVector::from_vec(vec![-1.0, -2.0]));
        let b = DVector::from_vec(vec![1.0, 1.0]);
        let prec = DiagonalPreconditioner::new(DVector::from_element(2, 1.0), 1e-8);
        let out = PreconditionedCg::new(10, 1e-10).solve(&Dense(a), &prec, &b, DVector::zeros(2));
        assert!(!out.converged);
        assert_eq!(out.iterations, 0);
    }

    #[test]
    fn test_preconditioner_floor() {
        let prec = DiagonalPreconditioner::new(DVector::from_vec(vec![0.0, 1e-12, 2.0]), 1e-8);
        assert_eq!(prec.diagonal()[0], 1e-8);
        assert_eq!(prec.diagonal()[1], 1e-8);
        assert_eq!(prec.diagonal()[2], 2.0);
    }

    #[test]
    fn test_linear_solver_kind_parsing() {
        assert_eq!("CG".parse::<LinearSolverKind>().unwrap(), LinearSolverKind::ConjugateGradient);
        assert_eq!("diag".parse::<LinearSolverKind>().unwrap(), LinearSolverKind::Diagonal);
        assert!("bfgs".parse::<LinearSolverKind>().is_err());
    }
}
