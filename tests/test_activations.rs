//! Tests for the activation catalog and softmax
//!
//! This file covers:
//! - Forward values of every variant, including hinge and branch boundaries
//! - Defaults and JSON form of the configurable variants
//! - Coefficient learning for PReLU, PELU and Softexp
//! - Softmax normalization and numerical stability

use approx::assert_relative_eq;
use ndarray::array;
use neural_trainer::utils::activations::{SOFTEXP_EPSILON, SOFTEXP_MIN_ARGUMENT};
use neural_trainer::utils::{softmax, softmax_rows, Activation};

// ============================================================================
// Forward Values
// ============================================================================

mod forward_tests {
    use super::*;

    #[test]
    fn test_linear_is_identity() {
        for x in [-3.0, 0.0, 2.5] {
            assert_eq!(Activation::Linear.activate(x), x);
        }
    }

    #[test]
    fn test_sigmoid_values() {
        assert_relative_eq!(Activation::Sigmoid.activate(0.0), 0.5);
        assert!(Activation::Sigmoid.activate(10.0) > 0.9999);
        assert!(Activation::Sigmoid.activate(-10.0) < 1e-4);
        // no overflow far in the tails
        assert_eq!(Activation::Sigmoid.activate(-1000.0), 0.0);
        assert_eq!(Activation::Sigmoid.activate(1000.0), 1.0);
    }

    #[test]
    fn test_softplus_is_stable() {
        assert_relative_eq!(Activation::Softplus.activate(0.0), 2.0f64.ln());
        assert_relative_eq!(Activation::Softplus.activate(800.0), 800.0);
        assert!(Activation::Softplus.activate(-800.0) >= 0.0);
    }

    #[test]
    fn test_relu_leaks() {
        let relu = Activation::relu();
        assert_eq!(relu.activate(2.0), 2.0);
        assert_relative_eq!(relu.activate(-2.0), -0.02);
    }

    #[test]
    fn test_elu_negative_branch() {
        let elu = Activation::Elu { coef: 2.0 };
        assert_relative_eq!(elu.activate(-1.0), 2.0 * ((-1.0f64).exp() - 1.0));
        assert_eq!(elu.activate(3.0), 3.0);
    }

    #[test]
    fn test_srelu_hinges() {
        let srelu = Activation::Srelu {
            left_hinge: -1.0,
            left_slope: 0.1,
            right_hinge: 1.0,
            right_slope: 0.5,
        };
        assert_eq!(srelu.activate(0.3), 0.3);
        assert_relative_eq!(srelu.activate(-3.0), -1.2);
        assert_relative_eq!(srelu.activate(3.0), 2.0);
    }

    #[test]
    fn test_gaussian_peak() {
        assert_eq!(Activation::Gaussian.activate(0.0), 1.0);
        assert_relative_eq!(Activation::Gaussian.activate(1.0), (-1.0f64).exp());
    }

    #[test]
    fn test_softexp_branches() {
        let x = 0.7;
        assert_eq!(Activation::softexp(0.0).activate(x), x);

        let a = 0.5;
        assert_relative_eq!(
            Activation::softexp(a).activate(x),
            ((a * x).exp() - 1.0) / a + a,
            epsilon = 1e-12
        );

        let a = -0.5;
        assert_relative_eq!(
            Activation::softexp(a).activate(x),
            -(1.0 - a * (x + a)).ln() / a,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_softexp_near_zero_is_identity() {
        let tiny = Activation::softexp(SOFTEXP_EPSILON / 2.0);
        assert_eq!(tiny.activate(1.5), 1.5);
        assert_eq!(tiny.prime(1.5), 1.0);
    }

    #[test]
    fn test_softexp_log_argument_guarded() {
        // 1 - a(x + a) <= 0 for a large negative input
        let value = Activation::softexp(-1.0).activate(-10.0);
        assert!(value.is_finite());
    }

    #[test]
    fn test_softexp_saturates_past_domain_edge() {
        // coef -1: the log argument is x itself, saturated for x <= 0.01
        let softexp = Activation::softexp(-1.0);
        let edge = SOFTEXP_MIN_ARGUMENT.ln();
        for x in [-0.5, -3.0, 0.0] {
            assert_relative_eq!(softexp.activate(x), edge);
            assert_eq!(softexp.prime(x), 0.0);
            assert_relative_eq!(softexp.coefficient_prime(x), edge);
        }
        // inside the domain the derivative stays bounded by the edge
        assert_relative_eq!(softexp.prime(0.5), 2.0);
        assert!(softexp.prime(SOFTEXP_MIN_ARGUMENT * 1.01) <= 1.0 / SOFTEXP_MIN_ARGUMENT);
    }
}

// ============================================================================
// Defaults and Serialization
// ============================================================================

mod serde_tests {
    use super::*;

    #[test]
    fn test_default_is_leaky_relu() {
        assert_eq!(Activation::default(), Activation::Relu { coef: 0.01 });
    }

    #[test]
    fn test_json_defaults() {
        let prelu: Activation = serde_json::from_str(r#"{ "type": "prelu" }"#).unwrap();
        assert_eq!(prelu, Activation::Prelu { coef: 0.25 });

        let srelu: Activation = serde_json::from_str(r#"{ "type": "srelu" }"#).unwrap();
        assert_eq!(
            srelu,
            Activation::Srelu {
                left_hinge: -1.0,
                left_slope: 0.1,
                right_hinge: 1.0,
                right_slope: 0.1,
            }
        );
    }

    #[test]
    fn test_unknown_variant_rejected() {
        assert!(serde_json::from_str::<Activation>(r#"{ "type": "gelu" }"#).is_err());
    }
}

// ============================================================================
// Learnable Coefficients
// ============================================================================

mod learn_tests {
    use super::*;

    #[test]
    fn test_fixed_variants_ignore_learn() {
        for activation in [
            Activation::Linear,
            Activation::Sigmoid,
            Activation::relu(),
            Activation::Elu { coef: 1.0 },
            Activation::Gaussian,
        ] {
            let mut learned = activation;
            learned.learn(3.0, 0.1);
            assert_eq!(learned, activation);
            assert!(!activation.is_learnable());
            assert_eq!(activation.coefficient_prime(-1.0), 0.0);
        }
    }

    #[test]
    fn test_learnable_variants_descend() {
        for activation in [
            Activation::prelu(0.25),
            Activation::Pelu { coef: 1.0 },
            Activation::softexp(0.1),
        ] {
            let mut learned = activation;
            learned.learn(2.0, 0.05);
            let before = activation.coefficient().unwrap();
            let after = learned.coefficient().unwrap();
            assert_relative_eq!(after, before - 0.1, epsilon = 1e-12);
        }
    }
}

// ============================================================================
// Softmax
// ============================================================================

mod softmax_tests {
    use super::*;

    #[test]
    fn test_rows_sum_to_one() {
        let probabilities = softmax_rows(array![[1.0, 2.0, 3.0], [-5.0, 0.0, 5.0]].view());
        for row in probabilities.rows() {
            assert_relative_eq!(row.sum(), 1.0, epsilon = 1e-9);
            assert!(row.iter().all(|&p| (0.0..=1.0).contains(&p)));
        }
    }

    #[test]
    fn test_shift_invariance() {
        let base = softmax(array![0.1, 0.2, 0.7].view());
        let shifted = softmax(array![100.1, 100.2, 100.7].view());
        for (a, b) in base.iter().zip(shifted.iter()) {
            assert_relative_eq!(a, b, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_large_values_do_not_overflow() {
        let probabilities = softmax(array![1000.0, 1000.0].view());
        assert_relative_eq!(probabilities[0], 0.5);
        assert_relative_eq!(probabilities[1], 0.5);
    }
}
