use approx::assert_relative_eq;
use faer::Mat;
use pglmm_tune::{Family, FamilyError, GlmFamily, Link};
use rand::rngs::StdRng;
use rand::{RngExt, SeedableRng};

const FAMILIES: [Family; 4] = [
    Family::Binomial,
    Family::Poisson,
    Family::Gaussian,
    Family::Gamma,
];

fn column_of(values: &[f64]) -> Mat<f64> {
    Mat::from_fn(values.len(), 1, |i, _| values[i])
}

/// In-support responses for each family.
fn responses(family: Family, rng: &mut StdRng, n: usize) -> Mat<f64> {
    let values: Vec<f64> = (0..n)
        .map(|_| {
            let u = rng.random::<f64>();
            match family {
                Family::Binomial => u,
                Family::Poisson => (20.0 * u).floor(),
                Family::Gaussian => 10.0f64.mul_add(u, -5.0),
                Family::Gamma => 0.01 + 5.0 * u,
            }
        })
        .collect();
    column_of(&values)
}

/// Means strictly inside each family's valid region.
fn valid_means(family: Family, rng: &mut StdRng, n: usize) -> Mat<f64> {
    let values: Vec<f64> = (0..n)
        .map(|_| {
            let u = rng.random::<f64>();
            match family {
                Family::Binomial => 0.98f64.mul_add(u, 0.01),
                Family::Poisson | Family::Gamma => 0.01 + 30.0 * u,
                Family::Gaussian => 10.0f64.mul_add(u, -5.0),
            }
        })
        .collect();
    column_of(&values)
}

#[test]
fn initial_mean_lands_in_valid_region() {
    let mut rng = StdRng::seed_from_u64(11);
    for family in FAMILIES {
        let y = responses(family, &mut rng, 200);
        let mu = family.initial_mean(&y).expect("in-support responses");
        assert!(
            family.mean_is_valid(&mu).iter().all(|&valid| valid),
            "{family} initial mean left the valid region"
        );
    }
}

#[test]
fn link_round_trip_recovers_mean() {
    let mut rng = StdRng::seed_from_u64(12);
    let cases = [
        (Family::Binomial, Link::Logit),
        (Family::Binomial, Link::Cloglog),
        (Family::Poisson, Link::Log),
        (Family::Gamma, Link::Log),
        (Family::Gaussian, Link::Identity),
    ];
    for (family, link) in cases {
        let mu = valid_means(family, &mut rng, 100);
        let back = link.inverse_link(&link.link(&mu));
        for i in 0..mu.nrows() {
            assert_relative_eq!(back[(i, 0)], mu[(i, 0)], max_relative = 1e-9);
        }
    }
}

#[test]
fn inverse_link_round_trip_flips_sign() {
    let mut rng = StdRng::seed_from_u64(13);
    let mu = valid_means(Family::Gamma, &mut rng, 50);
    let back = Link::Inverse.inverse_link(&Link::Inverse.link(&mu));
    for i in 0..mu.nrows() {
        assert_relative_eq!(back[(i, 0)], -mu[(i, 0)], max_relative = 1e-12);
    }
}

#[test]
fn clamp_is_idempotent_for_arbitrary_means() {
    let mut rng = StdRng::seed_from_u64(14);
    let raw: Vec<f64> = (0..300)
        .map(|_| 4.0f64.mul_add(rng.random::<f64>(), -2.0))
        .collect();
    let mu = column_of(&raw);
    for family in FAMILIES {
        let once = family.clamp_mean(&mu);
        let twice = family.clamp_mean(&once);
        for i in 0..mu.nrows() {
            assert_eq!(once[(i, 0)], twice[(i, 0)]);
        }
    }
}

#[test]
fn documented_initial_means() {
    let binomial = Family::Binomial
        .initial_mean(&column_of(&[0.0, 1.0, 0.5]))
        .expect("valid binomial responses");
    assert_relative_eq!(binomial[(0, 0)], 0.25);
    assert_relative_eq!(binomial[(1, 0)], 0.75);
    assert_relative_eq!(binomial[(2, 0)], 0.5);

    let poisson = Family::Poisson
        .initial_mean(&column_of(&[0.0, 3.0]))
        .expect("valid counts");
    assert_relative_eq!(poisson[(0, 0)], 0.1);
    assert_relative_eq!(poisson[(1, 0)], 3.1);

    for bad in [-0.1, 1.2] {
        let err = Family::Binomial
            .initial_mean(&column_of(&[0.5, bad]))
            .expect_err("outside [0, 1]");
        assert!(matches!(
            err,
            FamilyError::Domain {
                family: Family::Binomial,
                index: 1,
                ..
            }
        ));
    }
}

#[test]
fn working_quantities_use_the_canonical_link() {
    let family = GlmFamily::canonical(Family::Poisson);
    let mu = column_of(&[0.5, 2.0, 8.0]);
    let y = column_of(&[1.0, 1.0, 10.0]);
    let eta = family.link(&mu);
    let weights = family.working_weights(&mu, 1e-10);
    let z = family.working_response(&y, &eta, &mu);
    for i in 0..3 {
        // log link: weight = mu, z = eta + (y - mu) / mu
        assert_relative_eq!(weights[(i, 0)], mu[(i, 0)], max_relative = 1e-12);
        assert_relative_eq!(
            z[(i, 0)],
            eta[(i, 0)] + (y[(i, 0)] - mu[(i, 0)]) / mu[(i, 0)],
            max_relative = 1e-12
        );
    }
}

#[test]
fn unknown_link_codes_evaluate_to_zero() {
    let mu = column_of(&[0.2, 0.4]);
    for link in [Link::from_code(99), Link::Probit] {
        for values in [link.link(&mu), link.inverse_link(&mu), link.dlink(&mu)] {
            assert!((0..values.nrows()).all(|i| values[(i, 0)] == 0.0));
        }
    }
    assert!("tweedie".parse::<Family>().is_err());
}
