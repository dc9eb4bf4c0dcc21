use crate::model::constants::{
    CONVERGENCE_TOLERANCE, DEFAULT_RATING, GLICKO2_SCALE, MAX_BRACKET_STEPS, MAX_SOLVER_ITERATIONS, Q
};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error, PartialEq)]
pub enum RatingError {
    #[error("Invalid rating state (rating {rating}, rd {rd}, volatility {volatility})")]
    InvalidRating { rating: f64, rd: f64, volatility: f64 },

    #[error("Invalid match score {0}, expected 0.0 or 1.0")]
    InvalidScore(f64),

    #[error("Match references story {0} which is not part of the rating period")]
    UnknownStory(Uuid),

    #[error("Could not bracket the volatility root (delta {delta}, phi {phi}, v {v})")]
    VolatilityBracketNotFound { delta: f64, phi: f64, v: f64 },

    #[error("Volatility solver did not converge after {0} iterations")]
    VolatilityDidNotConverge(u32)
}

/// Public-scale Glicko-2 parameters of a single story.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GlickoRating {
    pub rating: f64,
    pub rd: f64,
    pub volatility: f64
}

impl GlickoRating {
    pub fn new(rating: f64, rd: f64, volatility: f64) -> GlickoRating {
        GlickoRating { rating, rd, volatility }
    }

    /// Internal-scale skill. Always derived, never stored.
    pub fn mu(&self) -> f64 {
        (self.rating - DEFAULT_RATING) / GLICKO2_SCALE
    }

    /// Internal-scale deviation. Always derived, never stored.
    pub fn phi(&self) -> f64 {
        self.rd / GLICKO2_SCALE
    }

    fn from_internal(mu: f64, phi: f64, volatility: f64) -> GlickoRating {
        GlickoRating {
            rating: GLICKO2_SCALE * mu + DEFAULT_RATING,
            rd: GLICKO2_SCALE * phi,
            volatility
        }
    }

    pub fn validate(&self) -> Result<(), RatingError> {
        let valid = self.rating.is_finite()
            && self.rd.is_finite()
            && self.rd > 0.0
            && self.volatility.is_finite()
            && self.volatility > 0.0;

        if valid {
            Ok(())
        } else {
            Err(RatingError::InvalidRating {
                rating: self.rating,
                rd: self.rd,
                volatility: self.volatility
            })
        }
    }
}

/// One game from a player's point of view: the opponent's period-start rating
/// and the player's score against them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeriodResult {
    pub opponent: GlickoRating,
    pub score: f64
}

impl PeriodResult {
    pub fn win(opponent: GlickoRating) -> PeriodResult {
        PeriodResult { opponent, score: 1.0 }
    }

    pub fn loss(opponent: GlickoRating) -> PeriodResult {
        PeriodResult { opponent, score: 0.0 }
    }
}

pub fn g(phi: f64) -> f64 {
    1.0 / (1.0 + 3.0 * Q.powi(2) * phi.powi(2) / PI.powi(2)).sqrt()
}

/// Expected score of a player with skill `mu` against an opponent (`mu_j`, `phi_j`).
pub fn expected_score(mu: f64, mu_j: f64, phi_j: f64) -> f64 {
    1.0 / (1.0 + (-g(phi_j) * (mu - mu_j)).exp())
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Glicko2 {
    tau: f64,
    rd_floor: f64
}

impl Glicko2 {
    pub fn new(tau: f64, rd_floor: f64) -> Glicko2 {
        Glicko2 { tau, rd_floor }
    }

    /// # Glicko-2 period update
    ///
    /// Computes a player's rating after one rating period. Every entry of `results`
    /// must carry the opponent's rating as of the *start* of the period; the caller
    /// is responsible for that snapshot.
    ///
    /// A player without results only sees their deviation grow:
    /// `phi' = sqrt(phi^2 + sigma^2)`.
    pub fn rate(&self, player: &GlickoRating, results: &[PeriodResult]) -> Result<GlickoRating, RatingError> {
        player.validate()?;

        let mu = player.mu();
        let phi = player.phi();
        let sigma = player.volatility;

        if results.is_empty() {
            let phi_prime = (phi.powi(2) + sigma.powi(2)).sqrt();
            return Ok(self.floored(GlickoRating::from_internal(mu, phi_prime, sigma)));
        }

        let mut v_sum = 0.0;
        let mut delta_sum = 0.0;
        for result in results {
            result.opponent.validate()?;
            if result.score != 0.0 && result.score != 1.0 {
                return Err(RatingError::InvalidScore(result.score));
            }

            let phi_j = result.opponent.phi();
            let g_j = g(phi_j);
            let e_j = expected_score(mu, result.opponent.mu(), phi_j);

            v_sum += g_j.powi(2) * e_j * (1.0 - e_j);
            delta_sum += g_j * (result.score - e_j);
        }

        let v = 1.0 / v_sum;
        let delta = v * delta_sum;

        let sigma_prime = self.new_volatility(phi, sigma, v, delta)?;
        let phi_star = (phi.powi(2) + sigma_prime.powi(2)).sqrt();
        let phi_prime = 1.0 / (1.0 / phi_star.powi(2) + 1.0 / v).sqrt();
        let mu_prime = mu + phi_prime.powi(2) * delta_sum;

        Ok(self.floored(GlickoRating::from_internal(mu_prime, phi_prime, sigma_prime)))
    }

    /// Illinois (regula falsi) root find for the new volatility.
    fn new_volatility(&self, phi: f64, sigma: f64, v: f64, delta: f64) -> Result<f64, RatingError> {
        let a = sigma.powi(2).ln();
        let tau_sq = self.tau.powi(2);
        let f = |x: f64| {
            let ex = x.exp();
            let denominator = 2.0 * (phi.powi(2) + v + ex).powi(2);

            ex * (delta.powi(2) - phi.powi(2) - v - ex) / denominator - (x - a) / tau_sq
        };

        let mut big_a = a;
        let mut big_b = if delta.powi(2) > phi.powi(2) + v {
            (delta.powi(2) - phi.powi(2) - v).ln()
        } else {
            let mut k = 1;
            while f(a - k as f64 * self.tau) < 0.0 {
                k += 1;
                if k > MAX_BRACKET_STEPS {
                    return Err(RatingError::VolatilityBracketNotFound { delta, phi, v });
                }
            }

            a - k as f64 * self.tau
        };

        let mut f_a = f(big_a);
        let mut f_b = f(big_b);
        let mut iterations = 0;

        while (big_b - big_a).abs() > CONVERGENCE_TOLERANCE {
            iterations += 1;
            if iterations > MAX_SOLVER_ITERATIONS {
                return Err(RatingError::VolatilityDidNotConverge(MAX_SOLVER_ITERATIONS));
            }

            let big_c = big_a + (big_a - big_b) * f_a / (f_b - f_a);
            let f_c = f(big_c);

            if f_c * f_b <= 0.0 {
                big_a = big_b;
                f_a = f_b;
            } else {
                f_a /= 2.0;
            }

            big_b = big_c;
            f_b = f_c;
        }

        Ok((big_a / 2.0).exp())
    }

    fn floored(&self, rating: GlickoRating) -> GlickoRating {
        GlickoRating {
            rd: rating.rd.max(self.rd_floor),
            ..rating
        }
    }
}

impl Default for Glicko2 {
    fn default() -> Self {
        Glicko2::new(crate::model::constants::TAU, crate::model::constants::RD_FLOOR)
    }
}
