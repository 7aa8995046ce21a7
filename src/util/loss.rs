use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::info;


/// Simulated packet loss on the send path: before every datagram transmission a uniform sample
///  in `[0,1)` is drawn, and the send is skipped if it falls below the configured rate.
///
/// There is one generator per process, seeded from configuration, so loss patterns are
///  reproducible across runs. Requests, replies and monitor updates all go through this.
pub struct LossSimulator {
    rng: StdRng,
    rate: f64,
}

impl LossSimulator {
    pub fn new(rate: f64, seed: u64) -> LossSimulator {
        LossSimulator {
            rng: StdRng::seed_from_u64(seed),
            rate,
        }
    }

    /// true if the caller should skip the actual send. A rate of 0 (or below) never drops and
    ///  does not advance the generator.
    pub fn should_drop(&mut self) -> bool {
        if self.rate <= 0.0 {
            return false;
        }
        let dropped = self.rng.gen::<f64>() < self.rate;
        if dropped {
            info!("simulated drop of outbound datagram");
        }
        dropped
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_rate_zero_never_drops() {
        let mut loss = LossSimulator::new(0.0, 42);
        assert!((0..1000).all(|_| !loss.should_drop()));
    }

    #[test]
    fn test_rate_one_always_drops() {
        let mut loss = LossSimulator::new(1.0, 42);
        assert!((0..1000).all(|_| loss.should_drop()));
    }

    #[test]
    fn test_same_seed_same_decisions() {
        let mut a = LossSimulator::new(0.5, 777);
        let mut b = LossSimulator::new(0.5, 777);
        let decisions_a: Vec<bool> = (0..100).map(|_| a.should_drop()).collect();
        let decisions_b: Vec<bool> = (0..100).map(|_| b.should_drop()).collect();
        assert_eq!(decisions_a, decisions_b);
    }

    #[test]
    fn test_half_rate_drops_roughly_half() {
        let mut loss = LossSimulator::new(0.5, 1);
        let dropped = (0..10000).filter(|_| loss.should_drop()).count();
        assert!(dropped > 4000 && dropped < 6000);
    }
}
