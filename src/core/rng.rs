use std::f64::consts::TAU;

const GOLDEN_GAMMA: u64 = 0x9E37_79B9_7F4A_7C15;

// One independent generator per (bucket stream, trial) pair, so a trial can be
// replayed without running the ones before it.
pub fn trial_seed(base_seed: u64, stream: u32, trial: u32) -> u64 {
    let stream_key = mix64(base_seed.wrapping_add((stream as u64).wrapping_mul(GOLDEN_GAMMA)));
    mix64(stream_key ^ (((trial as u64) << 1) | 1))
}

fn mix64(mut z: u64) -> u64 {
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

// SplitMix64 stream with Box-Muller normals; the second normal of each pair is
// kept for the next draw.
pub struct TrialRng {
    state: u64,
    spare_normal: Option<f64>,
}

impl TrialRng {
    pub fn for_trial(base_seed: u64, stream: u32, trial: u32) -> Self {
        Self::from_seed(trial_seed(base_seed, stream, trial))
    }

    pub fn from_seed(seed: u64) -> Self {
        Self {
            state: seed,
            spare_normal: None,
        }
    }

    fn next_u64(&mut self) -> u64 {
        self.state = self.state.wrapping_add(GOLDEN_GAMMA);
        mix64(self.state)
    }

    // Uniform in the open interval (0, 1).
    pub fn uniform(&mut self) -> f64 {
        let bits = self.next_u64() >> 12;
        (bits as f64 + 0.5) / (1_u64 << 52) as f64
    }

    pub fn standard_normal(&mut self) -> f64 {
        if let Some(z) = self.spare_normal.take() {
            return z;
        }
        let radius = (-2.0 * self.uniform().ln()).sqrt();
        let angle = TAU * self.uniform();
        self.spare_normal = Some(radius * angle.sin());
        radius * angle.cos()
    }

    pub fn normal(&mut self, mean: f64, std_dev: f64) -> f64 {
        mean + std_dev * self.standard_normal()
    }

    // exp(N(log_mean, log_sigma)): a strictly positive growth factor.
    pub fn lognormal(&mut self, log_mean: f64, log_sigma: f64) -> f64 {
        self.normal(log_mean, log_sigma).exp()
    }
}
