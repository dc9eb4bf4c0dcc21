// Model constants
pub const DEFAULT_RATING: f64 = 1500.0;
pub const DEFAULT_RD: f64 = 350.0;
pub const DEFAULT_VOLATILITY: f64 = 0.06;
pub const RD_FLOOR: f64 = 30.0;
pub const TAU: f64 = 0.5;
/// Conversion factor between the public (Glicko) scale and the internal Glicko-2 scale
pub const GLICKO2_SCALE: f64 = 173.7178;
/// `ln(10) / 400`
pub const Q: f64 = std::f64::consts::LN_10 / 400.0;
pub const CONVERGENCE_TOLERANCE: f64 = 0.000001;
pub const MAX_BRACKET_STEPS: u32 = 10_000;
pub const MAX_SOLVER_ITERATIONS: u32 = 10_000;
// Scheduling
pub const MATCH_TIMEOUT_SECS: u64 = 120;
pub const BATCH_TIMEOUT_SECS: u64 = 900;
// Generation
pub const GENERATION_TIMEOUT_SECS: u64 = 600;
