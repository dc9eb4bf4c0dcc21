pub mod constants;
pub mod drift;
pub mod glicko2;
pub mod leaderboard;
pub mod population;
pub mod rating_period;
pub mod scheduler;
pub mod structures;
