pub mod core;
pub mod leaderboard;
pub mod scores;
pub mod sections;
