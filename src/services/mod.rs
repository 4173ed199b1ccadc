pub mod achievement;
pub mod challenge;
pub mod rewards;
pub mod spaced_repetition;
pub mod stats;
pub mod streak;
pub mod vocabulary;
