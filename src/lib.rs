pub mod candidate;
pub mod capturer;
pub mod decider;
pub mod distinguisher;
pub mod dsl;
pub mod enumerator;
pub mod error;
pub mod interpreter;
pub mod oracle;
pub mod program;
pub mod synthesizer;
