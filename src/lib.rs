pub mod adapters;
pub mod aligner;
pub mod classify;
pub mod cli;
pub mod collapse;
pub mod errors;
pub mod inputs;
pub mod libraries;
pub mod matrix;
pub mod modifiers;
pub mod pipeline;
pub mod reports;
pub mod runlog;
pub mod sam;
pub mod seqreader;
pub mod stages;
