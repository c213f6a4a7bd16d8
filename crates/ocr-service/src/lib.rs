pub mod config;
pub mod consensus;
pub mod diagnostics;
pub mod engine;
pub mod plate_reader;
pub mod preprocess;
pub mod quality;
pub mod similarity;
pub mod validator;

pub use config::OcrConfig;
pub use consensus::{ConsensusResult, ConsensusTracker};
pub use diagnostics::OcrDiagnostics;
pub use engine::{OcrEngine, OcrMode, ScriptedOcrEngine};
pub use plate_reader::{PlateObservation, PlateReader, PlateReading};
pub use validator::{KnownIdentifiers, OcrReading, SmartValidator, TextType};
