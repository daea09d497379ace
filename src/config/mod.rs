//! Configuration module for Stemme.
//!
//! Handles loading application settings from TOML and the environment.

mod settings;

pub use settings::{
    ConverterSettings, GeneralSettings, RecognitionSettings, ServerSettings, Settings,
};
